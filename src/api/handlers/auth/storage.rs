//! Database helpers for users, sessions, and the password-reset OTP pair.
//!
//! The OTP columns (`reset_otp_hash`, `otp_expires_at`) are always written
//! together in a single UPDATE so they stay an atomic pair: issuing sets
//! both, committing a new password clears both. Expiry is evaluated by the
//! database clock, never cached in process.

use anyhow::{anyhow, Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::types::Role;
use super::utils::{generate_session_token, hash_session_token, is_unique_violation};

/// Outcome when attempting to create a new user.
#[derive(Debug)]
pub(crate) enum RegisterOutcome {
    Created,
    Conflict,
}

/// Fields needed to check a login attempt.
pub(crate) struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) password_hash: String,
    pub(crate) role: Role,
}

/// Current OTP state for one account.
///
/// `otp_current` is `None` when no expiry is set; `Some(false)` when the
/// stored OTP is past its expiry.
pub(crate) struct ResetState {
    pub(crate) otp_hash: Option<String>,
    pub(crate) otp_current: Option<bool>,
}

impl ResetState {
    pub(crate) fn is_expired(&self) -> bool {
        !self.otp_current.unwrap_or(false)
    }
}

/// Data returned for a valid session cookie.
pub(crate) struct SessionRecord {
    pub(crate) token_hash: Vec<u8>,
    pub(crate) user_id: Option<Uuid>,
    pub(crate) email: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) role: Option<Role>,
    pub(crate) reset_email: Option<String>,
}

impl SessionRecord {
    pub(crate) fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub(crate) fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }
}

/// Fields for a new session row; either a logged-in user or an anonymous
/// reset-capability session.
#[derive(Default)]
pub(crate) struct NewSession<'a> {
    pub(crate) user_id: Option<Uuid>,
    pub(crate) email: Option<&'a str>,
    pub(crate) name: Option<&'a str>,
    pub(crate) role: Option<Role>,
    pub(crate) reset_email: Option<&'a str>,
}

pub(crate) async fn lookup_user_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<UserRecord>> {
    let query = "SELECT id, name, password_hash, role FROM users WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user")?;

    Ok(row.map(|row| UserRecord {
        id: row.get("id"),
        name: row.get("name"),
        password_hash: row.get("password_hash"),
        role: Role::from_db(row.get("role")),
    }))
}

pub(crate) async fn insert_user(
    pool: &PgPool,
    name: &str,
    email: &str,
    password_hash: &str,
    mobile: Option<&str>,
    role: Role,
) -> Result<RegisterOutcome> {
    let query = r"
        INSERT INTO users (name, email, password_hash, mobile, role)
        VALUES ($1, $2, $3, $4, $5)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(mobile)
        .bind(role.as_str())
        .execute(pool)
        .instrument(span)
        .await;

    match result {
        Ok(_) => Ok(RegisterOutcome::Created),
        Err(err) if is_unique_violation(&err) => Ok(RegisterOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

/// Current OTP hash and expiry status for the account, or `None` when the
/// email is unknown. Always re-reads the stored row; a concurrent re-issue
/// wins over anything the caller saw earlier.
pub(crate) async fn lookup_reset_state(pool: &PgPool, email: &str) -> Result<Option<ResetState>> {
    let query = r"
        SELECT reset_otp_hash, (otp_expires_at > NOW()) AS otp_current
        FROM users
        WHERE email = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup reset state")?;

    Ok(row.map(|row| ResetState {
        otp_hash: row.get("reset_otp_hash"),
        otp_current: row.get("otp_current"),
    }))
}

/// Persist a fresh OTP hash with its expiry, overwriting any outstanding one.
/// Returns false when the email does not match a user.
pub(crate) async fn store_reset_otp(
    pool: &PgPool,
    email: &str,
    otp_hash: &str,
    ttl_seconds: i64,
) -> Result<bool> {
    let query = r"
        UPDATE users
        SET reset_otp_hash = $2,
            otp_expires_at = NOW() + ($3 * INTERVAL '1 second')
        WHERE email = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(email)
        .bind(otp_hash)
        .bind(ttl_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to store reset otp")?;

    Ok(result.rows_affected() > 0)
}

/// Write the new password hash and clear the OTP pair in one statement.
/// This is the only path that clears `reset_otp_hash`/`otp_expires_at`.
pub(crate) async fn commit_password(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
) -> Result<bool> {
    let query = r"
        UPDATE users
        SET password_hash = $2,
            reset_otp_hash = NULL,
            otp_expires_at = NULL
        WHERE email = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(email)
        .bind(password_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to commit new password")?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn insert_session(
    pool: &PgPool,
    new_session: NewSession<'_>,
    ttl_seconds: i64,
) -> Result<String> {
    // Generate a random token, store only its hash, and return the raw value
    // so the caller can set the session cookie.
    let query = r"
        INSERT INTO sessions (session_hash, user_id, email, name, role, reset_email, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, NOW() + ($7 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_session_token()?;
        let token_hash = hash_session_token(&token);
        let result = sqlx::query(query)
            .bind(token_hash)
            .bind(new_session.user_id)
            .bind(new_session.email)
            .bind(new_session.name)
            .bind(new_session.role.map(Role::as_str))
            .bind(new_session.reset_email)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

pub(crate) async fn lookup_session(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    // Expiry is fixed from issuance; lookups never extend it.
    let query = r"
        SELECT session_hash, user_id, email, name, role, reset_email
        FROM sessions
        WHERE session_hash = $1
          AND expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    Ok(row.map(|row| SessionRecord {
        token_hash: row.get("session_hash"),
        user_id: row.get("user_id"),
        email: row.get("email"),
        name: row.get("name"),
        role: row
            .get::<Option<String>, _>("role")
            .as_deref()
            .map(Role::from_db),
        reset_email: row.get("reset_email"),
    }))
}

/// Drop sessions past their expiry. The lookup filter already hides them,
/// but the rows would otherwise accumulate forever.
pub(crate) async fn delete_expired_sessions(pool: &PgPool) -> Result<u64> {
    let query = "DELETE FROM sessions WHERE expires_at <= NOW()";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete expired sessions")?;
    Ok(result.rows_affected())
}

pub(crate) async fn delete_session(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    // Logout is idempotent; it's fine if no rows are deleted.
    let query = "DELETE FROM sessions WHERE session_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

/// Grant the single-use reset capability to an existing session.
pub(crate) async fn set_session_reset_email(
    pool: &PgPool,
    token_hash: &[u8],
    email: &str,
) -> Result<bool> {
    let query = r"
        UPDATE sessions
        SET reset_email = $2
        WHERE session_hash = $1
          AND expires_at > NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(token_hash)
        .bind(email)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to set session reset email")?;
    Ok(result.rows_affected() > 0)
}

/// Close the reset window on the session after a committed password.
pub(crate) async fn clear_session_reset_email(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    let query = "UPDATE sessions SET reset_email = NULL WHERE session_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to clear session reset email")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_outcome_debug_names() {
        assert_eq!(format!("{:?}", RegisterOutcome::Created), "Created");
        assert_eq!(format!("{:?}", RegisterOutcome::Conflict), "Conflict");
    }

    #[test]
    fn reset_state_expiry_logic() {
        let missing = ResetState {
            otp_hash: None,
            otp_current: None,
        };
        assert!(missing.is_expired());

        let stale = ResetState {
            otp_hash: Some("$argon2id$stub".to_string()),
            otp_current: Some(false),
        };
        assert!(stale.is_expired());

        let current = ResetState {
            otp_hash: Some("$argon2id$stub".to_string()),
            otp_current: Some(true),
        };
        assert!(!current.is_expired());
    }

    #[test]
    fn session_record_auth_and_role_checks() {
        let anonymous = SessionRecord {
            token_hash: vec![1, 2, 3],
            user_id: None,
            email: None,
            name: None,
            role: None,
            reset_email: Some("u@x.com".to_string()),
        };
        assert!(!anonymous.is_authenticated());
        assert!(!anonymous.is_admin());

        let admin = SessionRecord {
            token_hash: vec![1, 2, 3],
            user_id: Some(Uuid::nil()),
            email: Some("root@example.com".to_string()),
            name: Some("Root".to_string()),
            role: Some(Role::Admin),
            reset_email: None,
        };
        assert!(admin.is_authenticated());
        assert!(admin.is_admin());
    }
}
