//! Session cookie handling and the session-status endpoint.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::{
    state::{AuthConfig, AuthState},
    storage::{delete_session, lookup_session, SessionRecord},
    types::{ApiMessage, SessionStatus, SessionUser},
    utils::hash_session_token,
};

const SESSION_COOKIE_NAME: &str = "portalo_session";

#[utoipa::path(
    get,
    path = "/api/session",
    responses(
        (status = 200, description = "Login status for the current browser", body = SessionStatus)
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    // An absent or stale cookie is reported as logged out, never as an error.
    let record = match authenticate_session(&headers, &pool).await {
        Ok(record) => record,
        Err(status) => return status.into_response(),
    };

    let user = record.as_ref().and_then(session_user);
    let status = SessionStatus {
        logged_in: user.is_some(),
        user,
    };
    (StatusCode::OK, Json(status)).into_response()
}

/// Resolve the session cookie into a session record, if present.
///
/// Returns `Ok(None)` when the cookie is missing, unknown, or expired.
pub(crate) async fn authenticate_session(
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<Option<SessionRecord>, StatusCode> {
    let Some(token) = extract_session_token(headers) else {
        return Ok(None);
    };
    // Only the hash is stored; never compare raw tokens against the database.
    let token_hash = hash_session_token(&token);
    match lookup_session(pool, &token_hash).await {
        Ok(record) => Ok(record),
        Err(err) => {
            error!("Failed to lookup session: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Session view of a logged-in user. Anonymous reset sessions carry no user.
fn session_user(record: &SessionRecord) -> Option<SessionUser> {
    let user_id = record.user_id?;
    Some(SessionUser {
        id: user_id.to_string(),
        name: record.name.clone().unwrap_or_default(),
        role: record.role.unwrap_or(super::types::Role::Customer),
        email: record.email.clone().unwrap_or_default(),
    })
}

#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 200, description = "Session cleared", body = ApiMessage)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Some(token) = extract_session_token(&headers) {
        let token_hash = hash_session_token(&token);
        if let Err(err) = delete_session(&pool, &token_hash).await {
            error!("Failed to delete session: {err}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        response_headers,
        Json(ApiMessage::ok("Logged out successfully")),
    )
        .into_response()
}

/// Build a secure `HttpOnly` cookie for the session token.
pub(super) fn session_cookie(
    auth_state: &AuthState,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = auth_state.config().session_ttl_seconds();
    // Only mark cookies secure when the frontend is served over HTTPS.
    let secure = auth_state.config().session_cookie_secure();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(auth_config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = auth_config.session_cookie_secure();
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::NoopRateLimiter;
    use super::*;
    use crate::api::mail::LogMailSender;
    use uuid::Uuid;

    fn auth_state(frontend: &str) -> AuthState {
        AuthState::new(
            AuthConfig::new(frontend.to_string()),
            Arc::new(NoopRateLimiter),
            Arc::new(LogMailSender),
        )
    }

    #[test]
    fn extract_session_token_finds_cookie_among_many() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; portalo_session=abc123; lang=en"),
        );
        assert_eq!(extract_session_token(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn extract_session_token_ignores_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark"));
        assert_eq!(extract_session_token(&headers), None);
        assert_eq!(extract_session_token(&HeaderMap::new()), None);
    }

    #[test]
    fn session_cookie_attributes() {
        let state = auth_state("https://portal.example.com");
        let cookie = session_cookie(&state, "tok").expect("cookie");
        let cookie = cookie.to_str().expect("ascii");
        assert!(cookie.starts_with("portalo_session=tok"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Secure"));
    }

    #[test]
    fn session_cookie_not_secure_over_http() {
        let state = auth_state("http://localhost:5000");
        let cookie = session_cookie(&state, "tok").expect("cookie");
        assert!(!cookie.to_str().expect("ascii").contains("Secure"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let config = AuthConfig::new("http://localhost:5000".to_string());
        let cookie = clear_session_cookie(&config).expect("cookie");
        assert!(cookie.to_str().expect("ascii").contains("Max-Age=0"));
    }

    #[test]
    fn session_user_requires_user_id() {
        let anonymous = SessionRecord {
            token_hash: vec![0u8; 32],
            user_id: None,
            email: None,
            name: None,
            role: None,
            reset_email: Some("u@x.com".to_string()),
        };
        assert!(session_user(&anonymous).is_none());

        let logged_in = SessionRecord {
            token_hash: vec![0u8; 32],
            user_id: Some(Uuid::nil()),
            email: Some("alice@example.com".to_string()),
            name: Some("Alice".to_string()),
            role: Some(super::super::types::Role::Customer),
            reset_email: None,
        };
        let user = session_user(&logged_in).expect("user");
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.name, "Alice");
    }
}
