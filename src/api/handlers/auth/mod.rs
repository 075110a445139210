//! Auth handlers and supporting modules.
//!
//! Authentication is session-cookie based: login stores a hashed random
//! token server-side and the browser carries the raw value in an `HttpOnly`
//! cookie. The same session row also carries the password-reset capability
//! (`reset_email`), which exists independently of being logged in.
//!
//! ## Rate limiting
//!
//! `/verify-otp` is ceilinged at 20 attempts per 10 minutes per client,
//! independent of the general API limit of 1000 per 15 minutes, since a
//! 6-digit code is a realistic brute-force target.

mod error;
pub(crate) mod login;
mod rate_limit;
pub(crate) mod register;
pub(crate) mod reset;
pub(crate) mod session;
mod state;
mod storage;
pub(crate) mod types;
mod utils;

pub use error::AuthError;
pub use rate_limit::{
    NoopRateLimiter, RateLimitAction, RateLimitDecision, RateLimiter, SlidingWindowRateLimiter,
};
pub use state::{AuthConfig, AuthState};

pub(crate) use storage::{delete_expired_sessions, SessionRecord};
pub(crate) use utils::extract_client_ip;

use axum::http::HeaderMap;
use sqlx::PgPool;

/// Resolve the request to a logged-in session or fail with 401.
pub(crate) async fn require_user(
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<SessionRecord, AuthError> {
    let record = session::authenticate_session(headers, pool)
        .await
        .map_err(|_| AuthError::Server)?
        .ok_or(AuthError::LoginRequired)?;
    if !record.is_authenticated() {
        // Anonymous reset sessions hold no login rights.
        return Err(AuthError::LoginRequired);
    }
    Ok(record)
}

/// Resolve the request to an admin session or fail with 401/403.
pub(crate) async fn require_admin(
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<SessionRecord, AuthError> {
    let record = require_user(headers, pool).await?;
    if !record.is_admin() {
        return Err(AuthError::Forbidden);
    }
    Ok(record)
}
