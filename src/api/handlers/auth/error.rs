//! Failure taxonomy for the auth and password-reset flows.
//!
//! Expected failures are returned to callers as `{success:false, message}`
//! bodies; the status codes mirror the original frontend contract (soft 200s
//! for OTP mismatches, 400/401/403 elsewhere). Store and transport errors are
//! logged server-side and collapse into a generic `Server` variant so no
//! internal detail leaks.

use axum::{http::StatusCode, response::IntoResponse, Json};

use super::types::ApiMessage;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Email not found")]
    NotFound,
    #[error("Invalid request")]
    InvalidRequest,
    #[error("OTP expired")]
    Expired,
    #[error("Invalid OTP")]
    InvalidOtp,
    #[error("{0}")]
    InvalidInput(String),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Not authenticated")]
    LoginRequired,
    #[error("OTP verification required")]
    Unauthorized,
    #[error("Admin access required")]
    Forbidden,
    #[error("{0}")]
    RateLimited(&'static str),
    #[error("Server error")]
    Server,
}

impl AuthError {
    /// OTP-flow soft failures keep a 200 status; the body carries the outcome.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound | Self::InvalidRequest | Self::Expired | Self::InvalidOtp => {
                StatusCode::OK
            }
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::LoginRequired => StatusCode::UNAUTHORIZED,
            Self::Unauthorized | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Server => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(ApiMessage::err(&self.to_string()))).into_response()
    }
}
