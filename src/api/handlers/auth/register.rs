//! Account registration.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};

use super::{
    error::AuthError,
    state::AuthState,
    storage::{insert_user, RegisterOutcome},
    types::{ApiMessage, RegisterRequest},
    utils::{hash_secret, normalize_email, valid_email},
};

#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created", body = ApiMessage),
        (status = 400, description = "Missing fields or duplicate email", body = ApiMessage),
        (status = 500, description = "Server error", body = ApiMessage)
    ),
    tag = "auth"
)]
pub async fn register(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AuthError> {
    if payload.name.trim().is_empty() || payload.email.trim().is_empty() || payload.password.is_empty()
    {
        return Err(AuthError::InvalidInput("All fields required".to_string()));
    }

    let email = normalize_email(&payload.email);
    if !valid_email(&email) {
        return Err(AuthError::InvalidInput("Invalid email".to_string()));
    }

    let name = payload.name.trim();
    let role = auth_state.config().role_for_registration(name, &email);
    let password_hash = hash_secret(&payload.password).map_err(|err| {
        error!("Failed to hash password: {err}");
        AuthError::Server
    })?;

    let mobile = payload
        .mobile
        .as_deref()
        .map(str::trim)
        .filter(|mobile| !mobile.is_empty());

    match insert_user(&pool, name, &email, &password_hash, mobile, role).await {
        Ok(RegisterOutcome::Created) => {
            info!("Registered new {} account", role.as_str());
            Ok((
                StatusCode::OK,
                Json(ApiMessage::ok("Registration successful!")),
            ))
        }
        Ok(RegisterOutcome::Conflict) => Err(AuthError::InvalidInput(
            "Email already registered".to_string(),
        )),
        Err(err) => {
            error!("Failed to register user: {err}");
            Err(AuthError::Server)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::NoopRateLimiter;
    use super::super::state::AuthConfig;
    use super::*;
    use crate::api::mail::LogMailSender;
    use axum::response::IntoResponse;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://localhost/portalo_test")
            .expect("lazy pool")
    }

    fn auth_state() -> Arc<AuthState> {
        Arc::new(AuthState::new(
            AuthConfig::new("http://localhost:5000".to_string()),
            Arc::new(NoopRateLimiter),
            Arc::new(LogMailSender),
        ))
    }

    #[tokio::test]
    async fn register_rejects_missing_fields() {
        let payload = RegisterRequest {
            name: " ".to_string(),
            email: "alice@example.com".to_string(),
            password: "hunter22".to_string(),
            mobile: None,
        };
        let result = register(Extension(lazy_pool()), Extension(auth_state()), Json(payload)).await;
        let response = result.err().expect("missing name rejected").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn register_rejects_invalid_email() {
        let payload = RegisterRequest {
            name: "Alice".to_string(),
            email: "not-an-email".to_string(),
            password: "hunter22".to_string(),
            mobile: None,
        };
        let result = register(Extension(lazy_pool()), Extension(auth_state()), Json(payload)).await;
        assert!(matches!(result, Err(AuthError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn register_reports_missing_fields_message() {
        let payload = RegisterRequest {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            password: String::new(),
            mobile: None,
        };
        let result = register(Extension(lazy_pool()), Extension(auth_state()), Json(payload)).await;
        match result.err().expect("empty password rejected") {
            AuthError::InvalidInput(message) => assert_eq!(message, "All fields required"),
            other => panic!("expected invalid input, got {other:?}"),
        }
    }
}
