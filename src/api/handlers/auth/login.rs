//! Login endpoint; issues the session cookie on success.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};

use super::{
    error::AuthError,
    session::session_cookie,
    state::AuthState,
    storage::{insert_session, lookup_user_by_email, NewSession},
    types::{ApiMessage, LoginRequest, LoginResponse},
    utils::{normalize_email, verify_secret},
};

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login accepted", body = LoginResponse),
        (status = 401, description = "Unknown email or wrong password", body = ApiMessage),
        (status = 500, description = "Server error", body = ApiMessage)
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let email = normalize_email(&payload.email);
    if email.is_empty() || payload.password.is_empty() {
        return Err(AuthError::InvalidCredentials);
    }

    let user = lookup_user_by_email(&pool, &email)
        .await
        .map_err(|err| {
            error!("Failed to lookup user: {err}");
            AuthError::Server
        })?
        .ok_or(AuthError::InvalidCredentials)?;

    // Unknown email and wrong password produce the same answer.
    if !verify_secret(&payload.password, &user.password_hash) {
        return Err(AuthError::InvalidCredentials);
    }

    let new_session = NewSession {
        user_id: Some(user.id),
        email: Some(&email),
        name: Some(&user.name),
        role: Some(user.role),
        reset_email: None,
    };
    let token = insert_session(&pool, new_session, auth_state.config().session_ttl_seconds())
        .await
        .map_err(|err| {
            error!("Failed to create session: {err}");
            AuthError::Server
        })?;

    let mut response_headers = HeaderMap::new();
    let cookie = session_cookie(&auth_state, &token).map_err(|err| {
        error!("Failed to build session cookie: {err}");
        AuthError::Server
    })?;
    response_headers.insert(SET_COOKIE, cookie);

    info!("Login for {} account", user.role.as_str());
    let body = LoginResponse {
        success: true,
        message: "Login successful".to_string(),
        role: user.role,
        name: user.name,
    };
    Ok((StatusCode::OK, response_headers, Json(body)))
}
