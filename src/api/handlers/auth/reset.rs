//! Password-reset flow: issue an OTP, verify it, commit a new password.
//!
//! The flow is a three-step state machine keyed by email. Issuance persists a
//! hashed 6-digit code with a 10-minute expiry before any mail leaves the
//! process, so a delivery failure can never orphan an emailed code.
//! Verification grants the session a `reset_email` capability without
//! consuming the OTP record, and only the commit step clears the pair.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::mail::MailMessage;

use super::{
    error::AuthError,
    rate_limit::{RateLimitAction, RateLimitDecision},
    session::{authenticate_session, extract_session_token, session_cookie},
    state::AuthState,
    storage::{
        clear_session_reset_email, commit_password, insert_session, lookup_reset_state,
        set_session_reset_email, store_reset_otp, NewSession,
    },
    types::{ApiMessage, ForgotPasswordRequest, SetPasswordRequest, VerifyOtpRequest},
    utils::{
        extract_client_ip, generate_otp, hash_secret, hash_session_token, normalize_email,
        verify_secret,
    },
};

const OTP_RATE_LIMIT_MESSAGE: &str = "Too many OTP attempts. Try again later.";

#[utoipa::path(
    post,
    path = "/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "OTP issued, or soft failure for an unknown email", body = ApiMessage),
        (status = 400, description = "Email missing", body = ApiMessage),
        (status = 500, description = "Server error", body = ApiMessage)
    ),
    tag = "password-reset"
)]
pub async fn forgot_password(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let email = normalize_email(&payload.email);
    if email.is_empty() {
        return Err(AuthError::InvalidInput("Email required".to_string()));
    }

    let otp = generate_otp();
    let otp_hash = hash_secret(&otp).map_err(|err| {
        error!("Failed to hash OTP: {err}");
        AuthError::Server
    })?;

    // A re-request overwrites any outstanding OTP; last writer wins.
    let updated = store_reset_otp(&pool, &email, &otp_hash, auth_state.config().otp_ttl_seconds())
        .await
        .map_err(|err| {
            error!("Failed to store OTP: {err}");
            AuthError::Server
        })?;

    if !updated {
        if auth_state.config().reveal_unknown_email() {
            return Err(AuthError::NotFound);
        }
        // Enumeration-hardened mode answers as if the mail was sent.
        return Ok((
            StatusCode::OK,
            Json(ApiMessage::ok("OTP sent to your email")),
        ));
    }

    // Persist first, then send. An undelivered-but-stored OTP is fine; the
    // user can simply re-request.
    let minutes = auth_state.config().otp_ttl_seconds() / 60;
    let message = MailMessage {
        to: email.clone(),
        subject: "Password Reset OTP".to_string(),
        text_body: format!("Your OTP for password reset is: {otp}\nIt will expire in {minutes} minutes."),
        html_body: format!(
            "<p>Your OTP for password reset is: <strong>{otp}</strong></p>\
             <p>It will expire in {minutes} minutes.</p>"
        ),
    };
    if let Err(err) = auth_state.mailer().send(&message).await {
        warn!("Failed to send OTP mail: {err}");
        return Err(AuthError::Server);
    }

    info!("Issued password-reset OTP");
    Ok((
        StatusCode::OK,
        Json(ApiMessage::ok("OTP sent to your email")),
    ))
}

#[utoipa::path(
    post,
    path = "/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Verification outcome; failures are soft", body = ApiMessage),
        (status = 429, description = "Too many attempts", body = ApiMessage),
        (status = 500, description = "Server error", body = ApiMessage)
    ),
    tag = "password-reset"
)]
pub async fn verify_otp(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<impl IntoResponse, AuthError> {
    // A 6-digit code is brute-forceable, so this endpoint carries its own
    // ceiling on top of the general one.
    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::VerifyOtp)
        == RateLimitDecision::Limited
    {
        return Err(AuthError::RateLimited(OTP_RATE_LIMIT_MESSAGE));
    }

    let email = normalize_email(&payload.email);
    let otp = payload.otp.trim();
    if email.is_empty() || otp.is_empty() {
        // The frontend treats this as a soft failure, not a 400.
        return Ok((
            StatusCode::OK,
            HeaderMap::new(),
            Json(ApiMessage::err("Email & OTP required")),
        ));
    }

    if auth_state
        .rate_limiter()
        .check_email(&email, RateLimitAction::VerifyOtp)
        == RateLimitDecision::Limited
    {
        return Err(AuthError::RateLimited(OTP_RATE_LIMIT_MESSAGE));
    }

    // Always re-read the stored hash; a concurrent re-issue wins the race.
    let state = lookup_reset_state(&pool, &email)
        .await
        .map_err(|err| {
            error!("Failed to read reset state: {err}");
            AuthError::Server
        })?
        .ok_or(AuthError::InvalidRequest)?;

    if state.is_expired() {
        return Err(AuthError::Expired);
    }
    let Some(otp_hash) = state.otp_hash else {
        return Err(AuthError::Expired);
    };
    if !verify_secret(otp, &otp_hash) {
        return Err(AuthError::InvalidOtp);
    }

    // Grant the reset capability to the caller's session. The OTP record is
    // NOT cleared here; re-verifying the same valid code succeeds again.
    let mut response_headers = HeaderMap::new();
    let existing = extract_session_token(&headers).map(|token| hash_session_token(&token));
    let granted = match &existing {
        Some(token_hash) => set_session_reset_email(&pool, token_hash, &email)
            .await
            .map_err(|err| {
                error!("Failed to set reset email on session: {err}");
                AuthError::Server
            })?,
        None => false,
    };
    if !granted {
        // No usable session; mint an anonymous one that carries only the
        // reset capability.
        let new_session = NewSession {
            reset_email: Some(&email),
            ..NewSession::default()
        };
        let token = insert_session(
            &pool,
            new_session,
            auth_state.config().session_ttl_seconds(),
        )
        .await
        .map_err(|err| {
            error!("Failed to create reset session: {err}");
            AuthError::Server
        })?;
        let cookie = session_cookie(&auth_state, &token).map_err(|err| {
            error!("Failed to build session cookie: {err}");
            AuthError::Server
        })?;
        response_headers.insert(SET_COOKIE, cookie);
    }

    info!("OTP verified");
    Ok((
        StatusCode::OK,
        response_headers,
        Json(ApiMessage::ok("OTP verified successfully")),
    ))
}

#[utoipa::path(
    post,
    path = "/set-password",
    request_body = SetPasswordRequest,
    responses(
        (status = 200, description = "Password updated and reset window closed", body = ApiMessage),
        (status = 400, description = "Password too short", body = ApiMessage),
        (status = 403, description = "No verified OTP on this session", body = ApiMessage),
        (status = 500, description = "Server error", body = ApiMessage)
    ),
    tag = "password-reset"
)]
pub async fn set_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Json(payload): Json<SetPasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let session = authenticate_session(&headers, &pool)
        .await
        .map_err(|_| AuthError::Server)?
        .ok_or(AuthError::Unauthorized)?;
    let Some(email) = session.reset_email.clone() else {
        return Err(AuthError::Unauthorized);
    };

    let min_length = auth_state.config().password_min_length();
    if payload.password.len() < min_length {
        return Err(AuthError::InvalidInput(format!(
            "Password must be at least {min_length} characters"
        )));
    }

    let password_hash = hash_secret(&payload.password).map_err(|err| {
        error!("Failed to hash password: {err}");
        AuthError::Server
    })?;

    // The new hash lands together with the OTP-pair clear in one UPDATE.
    // Clearing the session capability comes after, so a crash in between
    // leaves a consumed OTP with the new password already active, never a
    // reusable window over the old password.
    let updated = commit_password(&pool, &email, &password_hash)
        .await
        .map_err(|err| {
            error!("Failed to commit password: {err}");
            AuthError::Server
        })?;
    if !updated {
        warn!("Reset capability pointed at a missing account");
        return Err(AuthError::InvalidRequest);
    }

    if let Err(err) = clear_session_reset_email(&pool, &session.token_hash).await {
        error!("Failed to clear reset email from session: {err}");
        return Err(AuthError::Server);
    }

    info!("Password reset committed");
    Ok((
        StatusCode::OK,
        Json(ApiMessage::ok("Password reset successfully")),
    ))
}
