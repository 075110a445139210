//! OpenAPI document for the HTTP surface, served at `/openapi.json`.

use axum::Json;
use utoipa::OpenApi;

use super::handlers::{auth, health, notice, uploads};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::register::register,
        auth::login::login,
        auth::session::session,
        auth::session::logout,
        auth::reset::forgot_password,
        auth::reset::verify_otp,
        auth::reset::set_password,
        uploads::upload,
        uploads::my_uploads,
        uploads::download,
        uploads::delete,
        notice::get_info,
        notice::update_info,
        notice::clear_info,
    ),
    components(schemas(
        health::Health,
        auth::types::ApiMessage,
        auth::types::Role,
        auth::types::RegisterRequest,
        auth::types::LoginRequest,
        auth::types::LoginResponse,
        auth::types::ForgotPasswordRequest,
        auth::types::VerifyOtpRequest,
        auth::types::SetPasswordRequest,
        auth::types::SessionUser,
        auth::types::SessionStatus,
        uploads::Upload,
        notice::Notice,
    )),
    tags(
        (name = "auth", description = "Registration, login, and sessions"),
        (name = "password-reset", description = "OTP issue, verify, commit"),
        (name = "uploads", description = "Document storage and retrieval"),
        (name = "notice", description = "Shared portal notice"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_core_paths() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in [
            "/health",
            "/register",
            "/login",
            "/logout",
            "/api/session",
            "/forgot-password",
            "/verify-otp",
            "/set-password",
            "/upload",
            "/api/my-uploads",
            "/get-info",
        ] {
            assert!(
                paths.iter().any(|path| path.as_str() == expected),
                "missing {expected} in {paths:?}"
            );
        }
    }
}
