//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Structured `{success, message}` body used by every auth endpoint.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ApiMessage {
    pub success: bool,
    pub message: String,
}

impl ApiMessage {
    #[must_use]
    pub fn ok(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn err(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
        }
    }
}

/// User role; admin is assigned only through the registration allow-list.
#[derive(ToSchema, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Admin => "admin",
        }
    }

    /// Parse the database representation, defaulting unknown values to customer.
    #[must_use]
    pub fn from_db(value: &str) -> Self {
        match value {
            "admin" => Self::Admin,
            _ => Self::Customer,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub mobile: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub role: Role,
    pub name: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SetPasswordRequest {
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionUser {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub email: String,
}

/// Body of `GET /api/session`, mirroring the frontend contract.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionStatus {
    #[serde(rename = "loggedIn")]
    pub logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<SessionUser>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn api_message_round_trips() -> Result<()> {
        let value = serde_json::to_value(ApiMessage::err("Invalid OTP"))?;
        let success = value
            .get("success")
            .and_then(serde_json::Value::as_bool)
            .context("missing success")?;
        assert!(!success);
        let decoded: ApiMessage = serde_json::from_value(value)?;
        assert_eq!(decoded.message, "Invalid OTP");
        Ok(())
    }

    #[test]
    fn role_serializes_lowercase() -> Result<()> {
        assert_eq!(serde_json::to_value(Role::Admin)?, "admin");
        assert_eq!(serde_json::to_value(Role::Customer)?, "customer");
        Ok(())
    }

    #[test]
    fn role_from_db_defaults_to_customer() {
        assert_eq!(Role::from_db("admin"), Role::Admin);
        assert_eq!(Role::from_db("customer"), Role::Customer);
        assert_eq!(Role::from_db("garbage"), Role::Customer);
    }

    #[test]
    fn session_status_uses_logged_in_key() -> Result<()> {
        let value = serde_json::to_value(SessionStatus {
            logged_in: false,
            user: None,
        })?;
        assert!(value.get("loggedIn").is_some());
        assert!(value.get("user").is_none());
        Ok(())
    }

    #[test]
    fn register_request_accepts_missing_mobile() -> Result<()> {
        let decoded: RegisterRequest = serde_json::from_str(
            r#"{"name":"Alice","email":"alice@example.com","password":"hunter22"}"#,
        )?;
        assert_eq!(decoded.mobile, None);
        Ok(())
    }
}
