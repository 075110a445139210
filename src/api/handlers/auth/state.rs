//! Auth state and configuration.

use std::sync::Arc;

use crate::api::mail::MailSender;

use super::rate_limit::RateLimiter;
use super::types::Role;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_OTP_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_PASSWORD_MIN_LENGTH: usize = 6;
const DEFAULT_ADMIN_NAME_MARKER: &str = "admin";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    session_ttl_seconds: i64,
    otp_ttl_seconds: i64,
    password_min_length: usize,
    admin_emails: Vec<String>,
    admin_name_marker: String,
    reveal_unknown_email: bool,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            password_min_length: DEFAULT_PASSWORD_MIN_LENGTH,
            admin_emails: Vec::new(),
            admin_name_marker: DEFAULT_ADMIN_NAME_MARKER.to_string(),
            reveal_unknown_email: true,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_password_min_length(mut self, length: usize) -> Self {
        self.password_min_length = length;
        self
    }

    #[must_use]
    pub fn with_admin_emails(mut self, emails: Vec<String>) -> Self {
        self.admin_emails = emails
            .into_iter()
            .map(|email| email.trim().to_lowercase())
            .collect();
        self
    }

    /// Whether `/forgot-password` may reveal that an email is unknown.
    /// Defaults to the original user-visible behavior; disable to harden
    /// against account enumeration.
    #[must_use]
    pub fn with_reveal_unknown_email(mut self, reveal: bool) -> Self {
        self.reveal_unknown_email = reveal;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(crate) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(crate) fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    pub(crate) fn password_min_length(&self) -> usize {
        self.password_min_length
    }

    pub(crate) fn reveal_unknown_email(&self) -> bool {
        self.reveal_unknown_email
    }

    pub(crate) fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }

    /// Role assigned at registration: admin only when the normalized email is
    /// allow-listed or the display name carries the admin marker.
    pub(crate) fn role_for_registration(&self, name: &str, email_normalized: &str) -> Role {
        if self.admin_emails.iter().any(|e| e == email_normalized)
            || name.to_lowercase().contains(&self.admin_name_marker)
        {
            Role::Admin
        } else {
            Role::Customer
        }
    }
}

pub struct AuthState {
    config: AuthConfig,
    rate_limiter: Arc<dyn RateLimiter>,
    mailer: Arc<dyn MailSender>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        rate_limiter: Arc<dyn RateLimiter>,
        mailer: Arc<dyn MailSender>,
    ) -> Self {
        Self {
            config,
            rate_limiter,
            mailer,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    pub(crate) fn mailer(&self) -> &dyn MailSender {
        self.mailer.as_ref()
    }
}
