//! Mail dispatch for the password-reset flow.
//!
//! The OTP issuer persists the hashed code first and then hands the plaintext
//! to a `MailSender`. Delivery is best-effort: a failed send is surfaced to
//! the caller as a server error, but the persisted OTP stays valid until its
//! expiry so the user can simply request a fresh code.
//!
//! The default sender for local dev is `LogMailSender`, which logs and returns
//! `Ok(())`. Production deployments configure `SmtpMailSender` (lettre over
//! STARTTLS).

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

#[derive(Clone, Debug)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

/// Mail delivery abstraction used by the OTP issuer.
#[async_trait]
pub trait MailSender: Send + Sync {
    /// Deliver a message or return an error so the caller can report it.
    async fn send(&self, message: &MailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real mail.
#[derive(Clone, Debug)]
pub struct LogMailSender;

#[async_trait]
impl MailSender for LogMailSender {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.text_body,
            "mail send stub"
        );
        Ok(())
    }
}

/// SMTP relay settings, usually sourced from `PORTALO_SMTP_*`.
#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

/// Production sender delivering over SMTP with STARTTLS.
#[derive(Clone)]
pub struct SmtpMailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailSender {
    /// Build the transport from relay settings.
    ///
    /// # Errors
    /// Returns an error if the relay host cannot be resolved into a transport.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let credentials = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .context("Failed to build SMTP transport")?
            .port(config.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl MailSender for SmtpMailSender {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .with_context(|| format!("Invalid from address: {}", self.from_address))?,
            )
            .to(message
                .to
                .parse()
                .with_context(|| format!("Invalid recipient address: {}", message.to))?)
            .subject(&message.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(message.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(message.html_body.clone()),
                    ),
            )
            .context("Failed to build mail message")?;

        self.mailer
            .send(email)
            .await
            .context("Failed to send mail")?;

        info!(to = %message.to, subject = %message.subject, "mail sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_sender_always_succeeds() {
        let sender = LogMailSender;
        let message = MailMessage {
            to: "user@example.com".to_string(),
            subject: "Password Reset OTP".to_string(),
            text_body: "Your OTP is 123456".to_string(),
            html_body: "<p>Your OTP is 123456</p>".to_string(),
        };
        assert!(sender.send(&message).await.is_ok());
    }

    #[tokio::test]
    async fn smtp_sender_builds_from_config() {
        let config = SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "mailer".to_string(),
            password: SecretString::from("app-password".to_string()),
            from_address: "no-reply@example.com".to_string(),
        };
        let sender = SmtpMailSender::new(&config).expect("transport");
        assert_eq!(sender.from_address, "no-reply@example.com");
    }

    #[tokio::test]
    async fn smtp_sender_rejects_bad_recipient() {
        let config = SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "mailer".to_string(),
            password: SecretString::from("app-password".to_string()),
            from_address: "no-reply@example.com".to_string(),
        };
        let sender = SmtpMailSender::new(&config).expect("transport");
        let message = MailMessage {
            to: "not-an-address".to_string(),
            subject: "Password Reset OTP".to_string(),
            text_body: String::new(),
            html_body: String::new(),
        };
        assert!(sender.send(&message).await.is_err());
    }
}
