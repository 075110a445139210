//! # Portalo (Customer Document Portal)
//!
//! `portalo` is a small document-portal service. Customers register, log in,
//! upload documents, and review their own upload history; administrators see
//! every upload and maintain the shared "call forms / required documents"
//! notice.
//!
//! ## Authentication
//!
//! Authentication is cookie-based with server-side sessions: the cookie holds
//! a random token and the database stores only its SHA-256 hash. Sessions
//! expire on a fixed TTL from issuance, not a sliding window.
//!
//! ## Password reset (OTP)
//!
//! Forgotten passwords are recovered through a one-time 6-digit code:
//!
//! 1. `/forgot-password` stores an Argon2 hash of the code with a 10 minute
//!    expiry and mails the plaintext to the registered address.
//! 2. `/verify-otp` checks the code against the stored hash and, on match,
//!    marks the caller's session as reset-authorized for that email.
//! 3. `/set-password` consumes the authorization, rewrites the password hash,
//!    and clears the OTP pair. Only this step invalidates the code.
//!
//! `/verify-otp` carries a tighter rate limit than the rest of the API since
//! the code is a guessable secret.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
