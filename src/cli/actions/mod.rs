pub mod server;

use crate::api::mail::SmtpConfig;
use std::path::PathBuf;

/// Actions the CLI can dispatch to.
#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        frontend_url: String,
        frontend_dir: PathBuf,
        uploads_dir: PathBuf,
        admin_emails: Vec<String>,
        reveal_unknown_email: bool,
        smtp: Option<SmtpConfig>,
    },
}
