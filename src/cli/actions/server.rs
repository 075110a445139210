use crate::api::{self, handlers::auth, AppDirs};
use crate::cli::actions::Action;
use anyhow::{Context, Result};
use url::Url;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            frontend_url,
            frontend_dir,
            uploads_dir,
            admin_emails,
            reveal_unknown_email,
            smtp,
        } => {
            // Fail fast on malformed connection strings.
            Url::parse(&dsn).context("Invalid database connection string")?;

            let auth_config = auth::AuthConfig::new(frontend_url)
                .with_admin_emails(admin_emails)
                .with_reveal_unknown_email(reveal_unknown_email);

            let dirs = AppDirs {
                frontend: frontend_dir,
                uploads: uploads_dir,
            };

            api::new(port, dsn, auth_config, dirs, smtp).await?;
        }
    }

    Ok(())
}
