//! HTTP server wiring: pool, migrations, router, middleware stack.

use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, MatchedPath, Request},
    http::{
        header::CONTENT_TYPE, HeaderName, HeaderValue, Method,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    services::ServeDir,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use url::Url;

pub mod handlers;
pub mod mail;
mod openapi;

use handlers::auth::{self, AuthError, RateLimitAction, RateLimitDecision};
use mail::{LogMailSender, MailSender, SmtpConfig, SmtpMailSender};

const GENERAL_RATE_LIMIT_MESSAGE: &str = "Too many requests, please try again later.";

// 10 files x 5 MiB plus multipart framing headroom.
const UPLOAD_BODY_LIMIT: usize = 55 * 1024 * 1024;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Filesystem roots the server reads and writes.
#[derive(Clone, Debug)]
pub struct AppDirs {
    pub frontend: PathBuf,
    pub uploads: PathBuf,
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: String,
    auth_config: auth::AuthConfig,
    dirs: AppDirs,
    smtp: Option<SmtpConfig>,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tokio::fs::create_dir_all(&dirs.uploads)
        .await
        .context("Failed to create uploads directory")?;

    // Expired sessions are invisible to lookups but still occupy rows; sweep
    // them at startup and then hourly. The first tick fires immediately.
    let sweep_pool = pool.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            match auth::delete_expired_sessions(&sweep_pool).await {
                Ok(0) => {}
                Ok(removed) => info!("Removed {removed} expired session(s)"),
                Err(err) => error!("Failed to sweep expired sessions: {err}"),
            }
        }
    });

    let mailer: Arc<dyn MailSender> = match smtp {
        Some(config) => Arc::new(SmtpMailSender::new(&config)?),
        None => {
            info!("No SMTP relay configured; OTP mail will be logged");
            Arc::new(LogMailSender)
        }
    };

    let auth_state = Arc::new(auth::AuthState::new(
        auth_config,
        Arc::new(auth::SlidingWindowRateLimiter::new()),
        mailer,
    ));

    let frontend_origin = frontend_origin(auth_state.config().frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let app = Router::new()
        .route("/", get(handlers::pages::public_page))
        .route("/index.html", get(handlers::pages::public_page))
        .route("/login.html", get(handlers::pages::public_page))
        .route("/regester.html", get(handlers::pages::public_page))
        .route("/forgot-password.html", get(handlers::pages::public_page))
        .route("/dashboard.html", get(handlers::pages::protected_page))
        .route("/upload.html", get(handlers::pages::protected_page))
        .route("/info.html", get(handlers::pages::protected_page))
        .route("/admin-info.html", get(handlers::pages::protected_page))
        .route("/register", post(handlers::auth::register::register))
        .route("/login", post(handlers::auth::login::login))
        .route("/logout", post(handlers::auth::session::logout))
        .route("/api/session", get(handlers::auth::session::session))
        .route(
            "/forgot-password",
            post(handlers::auth::reset::forgot_password),
        )
        .route("/verify-otp", post(handlers::auth::reset::verify_otp))
        .route("/set-password", post(handlers::auth::reset::set_password))
        .route(
            "/upload",
            post(handlers::uploads::upload).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/api/my-uploads", get(handlers::uploads::my_uploads))
        .route("/api/download/:filename", get(handlers::uploads::download))
        .route("/api/delete/:filename", delete(handlers::uploads::delete))
        .route("/get-info", get(handlers::notice::get_info))
        .route("/update-info", post(handlers::notice::update_info))
        .route("/clear-info", post(handlers::notice::clear_info))
        .route("/health", get(handlers::health::health))
        .route("/openapi.json", get(openapi::openapi_json))
        .fallback_service(ServeDir::new(dirs.frontend.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth_state.clone()))
                .layer(Extension(dirs))
                .layer(Extension(pool.clone()))
                .layer(middleware::from_fn(general_rate_limit))
                .layer(middleware::from_fn(handlers::pages::guard_protected_pages)),
        )
        .layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

/// General API ceiling; `/verify-otp` carries its own tighter one in-handler.
async fn general_rate_limit(request: Request, next: Next) -> Response {
    // Probes stay exempt so orchestration never gets throttled out.
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }
    if let Some(auth_state) = request.extensions().get::<Arc<auth::AuthState>>() {
        let client_ip = auth::extract_client_ip(request.headers());
        if auth_state
            .rate_limiter()
            .check_ip(client_ip.as_deref(), RateLimitAction::General)
            == RateLimitDecision::Limited
        {
            return AuthError::RateLimited(GENERAL_RATE_LIMIT_MESSAGE).into_response();
        }
    }
    next.run(request).await
}

fn make_span(request: &axum::http::Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_origin_keeps_scheme_host_port() {
        let origin = frontend_origin("http://localhost:5000/ignored/path").expect("origin");
        assert_eq!(origin, HeaderValue::from_static("http://localhost:5000"));

        let origin = frontend_origin("https://portal.example.com").expect("origin");
        assert_eq!(
            origin,
            HeaderValue::from_static("https://portal.example.com")
        );
    }

    #[test]
    fn frontend_origin_rejects_garbage() {
        assert!(frontend_origin("not a url").is_err());
        assert!(frontend_origin("mailto:user@example.com").is_err());
    }

    #[test]
    fn upload_body_limit_covers_max_batch() {
        assert!(UPLOAD_BODY_LIMIT > 10 * 5 * 1024 * 1024);
    }

    #[test]
    fn session_sweep_is_shorter_than_the_session_ttl() {
        let default_ttl = crate::api::handlers::auth::AuthConfig::new(String::new())
            .session_ttl_seconds();
        assert!(SESSION_SWEEP_INTERVAL.as_secs() < u64::try_from(default_ttl).expect("ttl"));
    }
}
