//! Frontend page serving.
//!
//! Public pages are served to anyone; protected pages answer anonymous
//! browsers with a redirect to the login page rather than a JSON error,
//! since the caller is a navigating browser, not the API client.

use axum::{
    extract::{Extension, Request},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use percent_encoding::percent_decode_str;
use sqlx::PgPool;
use std::path::Path;
use tracing::error;

use super::auth::session::authenticate_session;
use crate::api::AppDirs;

const PROTECTED_PAGES: &[&str] = &[
    "dashboard.html",
    "upload.html",
    "info.html",
    "admin-info.html",
];

/// Serve a public frontend page; `/` maps to the index.
pub async fn public_page(dirs: Extension<AppDirs>, uri: Uri) -> Response {
    serve_html(&dirs, page_name(uri.path())).await
}

/// Serve a protected frontend page, redirecting anonymous browsers to login.
pub async fn protected_page(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    dirs: Extension<AppDirs>,
    uri: Uri,
) -> Response {
    let session = match authenticate_session(&headers, &pool).await {
        Ok(session) => session,
        Err(status) => return status.into_response(),
    };
    let logged_in = session.is_some_and(|record| record.is_authenticated());
    if !logged_in {
        return Redirect::to("/login.html").into_response();
    }
    serve_html(&dirs, page_name(uri.path())).await
}

/// Session gate for protected pages, applied ahead of the static fallback.
///
/// The fallback percent-decodes paths before resolving them, while route
/// matching sees the raw spelling; an encoded request like
/// `/%64ashboard.html` would otherwise reach the file server without a
/// session check. The gate decodes the same way the fallback does.
pub async fn guard_protected_pages(request: Request, next: Next) -> Response {
    let decoded = percent_decode_str(request.uri().path())
        .decode_utf8_lossy()
        .into_owned();
    if is_protected_page(&decoded) {
        let Some(pool) = request.extensions().get::<PgPool>() else {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        };
        let session = match authenticate_session(request.headers(), pool).await {
            Ok(session) => session,
            Err(status) => return status.into_response(),
        };
        if !session.is_some_and(|record| record.is_authenticated()) {
            return Redirect::to("/login.html").into_response();
        }
    }
    next.run(request).await
}

fn is_protected_page(path: &str) -> bool {
    PROTECTED_PAGES.contains(&page_name(path))
}

/// Final path component of the request, defaulting to the index page.
fn page_name(path: &str) -> &str {
    let name = path.trim_start_matches('/');
    if name.is_empty() {
        "index.html"
    } else {
        Path::new(name)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("index.html")
    }
}

async fn serve_html(dirs: &AppDirs, name: &str) -> Response {
    let path = dirs.frontend.join(name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/html; charset=utf-8")],
            bytes,
        )
            .into_response(),
        Err(err) => {
            error!("Failed to read page {name}: {err}");
            (StatusCode::NOT_FOUND, "Page not found").into_response()
        }
    }
}
