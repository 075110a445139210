//! Shared portal notice: call forms and required documents.
//!
//! A single latest row wins; updating replaces all previous rows. Input is
//! stripped of HTML tags before storage since the frontend renders the text
//! into the page.

use anyhow::{Context, Result};
use axum::{
    extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse, Json,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::{error, info, Instrument};
use utoipa::ToSchema;

use super::auth::{self, types::ApiMessage, AuthError};

const EMPTY_CALL_FORMS: &str = "No information added yet.";
const EMPTY_REQUIRED_DOCUMENTS: &str = "No documents listed yet.";

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Notice {
    #[serde(rename = "callForms")]
    pub call_forms: String,
    #[serde(rename = "requiredDocuments")]
    pub required_documents: String,
}

#[utoipa::path(
    get,
    path = "/get-info",
    responses(
        (status = 200, description = "Latest notice, or placeholder text", body = Notice)
    ),
    tag = "notice"
)]
pub async fn get_info(pool: Extension<PgPool>) -> Result<impl IntoResponse, AuthError> {
    let notice = latest_notice(&pool).await.map_err(|err| {
        error!("Failed to read notice: {err}");
        AuthError::Server
    })?;

    let body = notice.unwrap_or_else(|| Notice {
        call_forms: EMPTY_CALL_FORMS.to_string(),
        required_documents: EMPTY_REQUIRED_DOCUMENTS.to_string(),
    });
    Ok((StatusCode::OK, Json(body)))
}

#[utoipa::path(
    post,
    path = "/update-info",
    request_body = Notice,
    responses(
        (status = 200, description = "Notice replaced", body = ApiMessage),
        (status = 401, description = "Not logged in", body = ApiMessage),
        (status = 403, description = "Caller is not an admin", body = ApiMessage),
        (status = 500, description = "Server error", body = ApiMessage)
    ),
    tag = "notice"
)]
pub async fn update_info(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Json(payload): Json<Notice>,
) -> Result<impl IntoResponse, AuthError> {
    auth::require_admin(&headers, &pool).await?;

    let call_forms = strip_html(&payload.call_forms);
    let required_documents = strip_html(&payload.required_documents);

    replace_notice(&pool, &call_forms, &required_documents)
        .await
        .map_err(|err| {
            error!("Failed to update notice: {err}");
            AuthError::Server
        })?;

    info!("Portal notice updated");
    Ok((
        StatusCode::OK,
        Json(ApiMessage::ok("Information updated successfully")),
    ))
}

#[utoipa::path(
    post,
    path = "/clear-info",
    responses(
        (status = 200, description = "Notice cleared", body = ApiMessage),
        (status = 401, description = "Not logged in", body = ApiMessage),
        (status = 403, description = "Caller is not an admin", body = ApiMessage),
        (status = 500, description = "Server error", body = ApiMessage)
    ),
    tag = "notice"
)]
pub async fn clear_info(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<impl IntoResponse, AuthError> {
    auth::require_admin(&headers, &pool).await?;

    clear_notice(&pool).await.map_err(|err| {
        error!("Failed to clear notice: {err}");
        AuthError::Server
    })?;

    info!("Portal notice cleared");
    Ok((
        StatusCode::OK,
        Json(ApiMessage::ok("Information cleared successfully")),
    ))
}

/// Remove HTML tags, keeping the text content with basic entities decoded.
fn strip_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

async fn latest_notice(pool: &PgPool) -> Result<Option<Notice>> {
    let query = r"
        SELECT call_forms, required_documents
        FROM portal_notice
        ORDER BY id DESC
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to read notice")?;

    Ok(row.map(|row| Notice {
        call_forms: row.get("call_forms"),
        required_documents: row.get("required_documents"),
    }))
}

/// Replace whatever notice rows exist with a single new one.
async fn replace_notice(pool: &PgPool, call_forms: &str, required_documents: &str) -> Result<()> {
    let query = r"
        WITH cleared AS (DELETE FROM portal_notice)
        INSERT INTO portal_notice (call_forms, required_documents)
        VALUES ($1, $2)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(call_forms)
        .bind(required_documents)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to replace notice")?;
    Ok(())
}

async fn clear_notice(pool: &PgPool) -> Result<()> {
    let query = "DELETE FROM portal_notice";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to clear notice")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_removes_tags() {
        assert_eq!(
            strip_html("<script>alert(1)</script>Bring ID"),
            "alert(1)Bring ID"
        );
        assert_eq!(strip_html("<b>Form A</b> and <i>Form B</i>"), "Form A and Form B");
    }

    #[test]
    fn strip_html_decodes_basic_entities() {
        assert_eq!(strip_html("Forms &amp; documents"), "Forms & documents");
        assert_eq!(strip_html("a &lt; b &gt; c"), "a < b > c");
    }

    #[test]
    fn strip_html_passes_plain_text() {
        assert_eq!(strip_html("Passport, two photos"), "Passport, two photos");
    }

    #[test]
    fn notice_serializes_frontend_field_names() {
        let value = serde_json::to_value(Notice {
            call_forms: "Form A".to_string(),
            required_documents: "Passport".to_string(),
        })
        .expect("serialize");
        assert!(value.get("callForms").is_some());
        assert!(value.get("requiredDocuments").is_some());
    }
}
