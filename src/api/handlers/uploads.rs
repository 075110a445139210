//! Document upload, listing, download, and deletion.
//!
//! Files land on disk under the uploads root with a millisecond-timestamp
//! prefix, and a row per file records who uploaded what. Filenames arriving
//! in the URL are untrusted: they are reduced to their final path component
//! before touching the filesystem.

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Extension, Multipart, Path as UrlPath},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderMap, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::{
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{error, info, warn, Instrument};
use utoipa::ToSchema;

use super::auth::{self, types::ApiMessage, AuthError, SessionRecord};
use crate::api::AppDirs;

const MAX_FILES_PER_UPLOAD: usize = 10;
const MAX_FILE_BYTES: usize = 5 * 1024 * 1024;

const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "application/pdf",
    "text/plain",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// One stored document, serialized with the field names the frontend reads.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Upload {
    pub id: i64,
    pub user: String,
    pub useremail: String,
    pub filename: String,
    pub originalname: String,
    pub extradata: String,
    pub uploadedat: String,
}

#[utoipa::path(
    post,
    path = "/upload",
    responses(
        (status = 200, description = "Files stored", body = ApiMessage),
        (status = 400, description = "No files or rejected file type", body = ApiMessage),
        (status = 401, description = "Not logged in", body = ApiMessage),
        (status = 500, description = "Server error", body = ApiMessage)
    ),
    tag = "uploads"
)]
pub async fn upload(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    dirs: Extension<AppDirs>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AuthError> {
    let session = auth::require_user(&headers, &pool).await?;

    let mut extra_data = String::new();
    let mut files: Vec<(String, Bytes)> = Vec::new();

    // Buffer and validate the whole batch first; nothing touches disk or the
    // database until every part has passed.
    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!("Failed to read multipart field: {err}");
        AuthError::InvalidInput("Invalid upload payload".to_string())
    })? {
        match field.name() {
            Some("extraData") => {
                extra_data = field.text().await.unwrap_or_default();
            }
            Some("files") => {
                if files.len() >= MAX_FILES_PER_UPLOAD {
                    return Err(AuthError::InvalidInput("Too many files".to_string()));
                }
                let original_name = sanitize_filename(field.file_name().unwrap_or_default());
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|err| {
                    error!("Failed to read upload body: {err}");
                    AuthError::InvalidInput("Invalid upload payload".to_string())
                })?;
                validate_part(&original_name, &content_type, bytes.len())?;
                files.push((original_name, bytes));
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(AuthError::InvalidInput("No files uploaded".to_string()));
    }

    // A failed write or insert unwinds the files already stored so a
    // rejected batch leaves nothing behind.
    let mut written: Vec<PathBuf> = Vec::new();
    for (original_name, bytes) in &files {
        let stored_name = stored_filename(original_name);
        let destination = dirs.uploads.join(&stored_name);
        if let Err(err) = tokio::fs::write(&destination, bytes).await {
            error!("Failed to write upload to disk: {err}");
            discard_files(&written).await;
            return Err(AuthError::Server);
        }
        written.push(destination);

        if let Err(err) =
            record_upload(&pool, &session, &stored_name, original_name, &extra_data).await
        {
            error!("Failed to record upload: {err}");
            discard_files(&written).await;
            return Err(AuthError::Server);
        }
    }

    info!("Stored {} uploaded file(s)", files.len());
    Ok((
        StatusCode::OK,
        Json(ApiMessage::ok("Files uploaded successfully")),
    ))
}

#[utoipa::path(
    get,
    path = "/api/my-uploads",
    responses(
        (status = 200, description = "Uploads visible to the caller, newest first", body = [Upload]),
        (status = 401, description = "Not logged in", body = ApiMessage)
    ),
    tag = "uploads"
)]
pub async fn my_uploads(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<impl IntoResponse, AuthError> {
    let session = auth::require_user(&headers, &pool).await?;

    // Admins see everything; customers only their own rows.
    let uploads = if session.is_admin() {
        list_all_uploads(&pool).await
    } else {
        let email = session.email.as_deref().unwrap_or_default();
        list_uploads_for_email(&pool, email).await
    }
    .map_err(|err| {
        error!("Failed to list uploads: {err}");
        AuthError::Server
    })?;

    Ok((StatusCode::OK, Json(uploads)))
}

#[utoipa::path(
    get,
    path = "/api/download/{filename}",
    params(("filename" = String, Path, description = "Stored filename")),
    responses(
        (status = 200, description = "File contents"),
        (status = 401, description = "Not logged in", body = ApiMessage),
        (status = 404, description = "Unknown file")
    ),
    tag = "uploads"
)]
pub async fn download(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    dirs: Extension<AppDirs>,
    UrlPath(filename): UrlPath<String>,
) -> Result<impl IntoResponse, AuthError> {
    auth::require_user(&headers, &pool).await?;

    let filename = sanitize_filename(&filename);
    let path = dirs.uploads.join(&filename);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return Ok((
                StatusCode::NOT_FOUND,
                HeaderMap::new(),
                b"File not found".to_vec(),
            ))
        }
    };

    let mut response_headers = HeaderMap::new();
    if let Ok(value) = format!("attachment; filename=\"{filename}\"").parse() {
        response_headers.insert(CONTENT_DISPOSITION, value);
    }
    if let Ok(value) = "application/octet-stream".parse() {
        response_headers.insert(CONTENT_TYPE, value);
    }
    Ok((StatusCode::OK, response_headers, bytes))
}

#[utoipa::path(
    delete,
    path = "/api/delete/{filename}",
    params(("filename" = String, Path, description = "Stored filename")),
    responses(
        (status = 200, description = "Row and file removed", body = ApiMessage),
        (status = 401, description = "Not logged in", body = ApiMessage),
        (status = 500, description = "Server error", body = ApiMessage)
    ),
    tag = "uploads"
)]
pub async fn delete(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    dirs: Extension<AppDirs>,
    UrlPath(filename): UrlPath<String>,
) -> Result<impl IntoResponse, AuthError> {
    auth::require_user(&headers, &pool).await?;

    let filename = sanitize_filename(&filename);
    delete_upload_row(&pool, &filename).await.map_err(|err| {
        error!("Failed to delete upload row: {err}");
        AuthError::Server
    })?;

    // The row is authoritative; a missing file on disk is not an error.
    let path = dirs.uploads.join(&filename);
    if let Err(err) = tokio::fs::remove_file(&path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            error!("Failed to remove uploaded file: {err}");
            return Err(AuthError::Server);
        }
    }

    Ok((
        StatusCode::OK,
        Json(ApiMessage::ok("File deleted successfully")),
    ))
}

/// Accept or reject one multipart file before anything is persisted.
fn validate_part(original_name: &str, content_type: &str, size: usize) -> Result<(), AuthError> {
    if original_name.is_empty() {
        return Err(AuthError::InvalidInput("Missing filename".to_string()));
    }
    if !ALLOWED_MIME_TYPES.contains(&content_type) {
        return Err(AuthError::InvalidInput(
            "Invalid file type. Only images, PDFs, and documents are allowed.".to_string(),
        ));
    }
    if size > MAX_FILE_BYTES {
        return Err(AuthError::InvalidInput("File too large".to_string()));
    }
    Ok(())
}

/// Remove the files of a batch that did not fully persist.
async fn discard_files(paths: &[PathBuf]) {
    for path in paths {
        if let Err(err) = tokio::fs::remove_file(path).await {
            warn!("Failed to remove partial upload {}: {err}", path.display());
        }
    }
}

/// Reduce an untrusted filename to its final path component.
fn sanitize_filename(raw: &str) -> String {
    Path::new(raw)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string()
}

/// On-disk name: millisecond timestamp prefix keeps repeated uploads apart.
fn stored_filename(original_name: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis());
    format!("{millis}-{original_name}")
}

async fn record_upload(
    pool: &PgPool,
    session: &SessionRecord,
    stored_name: &str,
    original_name: &str,
    extra_data: &str,
) -> Result<()> {
    let query = r"
        INSERT INTO uploads (user_name, user_email, filename, original_name, extra_data)
        VALUES ($1, $2, $3, $4, $5)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session.name.as_deref().unwrap_or_default())
        .bind(session.email.as_deref().unwrap_or_default())
        .bind(stored_name)
        .bind(original_name)
        .bind(extra_data)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to record upload")?;
    Ok(())
}

const SELECT_UPLOADS: &str = r#"
    SELECT id, user_name, user_email, filename, original_name, extra_data,
           to_char(uploaded_at AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS uploaded_at
    FROM uploads
"#;

async fn list_all_uploads(pool: &PgPool) -> Result<Vec<Upload>> {
    let query = format!("{SELECT_UPLOADS} ORDER BY uploaded_at DESC");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list uploads")?;
    Ok(rows.iter().map(upload_from_row).collect())
}

async fn list_uploads_for_email(pool: &PgPool, email: &str) -> Result<Vec<Upload>> {
    let query = format!("{SELECT_UPLOADS} WHERE user_email = $1 ORDER BY uploaded_at DESC");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(email)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list uploads")?;
    Ok(rows.iter().map(upload_from_row).collect())
}

fn upload_from_row(row: &sqlx::postgres::PgRow) -> Upload {
    Upload {
        id: row.get("id"),
        user: row.get("user_name"),
        useremail: row.get("user_email"),
        filename: row.get("filename"),
        originalname: row.get("original_name"),
        extradata: row.get("extra_data"),
        uploadedat: row
            .get::<Option<String>, _>("uploaded_at")
            .unwrap_or_default(),
    }
}

async fn delete_upload_row(pool: &PgPool, filename: &str) -> Result<()> {
    let query = "DELETE FROM uploads WHERE filename = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(filename)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete upload")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_filename_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("/etc/shadow"), "shadow");
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("a/b/c.txt"), "c.txt");
    }

    #[test]
    fn sanitize_filename_handles_degenerate_input() {
        assert_eq!(sanitize_filename(""), "");
        assert_eq!(sanitize_filename(".."), "");
        assert_eq!(sanitize_filename("/"), "");
    }

    #[test]
    fn stored_filename_keeps_original_suffix() {
        let name = stored_filename("report.pdf");
        assert!(name.ends_with("-report.pdf"));
        let prefix = name.trim_end_matches("-report.pdf");
        assert!(prefix.parse::<u128>().is_ok());
    }

    #[test]
    fn validate_part_rejects_before_anything_is_stored() {
        assert!(validate_part("", "application/pdf", 10).is_err());
        assert!(validate_part("run.sh", "application/x-sh", 10).is_err());
        assert!(validate_part("big.pdf", "application/pdf", MAX_FILE_BYTES + 1).is_err());
        assert!(validate_part("report.pdf", "application/pdf", MAX_FILE_BYTES).is_ok());
    }

    #[tokio::test]
    async fn discard_files_unwinds_a_partial_batch() {
        let dir = std::env::temp_dir().join(format!("portalo-uploads-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.expect("mkdir");
        let first = dir.join("1-a.pdf");
        let second = dir.join("2-b.pdf");
        tokio::fs::write(&first, b"a").await.expect("write");
        tokio::fs::write(&second, b"b").await.expect("write");

        // The missing third path must not stop the other removals.
        let paths = vec![first.clone(), dir.join("3-missing.pdf"), second.clone()];
        discard_files(&paths).await;
        assert!(!first.exists());
        assert!(!second.exists());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[test]
    fn allowed_types_cover_documents_and_images() {
        assert!(ALLOWED_MIME_TYPES.contains(&"application/pdf"));
        assert!(ALLOWED_MIME_TYPES.contains(&"image/png"));
        assert!(!ALLOWED_MIME_TYPES.contains(&"application/x-sh"));
    }

    #[test]
    fn upload_serializes_frontend_field_names() {
        let value = serde_json::to_value(Upload {
            id: 1,
            user: "Alice".to_string(),
            useremail: "alice@example.com".to_string(),
            filename: "123-report.pdf".to_string(),
            originalname: "report.pdf".to_string(),
            extradata: String::new(),
            uploadedat: "2024-01-01T00:00:00Z".to_string(),
        })
        .expect("serialize");
        assert!(value.get("originalname").is_some());
        assert!(value.get("uploadedat").is_some());
    }
}
