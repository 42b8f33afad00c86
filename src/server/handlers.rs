use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use super::AppState;
use super::error::ApiError;
use crate::archive::{self, ArchiveSummary, InputFile};
use crate::mail::{self, Attachment};

/// Multipart field holding the files to bundle.
const FILES_FIELD: &str = "files[]";
/// Multipart field holding a single upload.
const FILE_FIELD: &str = "file";
const EMAILS_FIELD: &str = "emails";

const ARCHIVE_FILENAME: &str = "archive.zip";

/// One file part read out of a multipart body.
struct Upload {
    filename: String,
    content_type: String,
    content: Bytes,
}

/// Read every part of `multipart`, keeping file parts named `field` and text
/// parts named in `text_fields`. A part named `field` without a filename is
/// not a file and is skipped.
async fn collect_parts(
    mut multipart: Multipart,
    field: &str,
    text_fields: &[&str],
) -> Result<(Vec<Upload>, Vec<(String, String)>), ApiError> {
    let mut uploads = Vec::new();
    let mut texts = Vec::new();

    while let Some(part) = multipart.next_field().await? {
        let name = part.name().unwrap_or_default().to_string();
        if name == field {
            // Only parts carrying a filename are uploads
            let Some(filename) = part.file_name().map(str::to_string) else {
                continue;
            };
            // A missing part content type declares nothing and fails every policy
            let content_type = part.content_type().unwrap_or_default().to_string();
            let content = part.bytes().await?;
            uploads.push(Upload {
                filename,
                content_type,
                content,
            });
        } else if text_fields.contains(&name.as_str()) {
            texts.push((name, part.text().await?));
        }
    }

    Ok((uploads, texts))
}

/// `POST /api/archive/files`: bundle uploads into `archive.zip`.
pub async fn create_archive(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let (uploads, _) = collect_parts(multipart, FILES_FIELD, &[]).await?;
    let files: Vec<InputFile> = uploads
        .into_iter()
        .map(|u| InputFile::new(u.filename, u.content_type, u.content))
        .collect();

    // Reject before handing work to the blocking pool
    archive::validate(&files, &state.build_policy).map_err(crate::error::ArchiveError::from)?;

    let policy = state.build_policy.clone();
    let options = state.build_options;
    let zip = tokio::task::spawn_blocking(move || archive::build(&files, &policy, &options))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={ARCHIVE_FILENAME}"),
            ),
        ],
        zip,
    )
        .into_response())
}

/// `POST /api/archive/information`: summarize an uploaded archive.
pub async fn archive_information(multipart: Multipart) -> Result<Json<ArchiveSummary>, ApiError> {
    let (uploads, _) = collect_parts(multipart, FILE_FIELD, &[]).await?;
    let upload = uploads.into_iter().next().ok_or(ApiError::NoFile)?;

    let summary = archive::inspect(upload.content, &upload.filename).await?;
    Ok(Json(summary))
}

/// `POST /api/mail/file`: forward one upload to every listed recipient.
pub async fn send_file(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<StatusCode, ApiError> {
    let (uploads, texts) = collect_parts(multipart, FILE_FIELD, &[EMAILS_FIELD]).await?;
    let upload = uploads.into_iter().next().ok_or(ApiError::NoFile)?;

    if !state.mail_policy.is_allowed(&upload.content_type) {
        return Err(ApiError::UnsupportedType);
    }

    let recipients: Vec<String> = texts
        .iter()
        .flat_map(|(_, value)| mail::parse_recipients(value))
        .collect();
    if recipients.is_empty() {
        return Err(ApiError::NoEmails);
    }

    let relay = state.mail.as_ref().ok_or(ApiError::MailUnavailable)?;
    let attachment = Attachment {
        filename: upload.filename,
        content_type: upload.content_type,
        content: upload.content,
    };
    mail::relay_to_all(relay.as_ref(), &recipients, &attachment).await;

    Ok(StatusCode::OK)
}
