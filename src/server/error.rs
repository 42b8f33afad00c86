//! HTTP error responses.
//!
//! Bodies are short `text/plain` messages; the status code carries the class.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::error::{ArchiveError, ValidationError};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Error parsing form")]
    Form(#[from] MultipartError),

    #[error("No files uploaded")]
    NoFiles,

    #[error("No file uploaded")]
    NoFile,

    #[error("File type not allowed: {0}")]
    TypeNotAllowed(String),

    #[error("Unsupported file type")]
    UnsupportedType,

    #[error("No emails provided")]
    NoEmails,

    #[error("Not a valid ZIP file")]
    InvalidArchive(String),

    #[error("Mail relay not configured")]
    MailUnavailable,

    #[error("Error creating zip")]
    Internal(String),
}

impl From<ArchiveError> for ApiError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Validation(ValidationError::NoFiles) => Self::NoFiles,
            ArchiveError::Validation(ValidationError::DisallowedType { name, .. }) => {
                Self::TypeNotAllowed(name)
            }
            ArchiveError::Decode(reason) => Self::InvalidArchive(reason),
            other @ (ArchiveError::Encode(_) | ArchiveError::Io(_)) => {
                Self::Internal(other.to_string())
            }
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Form(e) => e.status(),
            Self::NoFiles
            | Self::NoFile
            | Self::TypeNotAllowed(_)
            | Self::UnsupportedType
            | Self::NoEmails
            | Self::InvalidArchive(_) => StatusCode::BAD_REQUEST,
            Self::MailUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Form(e) => tracing::debug!(error = %e.body_text(), %status, "Rejected multipart body"),
            Self::InvalidArchive(reason) => tracing::debug!(%reason, "Rejected upload as not a ZIP file"),
            Self::Internal(reason) => tracing::error!(%reason, "Request failed"),
            other => tracing::debug!(error = %other, %status, "Rejected request"),
        }
        (status, self.to_string()).into_response()
    }
}
