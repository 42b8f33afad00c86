//! Error types for archive building and inspection.

use thiserror::Error;

/// Result type alias using `ArchiveError`.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Input rejected before any archive work starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The build request carried no files.
    #[error("no files")]
    NoFiles,

    /// A file declared a content type outside the policy.
    #[error("disallowed type for {name}: {declared_type}")]
    DisallowedType {
        /// Name of the first offending file.
        name: String,
        /// The type the caller declared for it.
        declared_type: String,
    },
}

/// Errors that can occur while building or inspecting an archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Input failed validation; nothing was built.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Input is not a readable ZIP container.
    #[error("not a valid container: {0}")]
    Decode(String),

    /// Archive could not be produced within the format's limits.
    #[error("cannot encode archive: {0}")]
    Encode(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    /// Convert a codec error, keeping I/O failures distinguishable.
    pub(crate) fn from_encode(err: anyhow::Error) -> Self {
        match err.downcast::<std::io::Error>() {
            Ok(io) => Self::Io(io),
            Err(other) => Self::Encode(format!("{other:#}")),
        }
    }

    pub(crate) fn from_decode(err: anyhow::Error) -> Self {
        Self::Decode(format!("{err:#}"))
    }
}
