use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::info;

use crate::error::{ArchiveError, Result};
use crate::io::MemoryReader;
use crate::zip::ZipParser;

/// Type reported for every member; contents are never sniffed.
pub const DEFAULT_ENTRY_TYPE: &str = "application/octet-stream";

/// A regular (non-directory) member of an inspected archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerEntry {
    #[serde(rename = "file_path")]
    pub path: String,
    #[serde(rename = "size")]
    pub uncompressed_size: u64,
    #[serde(rename = "mimetype")]
    pub inferred_type: String,
}

/// Summary of an inspected archive, serialized as the inspection response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    #[serde(rename = "filename")]
    pub source_name: String,
    /// Length of the archive itself, not of its contents
    #[serde(rename = "archive_size")]
    pub archive_size_bytes: u64,
    #[serde(rename = "total_size")]
    pub total_uncompressed_bytes: u64,
    #[serde(rename = "total_files")]
    pub entry_count: u64,
    /// Central directory order
    #[serde(rename = "files")]
    pub entries: Vec<ContainerEntry>,
}

/// Parse the central directory of `raw` and summarize its regular members.
///
/// Directory records are skipped. Any malformed structure fails the whole
/// inspection with [`ArchiveError::Decode`].
pub async fn inspect(raw: Bytes, source_name: &str) -> Result<ArchiveSummary> {
    let archive_size_bytes = raw.len() as u64;
    let parser = ZipParser::new(Arc::new(MemoryReader::new(raw)));
    let records = parser
        .list_files()
        .await
        .map_err(ArchiveError::from_decode)?;

    let mut total_uncompressed_bytes = 0u64;
    let mut entries = Vec::with_capacity(records.len());
    for record in records.into_iter().filter(|r| !r.is_directory) {
        total_uncompressed_bytes = total_uncompressed_bytes
            .checked_add(record.uncompressed_size)
            .ok_or_else(|| ArchiveError::Decode("total uncompressed size overflows".into()))?;
        entries.push(ContainerEntry {
            path: record.file_name,
            uncompressed_size: record.uncompressed_size,
            inferred_type: DEFAULT_ENTRY_TYPE.to_string(),
        });
    }

    info!(
        source = source_name,
        archive_bytes = archive_size_bytes,
        entries = entries.len(),
        total_bytes = total_uncompressed_bytes,
        "Inspected archive"
    );

    Ok(ArchiveSummary {
        source_name: source_name.to_string(),
        archive_size_bytes,
        total_uncompressed_bytes,
        entry_count: entries.len() as u64,
        entries,
    })
}
