use std::num::NonZeroUsize;
use std::thread;

use bytes::Bytes;
use tracing::{debug, info};

use super::policy::AllowList;
use crate::error::{ArchiveError, Result, ValidationError};
use crate::zip::{CompressionMethod, PreparedEntry, ZipWriter};

/// One uploaded file, owned by a single build request.
#[derive(Debug, Clone)]
pub struct InputFile {
    /// Path of the member inside the archive, used verbatim
    pub name: String,
    /// Content type asserted by the caller
    pub declared_type: String,
    pub content: Bytes,
}

impl InputFile {
    pub fn new(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    pub compression: CompressionMethod,
    /// Compress entries on scoped worker threads before committing them in order
    pub parallel: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            compression: CompressionMethod::Deflate,
            parallel: true,
        }
    }
}

/// Check the whole batch against `policy` before anything is written.
pub fn validate(files: &[InputFile], policy: &AllowList) -> std::result::Result<(), ValidationError> {
    if files.is_empty() {
        return Err(ValidationError::NoFiles);
    }
    if let Some(bad) = files.iter().find(|f| !policy.is_allowed(&f.declared_type)) {
        return Err(ValidationError::DisallowedType {
            name: bad.name.clone(),
            declared_type: bad.declared_type.clone(),
        });
    }
    Ok(())
}

/// Bundle `files` into one ZIP archive, one member per file in input order.
///
/// # Errors
///
/// - [`ArchiveError::Validation`] if `files` is empty or any declared type
///   is outside `policy`; no work is done in that case.
/// - [`ArchiveError::Encode`] / [`ArchiveError::Io`] if the archive cannot
///   be produced. No partial archive is returned.
pub fn build(files: &[InputFile], policy: &AllowList, options: &BuildOptions) -> Result<Vec<u8>> {
    validate(files, policy)?;

    let prepared = if options.parallel && files.len() > 1 {
        prepare_parallel(files, options.compression)?
    } else {
        files
            .iter()
            .map(|f| prepare(f, options.compression))
            .collect::<Result<Vec<_>>>()?
    };

    let total: usize = files.iter().map(|f| f.content.len()).sum();
    let mut writer = ZipWriter::new(Vec::with_capacity(total));
    for entry in prepared {
        debug!(
            name = entry.file_name(),
            method = ?entry.compression_method(),
            "Committing archive entry"
        );
        writer.add_entry(entry).map_err(ArchiveError::from_encode)?;
    }
    let archive = writer.finish().map_err(ArchiveError::from_encode)?;

    info!(
        entries = files.len(),
        input_bytes = total,
        archive_bytes = archive.len(),
        "Built archive"
    );
    Ok(archive)
}

fn prepare(file: &InputFile, method: CompressionMethod) -> Result<PreparedEntry> {
    PreparedEntry::from_reader(file.name.clone(), method, file.content.as_ref())
        .map_err(ArchiveError::from_encode)
}

/// Prepare contiguous chunks of `files` on scoped threads.
///
/// Chunks are joined in spawn order, so the result keeps input order.
fn prepare_parallel(files: &[InputFile], method: CompressionMethod) -> Result<Vec<PreparedEntry>> {
    let workers = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .min(files.len());
    let chunk_size = files.len().div_ceil(workers);

    thread::scope(|scope| {
        let handles: Vec<_> = files
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|f| prepare(f, method))
                        .collect::<Result<Vec<_>>>()
                })
            })
            .collect();

        let mut prepared = Vec::with_capacity(files.len());
        for handle in handles {
            let chunk = handle
                .join()
                .map_err(|_| ArchiveError::Encode("compression worker panicked".to_string()))??;
            prepared.extend(chunk);
        }
        Ok(prepared)
    })
}
