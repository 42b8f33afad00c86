//! # archive-api
//!
//! An HTTP service that bundles uploaded files into a single ZIP archive and
//! reports the contents of an uploaded ZIP archive without extracting it.
//!
//! The ZIP codec lives in [`zip`]: a writer producing classic archives from
//! independent entries, and a parser that walks the central directory of any
//! source implementing [`ReadAt`]. [`archive`] adds upload validation and
//! summarization on top of it, and [`server`] exposes both over HTTP next to
//! a small SMTP relay in [`mail`].
//!
//! ## Features
//!
//! - Build archives with DEFLATE or STORED members, compressed in parallel
//!   and committed in input order
//! - Inspect archives from the central directory only, including ZIP64
//! - Per-route content-type allow-lists and upload size caps
//!
//! ## Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use archive_api::archive::{self, AllowList, BuildOptions, InputFile};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let files = vec![InputFile::new("logo.png", "image/png", vec![0x89, b'P', b'N', b'G'])];
//!     let zip = archive::build(&files, &AllowList::archive_build(), &BuildOptions::default())?;
//!
//!     let summary = archive::inspect(Bytes::from(zip), "archive.zip").await?;
//!     for entry in &summary.entries {
//!         println!("{} {}", entry.path, entry.uncompressed_size);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cli;
pub mod error;
pub mod io;
pub mod mail;
pub mod server;
pub mod zip;

pub use cli::Cli;
pub use error::{ArchiveError, ValidationError};
pub use io::{MemoryReader, ReadAt};
pub use zip::{ZipExtractor, ZipFileEntry, ZipParser, ZipWriter};
