//! Building archives from uploads and summarizing uploaded archives.
//!
//! Both operations are stateless and request-scoped. Building validates the
//! whole batch against an [`AllowList`] before writing; inspection only reads
//! the central directory and never touches member data.

mod builder;
mod inspector;
pub mod policy;

pub use builder::{BuildOptions, InputFile, build, validate};
pub use inspector::{ArchiveSummary, ContainerEntry, DEFAULT_ENTRY_TYPE, inspect};
pub use policy::AllowList;
