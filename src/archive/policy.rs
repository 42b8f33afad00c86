use std::collections::BTreeSet;

pub const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const XML: &str = "application/xml";
pub const PDF: &str = "application/pdf";
pub const JPEG: &str = "image/jpeg";
pub const PNG: &str = "image/png";

/// Immutable set of content types a call site accepts.
///
/// Matching is exact and case-sensitive. Each operation owns its own
/// instance; policies are never merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    types: BTreeSet<String>,
}

impl AllowList {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
        }
    }

    /// Types accepted when bundling uploads into an archive.
    pub fn archive_build() -> Self {
        Self::new([DOCX, XML, JPEG, PNG])
    }

    /// Types accepted by the mail relay.
    pub fn mail_relay() -> Self {
        Self::new([DOCX, PDF, JPEG, PNG])
    }

    pub fn is_allowed(&self, declared_type: &str) -> bool {
        self.types.contains(declared_type)
    }
}

/// Declared type for a local file, looked up from its extension.
///
/// Used only where no caller-declared type exists (command-line builds).
pub fn type_for_extension(name: &str) -> Option<&'static str> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "docx" => Some(DOCX),
        "xml" => Some(XML),
        "pdf" => Some(PDF),
        "jpg" | "jpeg" => Some(JPEG),
        "png" => Some(PNG),
        _ => None,
    }
}
