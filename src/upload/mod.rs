//! Upload entries and their resolution into stored objects.

pub mod naming;
pub mod orchestrator;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use orchestrator::{UploadOrchestrator, UploadSettings};

/// Which evidence list an upload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    Document,
    Photo,
}

impl UploadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadKind::Document => "document",
            UploadKind::Photo => "photo",
        }
    }

    /// Parse a stored kind, ignoring case.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "document" => Some(UploadKind::Document),
            "photo" => Some(UploadKind::Photo),
            _ => None,
        }
    }
}

impl fmt::Display for UploadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The submission an upload batch is filed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub file_id: i64,
    pub row_id: i64,
    pub form_key: String,
}

/// One document or photo as supplied by the caller.
///
/// Either `content` (base64) or `reference` to an object stored earlier
/// must be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadEntry {
    pub detail_key: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub comment: String,
}

/// Where the bytes of an entry come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySource<'a> {
    Content(&'a str),
    Reference(&'a str),
    Missing,
}

impl UploadEntry {
    /// Entry carrying new file content.
    pub fn with_content(
        detail_key: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: &[u8],
    ) -> Self {
        use base64::Engine;
        Self {
            detail_key: detail_key.into(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            content: Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            ..Default::default()
        }
    }

    /// Entry pointing at an object that is already stored.
    pub fn with_reference(
        detail_key: impl Into<String>,
        file_name: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            detail_key: detail_key.into(),
            file_name: file_name.into(),
            reference: Some(reference.into()),
            ..Default::default()
        }
    }

    /// Content wins over a reference when both are given; blank strings
    /// count as absent.
    pub fn source(&self) -> EntrySource<'_> {
        let content = self.content.as_deref().map(str::trim).filter(|c| !c.is_empty());
        let reference = self.reference.as_deref().map(str::trim).filter(|r| !r.is_empty());
        match (content, reference) {
            (Some(content), _) => EntrySource::Content(content),
            (None, Some(reference)) => EntrySource::Reference(reference),
            (None, None) => EntrySource::Missing,
        }
    }
}

/// How a resolved upload got its reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOrigin {
    /// Written to object storage by this batch.
    Stored,
    /// Supplied by the caller as an existing reference.
    Existing,
}

/// An upload with its storage reference and size settled.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUpload {
    pub kind: UploadKind,
    pub detail_key: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub reference: String,
    pub category: String,
    pub comment: String,
    pub origin: UploadOrigin,
}

/// Both upload lists, in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedBatch {
    pub documents: Vec<ResolvedUpload>,
    pub photos: Vec<ResolvedUpload>,
}

impl ResolvedBatch {
    /// Documents first, then photos.
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedUpload> {
        self.documents.iter().chain(self.photos.iter())
    }

    pub fn len(&self) -> usize {
        self.documents.len() + self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries written to storage by this batch.
    pub fn stored_count(&self) -> usize {
        self.iter().filter(|u| u.origin == UploadOrigin::Stored).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing_ignores_case() {
        assert_eq!(UploadKind::from_str("PHOTO"), Some(UploadKind::Photo));
        assert_eq!(UploadKind::from_str(" Document "), Some(UploadKind::Document));
        assert_eq!(UploadKind::from_str("video"), None);
    }

    #[test]
    fn test_entry_source() {
        let mut entry = UploadEntry::with_content("dob", "id.pdf", "application/pdf", b"%PDF");
        assert_eq!(entry.source(), EntrySource::Content("JVBERg=="));

        entry.reference = Some("store://b/p".to_string());
        assert!(matches!(entry.source(), EntrySource::Content(_)));

        entry.content = Some("  ".to_string());
        assert_eq!(entry.source(), EntrySource::Reference("store://b/p"));

        entry.reference = None;
        assert_eq!(entry.source(), EntrySource::Missing);
    }

    #[test]
    fn test_entry_deserializes_with_defaults() {
        let entry: UploadEntry =
            serde_json::from_str(r#"{"detail_key":"dob","reference":"store://b/p"}"#).unwrap();
        assert_eq!(entry.file_name, "");
        assert_eq!(entry.size_bytes, None);
        assert_eq!(entry.source(), EntrySource::Reference("store://b/p"));
    }
}
