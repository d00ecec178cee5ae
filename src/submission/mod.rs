//! Submission requests, their validation and the end-to-end pipeline.

pub mod service;
pub mod view;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub use service::{StoredUpload, SubmissionService};
pub use view::{DetailView, SubmissionQuery, SubmissionView, UploadRecord, UploadView};

use crate::config::LimitsConfig;
use crate::error::{Result, SubmissionError};
use crate::upload::{UploadEntry, UploadKind, UploadOrchestrator, UploadTarget};
use crate::value::DetailValue;

/// One answer field in a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailEntry {
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub field_type: String,
    #[serde(default)]
    pub consent_required: bool,
    #[serde(default)]
    pub value: DetailValue,
}

impl DetailEntry {
    pub fn new(key: impl Into<String>, value: impl Into<DetailValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ..Default::default()
        }
    }
}

/// Identity and mutable metadata of a submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionHeader {
    pub file_id: i64,
    pub row_id: i64,
    pub form_key: String,
    pub file_name: String,
    pub form_label: String,
    pub consent_text: String,
    pub consent_given: bool,
}

/// Everything a caller sends for one spreadsheet row and form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub file_id: i64,
    pub row_id: i64,
    pub form_key: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub form_label: String,
    #[serde(default)]
    pub consent_text: String,
    #[serde(default)]
    pub consent_given: bool,
    #[serde(default)]
    pub details: Vec<DetailEntry>,
    #[serde(default)]
    pub documents: Vec<UploadEntry>,
    #[serde(default)]
    pub photos: Vec<UploadEntry>,
}

impl SubmissionRequest {
    pub fn new(file_id: i64, row_id: i64, form_key: impl Into<String>) -> Self {
        Self {
            file_id,
            row_id,
            form_key: form_key.into(),
            ..Default::default()
        }
    }

    pub fn header(&self) -> SubmissionHeader {
        SubmissionHeader {
            file_id: self.file_id,
            row_id: self.row_id,
            form_key: self.form_key.trim().to_string(),
            file_name: self.file_name.trim().to_string(),
            form_label: self.form_label.clone(),
            consent_text: self.consent_text.clone(),
            consent_given: self.consent_given,
        }
    }

    pub fn target(&self) -> UploadTarget {
        UploadTarget {
            file_id: self.file_id,
            row_id: self.row_id,
            form_key: self.form_key.trim().to_string(),
        }
    }

    /// Structural checks that must pass before any storage or database work.
    pub fn validate(&self, limits: &LimitsConfig) -> Result<()> {
        if self.file_id <= 0 {
            return Err(SubmissionError::validation("file_id must be a positive integer"));
        }
        if self.row_id <= 0 {
            return Err(SubmissionError::validation("row_id must be a positive integer"));
        }
        if self.form_key.trim().is_empty() {
            return Err(SubmissionError::validation("form_key is required"));
        }

        let mut keys = HashSet::new();
        for (index, detail) in self.details.iter().enumerate() {
            let key = detail.key.trim();
            if key.is_empty() {
                return Err(SubmissionError::validation(format!(
                    "detail {} is missing its key",
                    index + 1
                )));
            }
            keys.insert(key);
        }

        UploadOrchestrator::check_sources(&self.documents, &self.photos)?;

        for (kind, entries) in [(UploadKind::Document, &self.documents), (UploadKind::Photo, &self.photos)] {
            for (index, entry) in entries.iter().enumerate() {
                let position = index + 1;
                let key = entry.detail_key.trim();
                if key.is_empty() {
                    return Err(SubmissionError::validation(format!(
                        "{} upload {} is missing its detail_key",
                        kind, position
                    )));
                }
                if !keys.contains(key) {
                    return Err(SubmissionError::validation(format!(
                        "{} upload {} references unknown detail key '{}'",
                        kind, position, key
                    )));
                }
                if entry.comment.chars().count() > limits.max_comment_chars {
                    return Err(SubmissionError::validation(format!(
                        "{} upload {} comment exceeds {} characters",
                        kind, position, limits.max_comment_chars
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SubmissionRequest {
        let mut request = SubmissionRequest::new(1, 10, "boarding_home");
        request.details.push(DetailEntry::new("dob", "2000-01-01"));
        request
            .documents
            .push(UploadEntry::with_content("dob", "id.pdf", "application/pdf", b"%PDF"));
        request
    }

    fn message(request: &SubmissionRequest) -> String {
        request
            .validate(&LimitsConfig::default())
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn test_valid_request() {
        assert!(request().validate(&LimitsConfig::default()).is_ok());
    }

    #[test]
    fn test_identity_is_required() {
        let mut r = request();
        r.file_id = 0;
        assert_eq!(message(&r), "file_id must be a positive integer");

        let mut r = request();
        r.row_id = -3;
        assert_eq!(message(&r), "row_id must be a positive integer");

        let mut r = request();
        r.form_key = "  ".to_string();
        assert_eq!(message(&r), "form_key is required");
    }

    #[test]
    fn test_detail_key_is_required() {
        let mut r = request();
        r.details.push(DetailEntry::new(" ", true));
        assert_eq!(message(&r), "detail 2 is missing its key");
    }

    #[test]
    fn test_upload_must_reference_known_detail() {
        let mut r = request();
        r.photos
            .push(UploadEntry::with_content("passport", "p.jpg", "image/jpeg", b"x"));
        assert_eq!(message(&r), "photo upload 1 references unknown detail key 'passport'");
    }

    #[test]
    fn test_upload_detail_key_is_trimmed() {
        let mut r = request();
        r.documents[0].detail_key = " dob ".to_string();
        assert!(r.validate(&LimitsConfig::default()).is_ok());
    }

    #[test]
    fn test_upload_needs_content_or_reference() {
        let mut r = request();
        r.documents.push(UploadEntry {
            detail_key: "dob".to_string(),
            ..Default::default()
        });
        assert_eq!(message(&r), "document upload 2 is missing both content and reference");
    }

    #[test]
    fn test_comment_length_cap() {
        let mut r = request();
        r.documents[0].comment = "é".repeat(501);
        assert_eq!(message(&r), "document upload 1 comment exceeds 500 characters");
        r.documents[0].comment = "é".repeat(500);
        assert!(r.validate(&LimitsConfig::default()).is_ok());
    }

    #[test]
    fn test_request_from_json() {
        let r: SubmissionRequest = serde_json::from_str(
            r#"{
                "file_id": 1,
                "row_id": 10,
                "form_key": "boarding_home",
                "details": [{"key": "dob", "value": "2000-01-01"}, {"key": "notes"}],
                "documents": [{"detail_key": "dob", "content": "JVBERg==", "file_name": "id.pdf"}]
            }"#,
        )
        .unwrap();
        assert_eq!(r.details[0].value, DetailValue::from("2000-01-01"));
        assert!(r.details[1].value.is_null());
        assert!(r.photos.is_empty());
        assert!(r.validate(&LimitsConfig::default()).is_ok());
    }
}
