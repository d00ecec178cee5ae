//! Response shapes returned to callers.

use serde::{Deserialize, Serialize};

use crate::value::DetailValue;

/// Which submission to project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionQuery {
    pub row_id: i64,
    pub form_key: String,
    #[serde(default)]
    pub file_id: Option<i64>,
}

impl SubmissionQuery {
    pub fn new(row_id: i64, form_key: impl Into<String>) -> Self {
        Self {
            row_id,
            form_key: form_key.into(),
            file_id: None,
        }
    }

    pub fn with_file(mut self, file_id: i64) -> Self {
        self.file_id = Some(file_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailView {
    pub key: String,
    pub label: String,
    pub field_type: String,
    pub consent_required: bool,
    pub value: DetailValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadView {
    pub id: i64,
    pub detail_key: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub reference: String,
    pub category: String,
    pub comment: String,
}

/// An upload row with the columns the views leave out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub submission_id: i64,
    pub kind: String,
    pub upload: UploadView,
}

/// A submission with its details and evidence.
///
/// When `found` is false only the echoed query fields are set and the
/// collections are empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionView {
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<i64>,
    pub file_id: Option<i64>,
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    pub details: Vec<DetailView>,
    pub documents: Vec<UploadView>,
    pub photos: Vec<UploadView>,
}

impl SubmissionView {
    pub fn not_found(query: &SubmissionQuery) -> Self {
        Self {
            found: false,
            submission_id: None,
            file_id: query.file_id,
            row_id: query.row_id,
            form_key: query.form_key.clone(),
            file_name: String::new(),
            form_label: String::new(),
            consent_text: String::new(),
            consent_given: false,
            created_at: None,
            updated_at: None,
            details: Vec::new(),
            documents: Vec::new(),
            photos: Vec::new(),
        }
    }

    pub fn detail(&self, key: &str) -> Option<&DetailView> {
        self.details.iter().find(|d| d.key == key)
    }

    pub fn upload_count(&self) -> usize {
        self.documents.len() + self.photos.len()
    }
}
