//! Object storage port.
//!
//! The pipeline only relies on `put` handing back a stable reference string
//! and `get` accepting that same string later. The backends here are a
//! filesystem tree and an in-memory map.

pub mod fs;
pub mod memory;

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

use crate::error::StorageError;

pub use fs::FilesystemStore;
pub use memory::MemoryStore;

const SCHEME: &str = "store://";

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub reference: StorageRef,
    pub size_bytes: i64,
}

/// Bytes read back from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` at `path` inside `bucket`, replacing any previous object.
    async fn put(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<StoredObject, StorageError>;

    /// Read an object previously written by `put`.
    async fn get(&self, reference: &StorageRef) -> Result<FetchedObject, StorageError>;
}

/// Location of a stored object, rendered as `store://<bucket>/<path>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageRef {
    pub bucket: String,
    pub path: String,
}

impl StorageRef {
    pub fn new(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for StorageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", SCHEME, self.bucket, self.path)
    }
}

impl FromStr for StorageRef {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(SCHEME)
            .ok_or_else(|| StorageError::InvalidReference(s.to_string()))?;
        match rest.split_once('/') {
            Some((bucket, path)) if !bucket.is_empty() && !path.is_empty() => {
                Ok(StorageRef::new(bucket, path))
            }
            _ => Err(StorageError::InvalidReference(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_format() {
        let reference = StorageRef::new("form-requests", "requests/a/1_2/document_x.pdf");
        assert_eq!(
            reference.to_string(),
            "store://form-requests/requests/a/1_2/document_x.pdf"
        );
        let parsed: StorageRef = reference.to_string().parse().unwrap();
        assert_eq!(parsed, reference);
    }

    #[test]
    fn test_rejects_malformed_references() {
        for bad in ["", "s3://b/p", "store://", "store://bucket", "store://bucket/", "store:///path"] {
            assert!(bad.parse::<StorageRef>().is_err(), "accepted {}", bad);
        }
    }
}
