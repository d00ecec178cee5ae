use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{FetchedObject, ObjectStore, StorageRef, StoredObject};
use crate::error::StorageError;
use crate::upload::naming::mime_for_path;

/// Object store kept in process memory.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<StorageRef, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// All stored references, sorted.
    pub fn references(&self) -> Vec<StorageRef> {
        let mut refs: Vec<StorageRef> = self.lock().keys().cloned().collect();
        refs.sort_by_key(|r| r.to_string());
        refs
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<StorageRef, Vec<u8>>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<StoredObject, StorageError> {
        let reference = StorageRef::new(bucket, path);
        let size_bytes = bytes.len() as i64;
        match self.lock().entry(reference.clone()) {
            Entry::Occupied(_) => return Err(StorageError::AlreadyExists(reference.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(bytes);
            }
        }
        Ok(StoredObject {
            reference,
            size_bytes,
        })
    }

    async fn get(&self, reference: &StorageRef) -> Result<FetchedObject, StorageError> {
        let bytes = self
            .lock()
            .get(reference)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(reference.to_string()))?;
        Ok(FetchedObject {
            bytes,
            content_type: mime_for_path(&reference.path).to_string(),
        })
    }
}
