//! Filesystem-backed object store.
//!
//! Layout on disk: `<root>/<bucket>/<path>`. Writes land in a temporary
//! sibling first and are hard-linked into place, which fails instead of
//! replacing an object that already exists.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{FetchedObject, ObjectStore, StorageRef, StoredObject};
use crate::error::StorageError;
use crate::upload::naming::mime_for_path;

pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, bucket: &str, path: &str) -> Result<PathBuf, StorageError> {
        let invalid = || StorageError::InvalidReference(format!("{}/{}", bucket, path));
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == "." || bucket == ".." {
            return Err(invalid());
        }
        let relative = Path::new(path);
        if path.is_empty() || !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(invalid());
        }
        Ok(self.root.join(bucket).join(relative))
    }
}

/// Unique temp name even for concurrent writers within one process.
fn temp_sibling(target: &Path) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "object".to_string());
    target.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), seq))
}

async fn write_new(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[async_trait]
impl ObjectStore for FilesystemStore {
    async fn put(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<StoredObject, StorageError> {
        let target = self.resolve(bucket, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp = temp_sibling(&target);
        let size_bytes = bytes.len() as i64;
        if let Err(e) = write_new(&temp, &bytes).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        let linked = fs::hard_link(&temp, &target).await;
        let _ = fs::remove_file(&temp).await;
        match linked {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(StorageRef::new(bucket, path).to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::debug!(path = %target.display(), size_bytes, "object written");
        Ok(StoredObject {
            reference: StorageRef::new(bucket, path),
            size_bytes,
        })
    }

    async fn get(&self, reference: &StorageRef) -> Result<FetchedObject, StorageError> {
        let target = self.resolve(&reference.bucket, &reference.path)?;
        let bytes = match fs::read(&target).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(reference.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(FetchedObject {
            bytes,
            content_type: mime_for_path(&reference.path).to_string(),
        })
    }
}
