//! Bounded-parallel upload of a document/photo batch.
//!
//! Entries with new content are written to object storage by at most
//! `concurrency` workers at once. Entries that already carry a reference
//! pass straight through. The batch either resolves completely, in request
//! order, or fails with the first upload error seen.

use base64::Engine;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::naming::{disambiguate, object_path};
use super::{EntrySource, ResolvedBatch, ResolvedUpload, UploadEntry, UploadKind, UploadOrigin, UploadTarget};
use crate::cancel::CancelFlag;
use crate::clock::Clock;
use crate::config::{FormsConfig, StorageConfig};
use crate::error::{Result, StorageError, SubmissionError};
use crate::sanitize::form_bucket;
use crate::storage::{ObjectStore, StoredObject};

/// Default number of uploads in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Names tried for one upload before a conflict is reported.
const MAX_NAME_ATTEMPTS: usize = 16;

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub bucket: String,
    pub concurrency: usize,
    pub form_aliases: BTreeMap<String, String>,
}

impl UploadSettings {
    pub fn from_config(storage: &StorageConfig, forms: &FormsConfig) -> Self {
        Self {
            bucket: storage.bucket.clone(),
            concurrency: storage.upload_concurrency,
            form_aliases: forms.aliases.clone(),
        }
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self::from_config(&StorageConfig::default(), &FormsConfig::default())
    }
}

/// Message a worker hands back: list, 0-based index, outcome.
type WorkerOutcome = (UploadKind, usize, std::result::Result<StoredObject, StorageError>);

pub struct UploadOrchestrator {
    store: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
    settings: UploadSettings,
}

impl UploadOrchestrator {
    pub fn new(store: Arc<dyn ObjectStore>, clock: Arc<dyn Clock>, settings: UploadSettings) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    /// Check that every entry has content or a reference.
    ///
    /// Positions in the message are 1-based within each list.
    pub fn check_sources(documents: &[UploadEntry], photos: &[UploadEntry]) -> Result<()> {
        for (kind, entries) in [(UploadKind::Document, documents), (UploadKind::Photo, photos)] {
            for (index, entry) in entries.iter().enumerate() {
                if entry.source() == EntrySource::Missing {
                    return Err(SubmissionError::validation(format!(
                        "{} upload {} is missing both content and reference",
                        kind,
                        index + 1
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolve every entry to a storage reference and size.
    ///
    /// Returns as soon as one upload fails or `cancel` fires; in-flight
    /// writes are aborted and objects already written by sibling workers
    /// stay in storage. A taken object name is retried with a suffix.
    pub async fn resolve(
        &self,
        target: &UploadTarget,
        documents: Vec<UploadEntry>,
        photos: Vec<UploadEntry>,
        cancel: &CancelFlag,
    ) -> Result<ResolvedBatch> {
        Self::check_sources(&documents, &photos)?;

        // Decode everything before the first byte goes out.
        let mut decoded: Vec<(UploadKind, usize, Vec<u8>)> = Vec::new();
        for (kind, entries) in [(UploadKind::Document, &documents), (UploadKind::Photo, &photos)] {
            for (index, entry) in entries.iter().enumerate() {
                if let EntrySource::Content(content) = entry.source() {
                    let bytes = base64::engine::general_purpose::STANDARD
                        .decode(content)
                        .map_err(|source| SubmissionError::InvalidContent {
                            kind,
                            position: index + 1,
                            source,
                        })?;
                    decoded.push((kind, index, bytes));
                }
            }
        }

        let mut documents = pass_through(UploadKind::Document, documents);
        let mut photos = pass_through(UploadKind::Photo, photos);
        if decoded.is_empty() {
            return Ok(ResolvedBatch {
                documents: finish(documents)?,
                photos: finish(photos)?,
            });
        }

        let timestamp = self.clock.now().format("%Y%m%d%H%M%S").to_string();
        let folder = form_bucket(&target.form_key, &self.settings.form_aliases);
        let permits = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut workers: JoinSet<WorkerOutcome> = JoinSet::new();
        let dispatched = decoded.len();

        for (kind, index, bytes) in decoded {
            if cancel.is_cancelled() {
                abort_and_drain(&mut workers).await;
                return Err(SubmissionError::Cancelled);
            }

            let slot = match kind {
                UploadKind::Document => &documents[index],
                UploadKind::Photo => &photos[index],
            };
            let path = object_path(
                &folder,
                target,
                kind,
                &timestamp,
                index + 1,
                &slot.entry.file_name,
                &slot.entry.mime_type,
            );

            let store = Arc::clone(&self.store);
            let permits = Arc::clone(&permits);
            let bucket = self.settings.bucket.clone();
            let cancel = cancel.clone();
            workers.spawn(async move {
                let work = async {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return Err(StorageError::Backend("upload pool closed".to_string()));
                    };
                    put_unique(store.as_ref(), &bucket, &path, bytes).await
                };
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(StorageError::Backend("cancelled".to_string())),
                    outcome = work => outcome,
                };
                (kind, index, outcome)
            });
        }

        let mut completed = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                joined = workers.join_next() => Some(joined),
            };
            let joined = match next {
                None => {
                    abort_and_drain(&mut workers).await;
                    tracing::warn!(already_stored = completed, dispatched, "upload batch cancelled");
                    return Err(SubmissionError::Cancelled);
                }
                Some(None) => break,
                Some(Some(joined)) => joined,
            };
            let (kind, index, outcome) = match joined {
                Ok(message) => message,
                Err(e) => {
                    abort_and_drain(&mut workers).await;
                    return Err(SubmissionError::Worker(e));
                }
            };

            if cancel.is_cancelled() {
                abort_and_drain(&mut workers).await;
                return Err(SubmissionError::Cancelled);
            }

            match outcome {
                Ok(stored) => {
                    tracing::debug!(%kind, position = index + 1, reference = %stored.reference, "upload stored");
                    let slot = match kind {
                        UploadKind::Document => &mut documents[index],
                        UploadKind::Photo => &mut photos[index],
                    };
                    slot.resolved = Some((stored.reference.to_string(), stored.size_bytes, UploadOrigin::Stored));
                    completed += 1;
                }
                Err(source) => {
                    abort_and_drain(&mut workers).await;
                    tracing::warn!(
                        %kind,
                        position = index + 1,
                        error = %source,
                        already_stored = completed,
                        dispatched,
                        "upload batch aborted; stored objects are left in place"
                    );
                    return Err(SubmissionError::Upload {
                        kind,
                        position: index + 1,
                        source,
                    });
                }
            }
        }

        Ok(ResolvedBatch {
            documents: finish(documents)?,
            photos: finish(photos)?,
        })
    }
}

/// Entry awaiting its worker, or already settled.
struct Slot {
    kind: UploadKind,
    entry: UploadEntry,
    resolved: Option<(String, i64, UploadOrigin)>,
}

fn pass_through(kind: UploadKind, entries: Vec<UploadEntry>) -> Vec<Slot> {
    entries
        .into_iter()
        .map(|entry| {
            let resolved = match entry.source() {
                EntrySource::Reference(reference) => Some((
                    reference.to_string(),
                    entry.size_bytes.unwrap_or(0),
                    UploadOrigin::Existing,
                )),
                _ => None,
            };
            Slot {
                kind,
                entry,
                resolved,
            }
        })
        .collect()
}

fn finish(slots: Vec<Slot>) -> Result<Vec<ResolvedUpload>> {
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            let (reference, size_bytes, origin) = slot.resolved.ok_or_else(|| SubmissionError::Upload {
                kind: slot.kind,
                position: index + 1,
                source: StorageError::Backend("upload did not complete".to_string()),
            })?;
            Ok(ResolvedUpload {
                kind: slot.kind,
                detail_key: slot.entry.detail_key.trim().to_string(),
                file_name: slot.entry.file_name,
                mime_type: slot.entry.mime_type,
                size_bytes,
                reference,
                category: slot.entry.category,
                comment: slot.entry.comment,
                origin,
            })
        })
        .collect()
}

/// Write under `path`, or under a disambiguated variant when the name is
/// already taken. Existing objects are never replaced.
async fn put_unique(
    store: &dyn ObjectStore,
    bucket: &str,
    path: &str,
    bytes: Vec<u8>,
) -> std::result::Result<StoredObject, StorageError> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = if attempt == 0 {
            path.to_string()
        } else {
            disambiguate(path, attempt + 1)
        };
        match store.put(bucket, &candidate, bytes.clone()).await {
            Err(StorageError::AlreadyExists(_)) => {
                tracing::debug!(path = %candidate, "object name taken, retrying");
            }
            outcome => return outcome,
        }
    }
    Err(StorageError::AlreadyExists(path.to_string()))
}

async fn abort_and_drain(workers: &mut JoinSet<WorkerOutcome>) {
    workers.abort_all();
    while workers.join_next().await.is_some() {}
}
