//! End-to-end submission pipeline.
//!
//! validate -> upload batch (no transaction open) -> reconcile (one
//! transaction) -> project (read after write).

use std::sync::Arc;

use super::{SubmissionQuery, SubmissionRequest, SubmissionView, UploadRecord};
use crate::cancel::CancelFlag;
use crate::clock::Clock;
use crate::config::{Config, LimitsConfig};
use crate::db::{Database, ReconcileOutcome};
use crate::error::Result;
use crate::storage::{ObjectStore, StorageRef};
use crate::upload::{UploadOrchestrator, UploadSettings};

/// An upload row together with its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub record: UploadRecord,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

pub struct SubmissionService {
    db: Arc<Database>,
    store: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
    orchestrator: UploadOrchestrator,
    limits: LimitsConfig,
}

impl SubmissionService {
    pub fn new(
        db: Arc<Database>,
        store: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
        settings: UploadSettings,
        limits: LimitsConfig,
    ) -> Self {
        let orchestrator = UploadOrchestrator::new(Arc::clone(&store), Arc::clone(&clock), settings);
        Self {
            db,
            store,
            clock,
            orchestrator,
            limits,
        }
    }

    pub fn from_config(
        config: &Config,
        db: Arc<Database>,
        store: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            db,
            store,
            clock,
            UploadSettings::from_config(&config.storage, &config.forms),
            config.limits.clone(),
        )
    }

    /// Run the whole pipeline and return the fresh projection.
    pub async fn submit(&self, request: SubmissionRequest, cancel: &CancelFlag) -> Result<SubmissionView> {
        let (outcome, query) = self.reconcile(request, cancel).await?;
        tracing::debug!(submission_id = outcome.submission_id, "projecting reconciled submission");
        self.find(query).await
    }

    /// Validate, upload and reconcile without projecting.
    pub async fn reconcile(
        &self,
        request: SubmissionRequest,
        cancel: &CancelFlag,
    ) -> Result<(ReconcileOutcome, SubmissionQuery)> {
        request.validate(&self.limits)?;

        let header = request.header();
        let target = request.target();
        let query = SubmissionQuery::new(header.row_id, header.form_key.clone()).with_file(header.file_id);
        let SubmissionRequest {
            details,
            documents,
            photos,
            ..
        } = request;

        let batch = self.orchestrator.resolve(&target, documents, photos, cancel).await?;

        let db = Arc::clone(&self.db);
        let now = self.clock.now();
        let cancel = cancel.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            db.reconcile(&header, &details, &batch, now, &cancel)
        })
        .await??;

        Ok((outcome, query))
    }

    pub async fn find(&self, query: SubmissionQuery) -> Result<SubmissionView> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || db.project(&query)).await?
    }

    /// Read one upload back from object storage.
    pub async fn open_upload(&self, upload_id: i64) -> Result<Option<StoredUpload>> {
        let db = Arc::clone(&self.db);
        let Some(record) = tokio::task::spawn_blocking(move || db.upload(upload_id)).await?? else {
            return Ok(None);
        };

        let reference: StorageRef = record.upload.reference.parse()?;
        let fetched = self.store.get(&reference).await?;

        Ok(Some(StoredUpload {
            record,
            content_type: fetched.content_type,
            bytes: fetched.bytes,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::{StorageError, SubmissionError};
    use crate::storage::{FetchedObject, MemoryStore, StoredObject};
    use crate::submission::DetailEntry;
    use crate::upload::{UploadEntry, UploadKind};
    use crate::value::DetailValue;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Counts writes, fails those whose path contains `fail_marker` and
    /// trips `cancel_on` while writing a matching path.
    #[derive(Default)]
    struct SpyStore {
        inner: MemoryStore,
        puts: AtomicUsize,
        fail_marker: Mutex<Option<String>>,
        cancel_on: Mutex<Option<(String, CancelFlag)>>,
    }

    impl SpyStore {
        fn fail_on(&self, marker: &str) {
            *self.fail_marker.lock().unwrap() = Some(marker.to_string());
        }

        fn cancel_on(&self, marker: &str, cancel: &CancelFlag) {
            *self.cancel_on.lock().unwrap() = Some((marker.to_string(), cancel.clone()));
        }

        fn puts(&self) -> usize {
            self.puts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ObjectStore for SpyStore {
        async fn put(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> std::result::Result<StoredObject, StorageError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            let failing = self.fail_marker.lock().unwrap().clone();
            if let Some(marker) = failing {
                if path.contains(&marker) {
                    return Err(StorageError::Backend("connection reset".to_string()));
                }
            }
            let tripping = self.cancel_on.lock().unwrap().clone();
            match tripping {
                Some((marker, cancel)) if path.contains(&marker) => cancel.cancel(),
                _ => tokio::time::sleep(std::time::Duration::from_millis(5)).await,
            }
            self.inner.put(bucket, path, bytes).await
        }

        async fn get(&self, reference: &StorageRef) -> std::result::Result<FetchedObject, StorageError> {
            self.inner.get(reference).await
        }
    }

    fn service() -> (SubmissionService, Arc<SpyStore>) {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let store = Arc::new(SpyStore::default());
        let clock = Arc::new(FixedClock(chrono::Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap()));
        let service = SubmissionService::new(
            Arc::new(db),
            store.clone(),
            clock,
            UploadSettings::default(),
            LimitsConfig::default(),
        );
        (service, store)
    }

    fn boarding_request() -> SubmissionRequest {
        let mut request = SubmissionRequest::new(1, 10, "boarding_home");
        request.details.push(DetailEntry::new("dob", "2000-01-01"));
        request
            .documents
            .push(UploadEntry::with_content("dob", "id.pdf", "application/pdf", b"%PDF-1.4"));
        request
    }

    #[tokio::test]
    async fn test_boarding_home_scenario() {
        let (service, store) = service();
        let view = service.submit(boarding_request(), &CancelFlag::new()).await.unwrap();

        assert!(view.found);
        assert_eq!(view.file_id, Some(1));
        assert_eq!(view.details.len(), 1);
        assert_eq!(view.details[0].key, "dob");
        assert_eq!(view.details[0].value, DetailValue::from("2000-01-01"));
        assert_eq!(view.documents.len(), 1);
        assert_eq!(view.documents[0].file_name, "id.pdf");
        assert_eq!(view.documents[0].detail_key, "dob");
        assert_eq!(view.documents[0].size_bytes, 8);
        assert_eq!(
            view.documents[0].reference,
            "store://form-requests/requests/boarding_home/1_10/document_20240315093000_1_id.pdf"
        );
        assert!(view.photos.is_empty());
        assert_eq!(store.puts(), 1);
    }

    #[tokio::test]
    async fn test_unknown_submission_projects_empty() {
        let (service, _) = service();
        let view = service.find(SubmissionQuery::new(999, "x")).await.unwrap();
        assert!(!view.found);
        assert!(view.details.is_empty());
        assert!(view.documents.is_empty());
        assert!(view.photos.is_empty());
    }

    #[tokio::test]
    async fn test_no_uploads_means_no_storage_writes() {
        let (service, store) = service();
        let mut request = boarding_request();
        request.documents.clear();

        let view = service.submit(request, &CancelFlag::new()).await.unwrap();
        assert!(view.found);
        assert_eq!(view.upload_count(), 0);
        assert_eq!(store.puts(), 0);
    }

    #[tokio::test]
    async fn test_unknown_detail_key_fails_before_any_upload() {
        let (service, store) = service();
        let mut request = boarding_request();
        request
            .photos
            .push(UploadEntry::with_content("passport", "p.jpg", "image/jpeg", b"jpg"));

        let err = service.submit(request, &CancelFlag::new()).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.puts(), 0);
        assert!(!service.find(SubmissionQuery::new(10, "boarding_home")).await.unwrap().found);
    }

    #[tokio::test]
    async fn test_resubmission_keeps_detail_identity() {
        let (service, _) = service();
        let (first, _) = service.reconcile(boarding_request(), &CancelFlag::new()).await.unwrap();

        let mut again = boarding_request();
        again.documents.clear();
        again.details[0].value = DetailValue::from("2001-02-03");
        let (second, query) = service.reconcile(again, &CancelFlag::new()).await.unwrap();

        assert_eq!(first.detail_ids["dob"], second.detail_ids["dob"]);
        let view = service.find(query).await.unwrap();
        assert_eq!(view.detail("dob").unwrap().value, DetailValue::from("2001-02-03"));
        assert_eq!(view.documents.len(), 1);
    }

    #[tokio::test]
    async fn test_new_uploads_accumulate() {
        let (service, _) = service();
        service.submit(boarding_request(), &CancelFlag::new()).await.unwrap();

        let mut again = boarding_request();
        again.documents[0] = UploadEntry::with_content("dob", "birth-cert.pdf", "application/pdf", b"%PDF-2");
        let view = service.submit(again, &CancelFlag::new()).await.unwrap();

        let names: Vec<&str> = view.documents.iter().map(|d| d.file_name.as_str()).collect();
        assert_eq!(names, vec!["id.pdf", "birth-cert.pdf"]);
    }

    #[tokio::test]
    async fn test_echoed_reference_is_not_duplicated() {
        let (service, store) = service();
        let first = service.submit(boarding_request(), &CancelFlag::new()).await.unwrap();
        let recorded = &first.documents[0];

        let mut again = boarding_request();
        again.documents[0] = UploadEntry::with_reference("dob", "id.pdf", recorded.reference.clone());
        let view = service.submit(again, &CancelFlag::new()).await.unwrap();

        assert_eq!(view.documents.len(), 1);
        assert_eq!(view.documents[0].id, recorded.id);
        assert_eq!(store.puts(), 1);
    }

    #[tokio::test]
    async fn test_failed_upload_persists_nothing() {
        let (service, store) = service();
        store.fail_on("_4_");

        let mut request = boarding_request();
        request.documents.clear();
        for i in 0..6 {
            request
                .photos
                .push(UploadEntry::with_content("dob", format!("p{}.jpg", i), "image/jpeg", b"img"));
        }

        let err = service.submit(request, &CancelFlag::new()).await.unwrap_err();
        match err {
            SubmissionError::Upload { kind, position, .. } => {
                assert_eq!(kind, UploadKind::Photo);
                assert_eq!(position, 4);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!service.find(SubmissionQuery::new(10, "boarding_home")).await.unwrap().found);
    }

    #[tokio::test]
    async fn test_failed_resubmission_leaves_prior_state() {
        let (service, store) = service();
        service.submit(boarding_request(), &CancelFlag::new()).await.unwrap();
        store.fail_on("_2_");

        let mut again = boarding_request();
        again.details.push(DetailEntry::new("room", 12i64));
        again.documents = (0..5)
            .map(|i| UploadEntry::with_content("room", format!("lease-{}.pdf", i), "application/pdf", b"l"))
            .collect();

        assert!(service.submit(again, &CancelFlag::new()).await.is_err());
        let view = service.find(SubmissionQuery::new(10, "boarding_home")).await.unwrap();
        assert_eq!(view.details.len(), 1);
        assert!(view.detail("room").is_none());
        assert_eq!(view.documents.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_submission() {
        let (service, store) = service();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = service.submit(boarding_request(), &cancel).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Cancelled));
        assert_eq!(store.puts(), 0);
        assert!(!service.find(SubmissionQuery::new(10, "boarding_home")).await.unwrap().found);
    }

    #[tokio::test]
    async fn test_open_upload_reads_back_bytes() {
        let (service, _) = service();
        let view = service.submit(boarding_request(), &CancelFlag::new()).await.unwrap();

        let stored = service.open_upload(view.documents[0].id).await.unwrap().unwrap();
        assert_eq!(stored.bytes, b"%PDF-1.4".to_vec());
        assert_eq!(stored.content_type, "application/pdf");
        assert_eq!(stored.record.kind, "document");

        assert!(service.open_upload(view.documents[0].id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_same_second_resubmission_keeps_both_objects() {
        let (service, _) = service();
        let mut first = boarding_request();
        first.documents[0] = UploadEntry::with_content("dob", "id.pdf", "application/pdf", b"FIRST");
        service.submit(first, &CancelFlag::new()).await.unwrap();

        let mut second = boarding_request();
        second.documents[0] = UploadEntry::with_content("dob", "id.pdf", "application/pdf", b"SECOND");
        let view = service.submit(second, &CancelFlag::new()).await.unwrap();

        assert_eq!(view.documents.len(), 2);
        assert_ne!(view.documents[0].reference, view.documents[1].reference);
        assert!(view.documents[1].reference.ends_with("_1_id-2.pdf"));

        let first_bytes = service.open_upload(view.documents[0].id).await.unwrap().unwrap();
        let second_bytes = service.open_upload(view.documents[1].id).await.unwrap().unwrap();
        assert_eq!(first_bytes.bytes, b"FIRST".to_vec());
        assert_eq!(second_bytes.bytes, b"SECOND".to_vec());
    }

    #[tokio::test]
    async fn test_cancel_during_uploads_persists_nothing() {
        let (service, store) = service();
        let cancel = CancelFlag::new();
        store.cancel_on("_3_", &cancel);

        let mut request = boarding_request();
        request.documents.clear();
        for i in 0..6 {
            request
                .photos
                .push(UploadEntry::with_content("dob", format!("p{}.jpg", i), "image/jpeg", b"img"));
        }

        let err = service.submit(request, &cancel).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Cancelled));
        assert!(!service.find(SubmissionQuery::new(10, "boarding_home")).await.unwrap().found);
    }
}
