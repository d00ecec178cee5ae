//! Create-or-update merge of a submission request into stored state.
//!
//! One `BEGIN IMMEDIATE` transaction covers the submission row, the detail
//! upserts and the upload inserts. Details keep their ids across
//! re-submissions since uploads join on them; upload rows are only ever
//! appended.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::{BTreeMap, HashSet};

use super::Database;
use crate::cancel::CancelFlag;
use crate::error::{Result, StorageError, SubmissionError};
use crate::submission::{DetailEntry, SubmissionHeader};
use crate::upload::{ResolvedBatch, UploadOrigin};

/// What a reconciliation changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub submission_id: i64,
    /// True when the submission row was created by this pass.
    pub created: bool,
    /// Every detail of the submission after the merge, by key.
    pub detail_ids: BTreeMap<String, i64>,
    pub inserted_uploads: Vec<i64>,
    /// Existing-reference entries already recorded for this submission.
    pub skipped_uploads: usize,
}

fn checkpoint(cancel: &CancelFlag) -> Result<()> {
    if cancel.is_cancelled() {
        Err(SubmissionError::Cancelled)
    } else {
        Ok(())
    }
}

/// Points at which a reconciliation pass may be stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconcileStep {
    Begin,
    Details,
    Uploads,
    Commit,
}

impl Database {
    /// Merge a validated request with resolved uploads.
    ///
    /// Any error, cancellation included, rolls the whole pass back.
    pub fn reconcile(
        &self,
        header: &SubmissionHeader,
        details: &[DetailEntry],
        uploads: &ResolvedBatch,
        now: DateTime<Utc>,
        cancel: &CancelFlag,
    ) -> Result<ReconcileOutcome> {
        self.reconcile_with(header, details, uploads, now, |_| checkpoint(cancel))
    }

    /// `reconcile` with `before` run ahead of every step; an error from it
    /// aborts the pass.
    fn reconcile_with(
        &self,
        header: &SubmissionHeader,
        details: &[DetailEntry],
        uploads: &ResolvedBatch,
        now: DateTime<Utc>,
        mut before: impl FnMut(ReconcileStep) -> Result<()>,
    ) -> Result<ReconcileOutcome> {
        let now = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut conn = self.lock();
        before(ReconcileStep::Begin)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (submission_id, created) = upsert_submission(&tx, header, &now)?;
        before(ReconcileStep::Details)?;

        let detail_ids = upsert_details(&tx, submission_id, details, &now)?;
        before(ReconcileStep::Uploads)?;

        let (inserted_uploads, skipped_uploads) =
            append_uploads(&tx, submission_id, &detail_ids, uploads, &now)?;
        before(ReconcileStep::Commit)?;

        tx.commit()?;

        let outcome = ReconcileOutcome {
            submission_id,
            created,
            detail_ids,
            inserted_uploads,
            skipped_uploads,
        };
        tracing::info!(
            submission_id,
            file_id = header.file_id,
            row_id = header.row_id,
            form_key = %header.form_key,
            created,
            details = outcome.detail_ids.len(),
            inserted_uploads = outcome.inserted_uploads.len(),
            skipped_uploads,
            "submission reconciled"
        );
        Ok(outcome)
    }

    /// Detail ids of a submission keyed by detail key.
    pub fn detail_ids(&self, submission_id: i64) -> Result<BTreeMap<String, i64>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT detail_key, id FROM submission_details WHERE submission_id = ?",
        )?;
        let ids = stmt
            .query_map([submission_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<BTreeMap<String, i64>>>()?;
        Ok(ids)
    }
}

fn upsert_submission(tx: &Transaction, header: &SubmissionHeader, now: &str) -> Result<(i64, bool)> {
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM submissions WHERE file_id = ? AND row_id = ? AND form_key = ?",
            params![header.file_id, header.row_id, header.form_key],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(id) => {
            tx.execute(
                r#"
                UPDATE submissions
                SET file_name = ?, form_label = ?, consent_text = ?, consent_given = ?, updated_at = ?
                WHERE id = ?
                "#,
                params![
                    header.file_name,
                    header.form_label,
                    header.consent_text,
                    header.consent_given,
                    now,
                    id
                ],
            )?;
            Ok((id, false))
        }
        None => {
            tx.execute(
                r#"
                INSERT INTO submissions (
                    file_id, row_id, file_name, form_key, form_label,
                    consent_text, consent_given, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    header.file_id,
                    header.row_id,
                    header.file_name,
                    header.form_key,
                    header.form_label,
                    header.consent_text,
                    header.consent_given,
                    now,
                    now
                ],
            )?;
            Ok((tx.last_insert_rowid(), true))
        }
    }
}

fn upsert_details(
    tx: &Transaction,
    submission_id: i64,
    details: &[DetailEntry],
    now: &str,
) -> Result<BTreeMap<String, i64>> {
    let mut ids: BTreeMap<String, i64> = {
        let mut stmt = tx.prepare(
            "SELECT detail_key, id FROM submission_details WHERE submission_id = ?",
        )?;
        let rows = stmt.query_map([submission_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    for detail in details {
        let key = detail.key.trim();
        let value_json = detail.value.to_json()?;

        if let Some(&id) = ids.get(key) {
            tx.execute(
                r#"
                UPDATE submission_details
                SET label = ?, field_type = ?, consent_required = ?, value_json = ?, updated_at = ?
                WHERE id = ?
                "#,
                params![
                    detail.label,
                    detail.field_type,
                    detail.consent_required,
                    value_json,
                    now,
                    id
                ],
            )?;
        } else {
            tx.execute(
                r#"
                INSERT INTO submission_details (
                    submission_id, detail_key, label, field_type,
                    consent_required, value_json, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    submission_id,
                    key,
                    detail.label,
                    detail.field_type,
                    detail.consent_required,
                    value_json,
                    now,
                    now
                ],
            )?;
            ids.insert(key.to_string(), tx.last_insert_rowid());
        }
    }

    Ok(ids)
}

fn append_uploads(
    tx: &Transaction,
    submission_id: i64,
    detail_ids: &BTreeMap<String, i64>,
    uploads: &ResolvedBatch,
    now: &str,
) -> Result<(Vec<i64>, usize)> {
    let mut recorded: HashSet<String> = {
        let mut stmt = tx.prepare("SELECT storage_ref FROM submission_uploads WHERE submission_id = ?")?;
        let rows = stmt.query_map([submission_id], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let mut inserted = Vec::new();
    let mut skipped = 0;

    for upload in uploads.iter() {
        if recorded.contains(&upload.reference) {
            if upload.origin == UploadOrigin::Existing {
                skipped += 1;
                continue;
            }
            // A fresh object must not share a name with recorded evidence.
            return Err(StorageError::AlreadyExists(upload.reference.clone()).into());
        }

        let detail_id = *detail_ids.get(&upload.detail_key).ok_or_else(|| {
            SubmissionError::validation(format!(
                "{} upload references unknown detail key '{}'",
                upload.kind, upload.detail_key
            ))
        })?;

        tx.execute(
            r#"
            INSERT INTO submission_uploads (
                submission_id, detail_id, kind, file_name, mime_type,
                size_bytes, storage_ref, category, comment, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                submission_id,
                detail_id,
                upload.kind.as_str(),
                upload.file_name,
                upload.mime_type,
                upload.size_bytes,
                upload.reference,
                upload.category,
                upload.comment,
                now
            ],
        )?;
        inserted.push(tx.last_insert_rowid());
        recorded.insert(upload.reference.clone());
    }

    Ok((inserted, skipped))
}
