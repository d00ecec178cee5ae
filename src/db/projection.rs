//! Read side: assemble the caller-facing view of a submission.

use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::error::Result;
use crate::submission::{DetailView, SubmissionQuery, SubmissionView, UploadRecord, UploadView};
use crate::upload::UploadKind;
use crate::value::DetailValue;

impl Database {
    /// Project the submission matching `query`.
    ///
    /// Without a file filter the most recently updated match is used. A
    /// missing submission is reported through `found`, not as an error.
    pub fn project(&self, query: &SubmissionQuery) -> Result<SubmissionView> {
        let conn = self.lock();
        let form_key = query.form_key.trim();

        let head = conn
            .query_row(
                r#"
                SELECT id, file_id, row_id, form_key, file_name, form_label,
                       consent_text, consent_given, created_at, updated_at
                FROM submissions
                WHERE row_id = ?1 AND form_key = ?2 AND (?3 IS NULL OR file_id = ?3)
                ORDER BY updated_at DESC, id DESC
                LIMIT 1
                "#,
                params![query.row_id, form_key, query.file_id],
                |row| {
                    Ok(SubmissionView {
                        found: true,
                        submission_id: Some(row.get(0)?),
                        file_id: Some(row.get(1)?),
                        row_id: row.get(2)?,
                        form_key: row.get(3)?,
                        file_name: row.get(4)?,
                        form_label: row.get(5)?,
                        consent_text: row.get(6)?,
                        consent_given: row.get(7)?,
                        created_at: Some(row.get(8)?),
                        updated_at: Some(row.get(9)?),
                        details: Vec::new(),
                        documents: Vec::new(),
                        photos: Vec::new(),
                    })
                },
            )
            .optional()?;

        let Some(mut view) = head else {
            return Ok(SubmissionView::not_found(query));
        };
        let submission_id = view.submission_id.unwrap_or_default();

        let mut stmt = conn.prepare(
            r#"
            SELECT detail_key, label, field_type, consent_required, value_json
            FROM submission_details
            WHERE submission_id = ?
            ORDER BY id
            "#,
        )?;
        let rows = stmt
            .query_map([submission_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (key, label, field_type, consent_required, value_json) in rows {
            view.details.push(DetailView {
                key,
                label,
                field_type,
                consent_required,
                value: DetailValue::from_json(&value_json)?,
            });
        }

        let mut stmt = conn.prepare(
            r#"
            SELECT u.id, d.detail_key, u.kind, u.file_name, u.mime_type,
                   u.size_bytes, u.storage_ref, u.category, u.comment
            FROM submission_uploads u
            JOIN submission_details d ON d.id = u.detail_id
            WHERE u.submission_id = ?
            ORDER BY u.id
            "#,
        )?;
        let uploads = stmt
            .query_map([submission_id], |row| {
                Ok((row.get::<_, String>(2)?, row_to_upload(row)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (kind, upload) in uploads {
            match UploadKind::from_str(&kind) {
                Some(UploadKind::Photo) => view.photos.push(upload),
                _ => view.documents.push(upload),
            }
        }

        Ok(view)
    }

    /// Look up a single upload row.
    pub fn upload(&self, upload_id: i64) -> Result<Option<UploadRecord>> {
        let conn = self.lock();
        let record = conn
            .query_row(
                r#"
                SELECT u.id, d.detail_key, u.kind, u.file_name, u.mime_type,
                       u.size_bytes, u.storage_ref, u.category, u.comment, u.submission_id
                FROM submission_uploads u
                JOIN submission_details d ON d.id = u.detail_id
                WHERE u.id = ?
                "#,
                [upload_id],
                |row| {
                    Ok(UploadRecord {
                        submission_id: row.get(9)?,
                        kind: row.get(2)?,
                        upload: row_to_upload(row)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}

/// Expects the column order used by the upload queries above.
fn row_to_upload(row: &rusqlite::Row) -> rusqlite::Result<UploadView> {
    Ok(UploadView {
        id: row.get(0)?,
        detail_key: row.get(1)?,
        file_name: row.get(3)?,
        mime_type: row.get(4)?,
        size_bytes: row.get(5)?,
        reference: row.get(6)?,
        category: row.get(7)?,
        comment: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    /// Insert rows directly, bypassing the reconciler.
    fn seed(db: &Database, file_id: i64, updated_at: &str) -> i64 {
        let conn = db.lock();
        conn.execute(
            r#"
            INSERT INTO submissions (file_id, row_id, form_key, file_name, created_at, updated_at)
            VALUES (?, 10, 'boarding_home', ?, ?, ?)
            "#,
            params![file_id, format!("file-{}.xlsx", file_id), updated_at, updated_at],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn test_missing_submission() {
        let db = db();
        let view = db.project(&SubmissionQuery::new(999, "x")).unwrap();
        assert!(!view.found);
        assert_eq!(view.row_id, 999);
        assert_eq!(view.form_key, "x");
        assert!(view.details.is_empty());
        assert!(view.documents.is_empty());
        assert!(view.photos.is_empty());
    }

    #[test]
    fn test_file_filter_and_latest_match() {
        let db = db();
        seed(&db, 1, "2024-03-15T09:00:00Z");
        seed(&db, 2, "2024-03-16T09:00:00Z");

        let latest = db.project(&SubmissionQuery::new(10, "boarding_home")).unwrap();
        assert_eq!(latest.file_id, Some(2));

        let filtered = db
            .project(&SubmissionQuery::new(10, "boarding_home").with_file(1))
            .unwrap();
        assert_eq!(filtered.file_id, Some(1));
        assert_eq!(filtered.file_name, "file-1.xlsx");

        let none = db
            .project(&SubmissionQuery::new(10, "boarding_home").with_file(3))
            .unwrap();
        assert!(!none.found);
        assert_eq!(none.file_id, Some(3));
    }

    #[test]
    fn test_uploads_partition_by_kind_ignoring_case() {
        let db = db();
        let submission_id = seed(&db, 1, "2024-03-15T09:00:00Z");
        {
            let conn = db.lock();
            conn.execute(
                r#"
                INSERT INTO submission_details (submission_id, detail_key, value_json, created_at, updated_at)
                VALUES (?, 'dob', '{"day":1,"month":"jan"}', 'now', 'now')
                "#,
                [submission_id],
            )
            .unwrap();
            let detail_id = conn.last_insert_rowid();
            for (kind, name) in [("PHOTO", "a.jpg"), ("document", "b.pdf"), ("Photo", "c.png")] {
                conn.execute(
                    r#"
                    INSERT INTO submission_uploads (submission_id, detail_id, kind, file_name, storage_ref, created_at)
                    VALUES (?, ?, ?, ?, ?, 'now')
                    "#,
                    params![submission_id, detail_id, kind, name, format!("store://b/{}", name)],
                )
                .unwrap();
            }
        }

        let view = db.project(&SubmissionQuery::new(10, "boarding_home")).unwrap();
        let photos: Vec<&str> = view.photos.iter().map(|p| p.file_name.as_str()).collect();
        let documents: Vec<&str> = view.documents.iter().map(|d| d.file_name.as_str()).collect();
        assert_eq!(photos, vec!["a.jpg", "c.png"]);
        assert_eq!(documents, vec!["b.pdf"]);
        assert!(view.photos.iter().all(|p| p.detail_key == "dob"));
        assert!(matches!(view.details[0].value, DetailValue::Map(_)));

        let record = db.upload(view.documents[0].id).unwrap().unwrap();
        assert_eq!(record.kind, "document");
        assert_eq!(record.submission_id, submission_id);
        assert_eq!(record.upload.reference, "store://b/b.pdf");
        assert!(db.upload(9999).unwrap().is_none());
    }
}
