pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Submissions: one per (file, row, form)
CREATE TABLE IF NOT EXISTS submissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL,
    row_id INTEGER NOT NULL,
    file_name TEXT NOT NULL DEFAULT '',   -- denormalized spreadsheet name
    form_key TEXT NOT NULL,
    form_label TEXT NOT NULL DEFAULT '',
    consent_text TEXT NOT NULL DEFAULT '', -- consent wording as shown at submit time
    consent_given INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (file_id, row_id, form_key)
);

CREATE INDEX IF NOT EXISTS idx_submissions_row_form ON submissions(row_id, form_key);

-- Details: one answer field per key within a submission
CREATE TABLE IF NOT EXISTS submission_details (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    submission_id INTEGER NOT NULL,
    detail_key TEXT NOT NULL,
    label TEXT NOT NULL DEFAULT '',
    field_type TEXT NOT NULL DEFAULT '',
    consent_required INTEGER NOT NULL DEFAULT 0,
    value_json TEXT NOT NULL DEFAULT 'null',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (submission_id, detail_key),
    FOREIGN KEY (submission_id) REFERENCES submissions(id) ON DELETE CASCADE
);

-- Uploads: append-only evidence files
CREATE TABLE IF NOT EXISTS submission_uploads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    submission_id INTEGER NOT NULL,
    detail_id INTEGER NOT NULL,
    kind TEXT NOT NULL,                -- 'document' or 'photo'
    file_name TEXT NOT NULL DEFAULT '',
    mime_type TEXT NOT NULL DEFAULT '',
    size_bytes INTEGER NOT NULL DEFAULT 0,
    storage_ref TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT '',
    comment TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    FOREIGN KEY (submission_id) REFERENCES submissions(id) ON DELETE CASCADE,
    FOREIGN KEY (detail_id) REFERENCES submission_details(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_submission_uploads_submission ON submission_uploads(submission_id);
"#;
