//! Form submission reconciliation with a concurrent upload pipeline.
//!
//! A submission is one spreadsheet row filling in one form. Each request
//! carries answers (details) and evidence files (documents and photos).
//! Files are written to object storage first, in parallel, and only then
//! is the submission reconciled into SQLite in a single transaction.

pub mod cancel;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod sanitize;
pub mod storage;
pub mod submission;
pub mod upload;
pub mod value;

pub use cancel::CancelFlag;
pub use config::Config;
pub use db::Database;
pub use error::{Result, StorageError, SubmissionError};
pub use submission::{SubmissionQuery, SubmissionRequest, SubmissionService, SubmissionView};
