//! Storage and audit interface consumed by the pipeline.
//!
//! The pipeline only knows this trait; [`sqlite::SqliteStore`] is the
//! shipped implementation. Persisting a report is always a replace-all load:
//! the prior dataset is deleted and the new records inserted inside one
//! transaction, so concurrent readers observe either the fully-old or the
//! fully-new dataset.

pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::IngestResult;
use crate::layout::{ReportLayout, ReportType};
use crate::types::ValidatedRecord;

pub use sqlite::SqliteStore;

/// Lifecycle status of an upload run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run created, pipeline still working.
    Processing,
    /// Run persisted successfully.
    Completed,
    /// Run rejected or aborted; the prior dataset is intact.
    Failed,
}

impl RunStatus {
    /// Stable identifier stored in the audit table.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Processing => "processing",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// Terminal update applied to an audit run record.
#[derive(Debug, Clone)]
pub struct RunUpdate {
    /// New status.
    pub status: RunStatus,
    /// Failure summary, if any.
    pub error_message: Option<String>,
    /// Persisted record count on completion.
    pub records_count: Option<usize>,
}

/// One row of the upload audit log.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    /// Run id.
    pub id: i64,
    /// Report type identifier.
    pub report_type: String,
    /// Uploaded file name.
    pub file_name: String,
    /// Uploaded file size, bytes.
    pub file_size: u64,
    /// Current status.
    pub status: String,
    /// Failure summary, if the run failed.
    pub error_message: Option<String>,
    /// Persisted record count, if the run completed.
    pub records_count: Option<usize>,
    /// Run creation time.
    pub created_at: DateTime<Utc>,
    /// Terminal transition time.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Store/audit collaborator interface.
pub trait ReportStore {
    /// Record the start of an upload run; returns the run id.
    fn create_run(&self, report_type: ReportType, file_name: &str, file_size: u64)
        -> IngestResult<i64>;

    /// Apply a terminal (or progress) update to a run record.
    fn update_run(&self, run_id: i64, update: RunUpdate) -> IngestResult<()>;

    /// Replace the report type's dataset with `records` atomically.
    ///
    /// An empty slice still clears the dataset — uploading an empty file is
    /// the documented way to empty a dataset.
    fn persist(&self, layout: &ReportLayout, records: &[ValidatedRecord]) -> IngestResult<usize>;

    /// Recent upload runs, newest first.
    fn list_recent_runs(&self, limit: usize) -> IngestResult<Vec<RunRecord>>;

    /// Read the current dataset back (upload history page, tests).
    fn dataset(&self, layout: &ReportLayout) -> IngestResult<Vec<ValidatedRecord>>;
}
