use crate::layout::ReportType;
use thiserror::Error;

/// Convenience result type for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Error type returned by ingestion and storage functions.
///
/// This is a single error enum shared across the readers, the pipeline, and
/// the SQLite store. Row-scoped problems are *not* represented here — they
/// are collected as strings alongside the data (see
/// [`crate::types::SheetData`]) so one bad row never aborts a read.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Workbook decoding error (zip/xml-level, not cell-level).
    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    /// Store/audit database error.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// JSON (de)serialization error while persisting structured cell values.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The report type is not registered for the uploaded file's format.
    #[error("unsupported file format '{extension}' for {report_type}: expected one of {}", accepted.join(", "))]
    UnsupportedFormat {
        report_type: ReportType,
        extension: String,
        accepted: Vec<String>,
    },

    /// The input exceeds the configured size ceiling; the body is never read.
    #[error("file too large: {actual} bytes (max {max})")]
    FileTooLarge { actual: u64, max: u64 },

    /// Structural failure outside a row's scope, e.g. a stored value that no
    /// longer matches its column kind.
    #[error("parsing failed: {0}")]
    ParseFailed(String),
}
