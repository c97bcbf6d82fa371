//! File ingestion: parsing, merging, validation, orchestration.
//!
//! Format readers ([`delimited`], [`workbook`]) extract positional cells into
//! label-keyed [`crate::types::RawRecord`]s; [`merge`] joins multi-sheet
//! templates into composite records; [`validate`] coerces them against the
//! layout's field dictionary; [`pipeline`] drives the whole run and keeps the
//! audit trail.

pub mod delimited;
pub mod merge;
pub mod pipeline;
pub mod validate;
pub mod workbook;

pub use pipeline::{Ingestor, UploadRequest, UploadStage, MAX_FILE_SIZE, MAX_REPORTED_ERRORS};
pub use workbook::Workbook;
