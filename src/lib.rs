//! `marketplace-ingest` loads marketplace report exports (Ozon, Wildberries)
//! into per-report SQLite datasets, with an audit trail for every upload.
//!
//! The primary entrypoint is [`Ingestor::ingest`]: give it the raw bytes of
//! an uploaded file plus the [`ReportType`] it claims to be, and it runs the
//! full pipeline — layout resolution, CSV/workbook parsing, multi-sheet
//! merge, schema validation with type coercion, and a transactional
//! replace-all load into the store.
//!
//! ## What you can ingest
//!
//! Each report type binds to a [`layout::ReportLayout`] describing the
//! expected file format, sheet names, header geometry, and field dictionary:
//!
//! - **CSV** (`;`-delimited): Ozon orders, Ozon products
//! - **Workbooks** (`.xlsx`/`.xls`): Ozon barcodes, Ozon category products
//!   (multi-sheet), Wildberries products, Wildberries prices
//!
//! Source files carry Russian column headers; the layouts map them to stable
//! snake_case column names in the datasets.
//!
//! ## Guarantees
//!
//! - Validation is all-or-nothing: any rejected record fails the whole run
//!   and the prior dataset stays untouched.
//! - Persistence is replace-all inside one transaction; readers see either
//!   the old dataset or the new one, never a mix.
//! - Runs targeting the same report type are serialized; different report
//!   types proceed in parallel.
//!
//! ```no_run
//! use marketplace_ingest::{Ingestor, ReportType, SqliteStore, UploadRequest};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::open("reports.db")?;
//! let ingestor = Ingestor::new(store);
//!
//! let outcome = ingestor.ingest(UploadRequest {
//!     report_type: ReportType::WbPrices,
//!     file_name: "prices.xlsx".to_string(),
//!     bytes: std::fs::read("prices.xlsx")?,
//! });
//! println!("success={} records={}", outcome.success, outcome.records_processed);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod ingestion;
pub mod layout;
pub mod store;
pub mod types;

pub use error::{IngestError, IngestResult};
pub use ingestion::{Ingestor, UploadRequest, UploadStage, MAX_FILE_SIZE, MAX_REPORTED_ERRORS};
pub use layout::{FieldKind, LayoutRegistry, ReportLayout, ReportType, SheetLayout, SourceFormat};
pub use store::{ReportStore, RunRecord, RunStatus, RunUpdate, SqliteStore};
pub use types::{RawCell, RawRecord, RowCounts, SheetData, UploadOutcome, ValidatedRecord, Value};
