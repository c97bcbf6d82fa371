//! Ingestion orchestrator.
//!
//! Drives one upload through `Received -> Validating -> Parsing ->
//! Transforming -> Persisting -> Completed|Failed`, logging every transition
//! and keeping the audit run record in step. Validation is all-or-nothing per
//! run: a report is a full-dataset snapshot, and persisting a partial one
//! would corrupt downstream analytics worse than rejecting the file.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{error, info, warn};

use crate::error::{IngestError, IngestResult};
use crate::layout::{LayoutRegistry, ReportLayout, ReportType, SourceFormat};
use crate::store::{ReportStore, RunStatus, RunUpdate};
use crate::types::{RowCounts, SheetData, UploadOutcome};

use super::delimited::read_delimited;
use super::merge::merge_sheets;
use super::validate::validate_records;
use super::workbook::Workbook;

/// Size ceiling; oversized input fails without reading the body.
pub const MAX_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Error detail entries kept in the outcome; the full list goes to the log.
pub const MAX_REPORTED_ERRORS: usize = 20;

/// Pipeline state, recorded on failure so the audit trail names where a run
/// died.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    /// Upload accepted, nothing checked yet.
    Received,
    /// Report type/extension/size checks.
    Validating,
    /// Cell extraction and multi-sheet merge.
    Parsing,
    /// Schema validation and coercion.
    Transforming,
    /// Replace-all store write.
    Persisting,
    /// Terminal success.
    Completed,
    /// Terminal failure.
    Failed,
}

impl UploadStage {
    /// Stage name for logs and audit messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStage::Received => "received",
            UploadStage::Validating => "validating",
            UploadStage::Parsing => "parsing",
            UploadStage::Transforming => "transforming",
            UploadStage::Persisting => "persisting",
            UploadStage::Completed => "completed",
            UploadStage::Failed => "failed",
        }
    }
}

/// One upload: the raw bytes plus the identity needed to route them.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Which report this file claims to be.
    pub report_type: ReportType,
    /// Original file name; used only for extension derivation and audit.
    pub file_name: String,
    /// Whole file contents.
    pub bytes: Vec<u8>,
}

/// The ingestion orchestrator.
///
/// Runs targeting the same report type are serialized (they race on the
/// replace-all delete+insert otherwise); different report types proceed in
/// parallel.
pub struct Ingestor<S: ReportStore> {
    store: S,
    registry: LayoutRegistry,
    run_locks: Mutex<HashMap<ReportType, Arc<Mutex<()>>>>,
}

impl<S: ReportStore> Ingestor<S> {
    /// Create an orchestrator over a store, with the default layout registry.
    pub fn new(store: S) -> Self {
        Self {
            store,
            registry: LayoutRegistry::new(),
            run_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Layout registry in use.
    pub fn registry(&self) -> &LayoutRegistry {
        &self.registry
    }

    /// The underlying store (read paths: run history, datasets).
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one upload end to end and return its outcome.
    ///
    /// Never panics and never returns `Err`: every internal failure is
    /// converted into a `Failed` outcome with a human-readable summary.
    pub fn ingest(&self, request: UploadRequest) -> UploadOutcome {
        let lock = self.run_lock(request.report_type);
        let _serialized = lock.lock().unwrap_or_else(|e| e.into_inner());
        let started = Instant::now();

        info!(
            report_type = %request.report_type,
            file = %request.file_name,
            size = request.bytes.len(),
            stage = UploadStage::Received.as_str(),
            "upload received"
        );

        // Validating: report type + extension + size ceiling, before any
        // parsing and before the audit run exists.
        let extension = file_extension(&request.file_name);
        let layout = match self.registry.resolve(request.report_type, &extension) {
            Ok(layout) => layout,
            Err(e) => {
                return self.fail(
                    &request,
                    None,
                    UploadStage::Validating,
                    vec![e.to_string()],
                    RowCounts::default(),
                    Vec::new(),
                    started,
                )
            }
        };
        if request.bytes.len() as u64 > MAX_FILE_SIZE {
            let e = IngestError::FileTooLarge {
                actual: request.bytes.len() as u64,
                max: MAX_FILE_SIZE,
            };
            return self.fail(
                &request,
                None,
                UploadStage::Validating,
                vec![e.to_string()],
                RowCounts::default(),
                Vec::new(),
                started,
            );
        }

        let run_id = match self.store.create_run(
            request.report_type,
            &request.file_name,
            request.bytes.len() as u64,
        ) {
            Ok(id) => id,
            Err(e) => {
                return self.fail(
                    &request,
                    None,
                    UploadStage::Validating,
                    vec![e.to_string()],
                    RowCounts::default(),
                    Vec::new(),
                    started,
                )
            }
        };

        // Parsing.
        info!(run_id, stage = UploadStage::Parsing.as_str(), "parsing file");
        let parsed = match self.parse(layout, &request.bytes) {
            Ok(data) => data,
            Err(e) => {
                return self.fail(
                    &request,
                    Some(run_id),
                    UploadStage::Parsing,
                    vec![e.to_string()],
                    RowCounts::default(),
                    Vec::new(),
                    started,
                )
            }
        };
        let counts = RowCounts {
            total_rows: parsed.total_rows,
            parsed_rows: parsed.parsed_rows,
            skipped_rows: parsed.skipped_rows,
        };

        // Zero data plus at least one error is a failed parse, never a
        // silent "zero records, success".
        if parsed.records.is_empty() && !parsed.errors.is_empty() {
            return self.fail(
                &request,
                Some(run_id),
                UploadStage::Parsing,
                parsed.errors,
                counts,
                parsed.warnings,
                started,
            );
        }

        let mut warnings = parsed.warnings;
        if !parsed.errors.is_empty() {
            warn!(
                run_id,
                errors = parsed.errors.len(),
                "parsing completed with row errors"
            );
            warnings.extend(parsed.errors);
        }

        // Transforming.
        info!(
            run_id,
            stage = UploadStage::Transforming.as_str(),
            rows = parsed.records.len(),
            "validating records"
        );
        let (records, validation_errors) = validate_records(layout, &parsed.records);
        if !validation_errors.is_empty() {
            return self.fail(
                &request,
                Some(run_id),
                UploadStage::Transforming,
                validation_errors,
                counts,
                warnings,
                started,
            );
        }

        // Persisting.
        info!(
            run_id,
            stage = UploadStage::Persisting.as_str(),
            records = records.len(),
            "replacing dataset"
        );
        let persist_started = Instant::now();
        let count = match self.store.persist(layout, &records) {
            Ok(count) => count,
            Err(e) => {
                return self.fail(
                    &request,
                    Some(run_id),
                    UploadStage::Persisting,
                    vec![e.to_string()],
                    counts,
                    warnings,
                    started,
                )
            }
        };
        if let Err(e) = self.store.update_run(
            run_id,
            RunUpdate {
                status: RunStatus::Completed,
                error_message: None,
                records_count: Some(count),
            },
        ) {
            return self.fail(
                &request,
                Some(run_id),
                UploadStage::Persisting,
                vec![e.to_string()],
                counts,
                warnings,
                started,
            );
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            run_id,
            report_type = %request.report_type,
            stage = UploadStage::Completed.as_str(),
            records = count,
            elapsed_ms,
            storage_ms = persist_started.elapsed().as_millis() as u64,
            "upload completed"
        );

        UploadOutcome {
            success: true,
            run_id: Some(run_id),
            records_processed: count,
            errors: Vec::new(),
            warnings,
            metadata: counts,
            elapsed_ms,
        }
    }

    fn parse(&self, layout: &ReportLayout, bytes: &[u8]) -> IngestResult<SheetData> {
        match layout.format {
            SourceFormat::Delimited => {
                Ok(read_delimited(bytes, layout.primary_sheet(), layout.delimiter))
            }
            SourceFormat::Workbook => {
                let mut workbook = Workbook::open(bytes)?;
                let names = workbook.sheet_names().to_vec();
                let hint = self.registry.workbook_type_hint(layout.report_type, &names);

                let primary = workbook.read_sheet(layout.primary_sheet(), hint);
                let Some(merge_key) = layout.merge_key.filter(|_| layout.is_multi_sheet()) else {
                    return Ok(primary);
                };
                if primary.records.is_empty() && !primary.errors.is_empty() {
                    // The required primary sheet failed; secondary sheets
                    // cannot anchor to anything.
                    return Ok(primary);
                }

                let mut secondaries = Vec::new();
                let mut missing = Vec::new();
                for sheet in &layout.sheets[1..] {
                    if workbook.has_sheet(sheet.sheet_name) {
                        secondaries.push(workbook.read_sheet(sheet, None));
                    } else {
                        missing.push(format!(
                            "Sheet \"{}\" not found in workbook; its fields will be empty",
                            sheet.sheet_name
                        ));
                    }
                }

                let mut merged = merge_sheets(merge_key, primary, secondaries);
                merged.warnings.extend(missing);
                Ok(merged)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fail(
        &self,
        request: &UploadRequest,
        run_id: Option<i64>,
        stage: UploadStage,
        errors: Vec<String>,
        counts: RowCounts,
        warnings: Vec<String>,
        started: Instant,
    ) -> UploadOutcome {
        let elapsed_ms = started.elapsed().as_millis() as u64;

        // The log keeps the unabridged detail list; the outcome is capped.
        error!(
            report_type = %request.report_type,
            file = %request.file_name,
            run_id,
            stage = stage.as_str(),
            error_count = errors.len(),
            elapsed_ms,
            detail = %errors.join("; "),
            "upload failed"
        );

        if let Some(id) = run_id {
            let update = RunUpdate {
                status: RunStatus::Failed,
                error_message: Some(truncate_errors(&errors).join("; ")),
                records_count: None,
            };
            if let Err(e) = self.store.update_run(id, update) {
                error!(run_id = id, error = %e, "failed to record run failure");
            }
        }

        UploadOutcome {
            success: false,
            run_id,
            records_processed: 0,
            errors: truncate_errors(&errors),
            warnings,
            metadata: counts,
            elapsed_ms,
        }
    }

    fn run_lock(&self, report_type: ReportType) -> Arc<Mutex<()>> {
        let mut locks = self.run_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(report_type).or_default().clone()
    }
}

fn file_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn truncate_errors(errors: &[String]) -> Vec<String> {
    if errors.len() <= MAX_REPORTED_ERRORS {
        return errors.to_vec();
    }
    let mut out = errors[..MAX_REPORTED_ERRORS].to_vec();
    out.push(format!("... and {} more", errors.len() - MAX_REPORTED_ERRORS));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercased_and_empty_when_absent() {
        assert_eq!(file_extension("report.XLSX"), "xlsx");
        assert_eq!(file_extension("archive.tar.csv"), "csv");
        assert_eq!(file_extension("noextension"), "");
    }

    #[test]
    fn error_list_is_capped_with_a_tail_marker() {
        let errors: Vec<String> = (0..25).map(|i| format!("Row {i}: bad")).collect();
        let capped = truncate_errors(&errors);
        assert_eq!(capped.len(), MAX_REPORTED_ERRORS + 1);
        assert_eq!(capped.last().unwrap(), "... and 5 more");
    }
}
