//! Core data model types for the ingestion pipeline.
//!
//! Raw sheet rows flow through the pipeline as [`RawRecord`]s (untyped cells
//! keyed by source column label), become [`ValidatedRecord`]s (typed
//! [`Value`]s keyed by canonical field name) after coercion, and the run as a
//! whole is summarized by an [`UploadOutcome`].

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

/// An untyped scalar extracted from a delimited field or a workbook cell.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    /// Missing/blank cell.
    Empty,
    /// Text cell (already trimmed by the reader).
    Text(String),
    /// Numeric cell (workbook input only; delimited input is always text).
    Number(f64),
    /// Boolean cell (workbook input only).
    Bool(bool),
}

impl RawCell {
    /// Whether the cell carries no data.
    pub fn is_empty(&self) -> bool {
        match self {
            RawCell::Empty => true,
            RawCell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Render the cell as text, the way it would appear in the source file.
    ///
    /// Integral floats drop the `.0` tail so workbook-numeric identifiers
    /// round-trip as the strings users expect.
    pub fn to_text(&self) -> String {
        match self {
            RawCell::Empty => String::new(),
            RawCell::Text(s) => s.clone(),
            RawCell::Number(f) => {
                if f.fract() == 0.0 && f.abs() < 9e15 {
                    format!("{}", *f as i64)
                } else {
                    f.to_string()
                }
            }
            RawCell::Bool(b) => b.to_string(),
        }
    }
}

/// One source row: source column label -> raw cell, positioned at a 1-based
/// row index within its sheet.
///
/// Created by the readers, consumed by merge/validation; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// 1-based row number in the source sheet (for error messages).
    pub row: usize,
    /// Cells keyed by source column label.
    pub cells: HashMap<String, RawCell>,
}

impl RawRecord {
    /// Create an empty record at a row position.
    pub fn new(row: usize) -> Self {
        Self {
            row,
            cells: HashMap::new(),
        }
    }

    /// Look up a cell by source column label.
    pub fn get(&self, label: &str) -> Option<&RawCell> {
        self.cells.get(label)
    }
}

/// Output of reading one sheet (or one delimited buffer): the surviving
/// records plus audit counters and row-scoped errors.
///
/// Structural failures (missing sheet, no headers) yield zero records and at
/// least one error — never a panic — so the orchestrator decides next steps.
#[derive(Debug, Default)]
pub struct SheetData {
    /// Rows that carried data, in source order.
    pub records: Vec<RawRecord>,
    /// Physical rows seen in the source.
    pub total_rows: usize,
    /// Rows emitted as records.
    pub parsed_rows: usize,
    /// Rows dropped (blank, malformed, or empty merge key).
    pub skipped_rows: usize,
    /// Row-scoped errors, e.g. column count mismatches.
    pub errors: Vec<String>,
    /// Non-fatal notes, e.g. a missing optional sheet.
    pub warnings: Vec<String>,
}

/// A typed value produced by schema coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value, or an optional field that failed soft coercion.
    Null,
    /// Trimmed string.
    Str(String),
    /// Integer.
    Int(i64),
    /// Decimal number.
    Decimal(f64),
    /// Boolean.
    Bool(bool),
    /// Wide integer (marketplace SKUs exceed the 2^53 range some exports
    /// were produced under, hence a kind of its own).
    BigInt(i128),
    /// Structured value parsed from a JSON cell.
    Json(serde_json::Value),
}

/// A record that passed validation: canonical field name -> typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    /// 1-based source row, kept for audit logging.
    pub row: usize,
    /// Typed values keyed by canonical field name; fields the source left
    /// empty are present as [`Value::Null`].
    pub values: BTreeMap<String, Value>,
}

/// Row counters carried through every stage and into the audit record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowCounts {
    /// Physical rows seen across all sheets.
    pub total_rows: usize,
    /// Rows emitted as records.
    pub parsed_rows: usize,
    /// Rows dropped before validation.
    pub skipped_rows: usize,
}

/// Aggregate result of one upload run. Immutable once returned.
#[derive(Debug, Serialize)]
pub struct UploadOutcome {
    /// Whether the run reached `Completed`.
    pub success: bool,
    /// Audit run id, if the run got far enough to create one.
    pub run_id: Option<i64>,
    /// Validated records persisted (0 on failure).
    pub records_processed: usize,
    /// Error detail list, truncated to [`crate::ingestion::pipeline::MAX_REPORTED_ERRORS`]
    /// entries with a `... and N more` tail. The unabridged list goes to the log.
    pub errors: Vec<String>,
    /// Non-fatal warnings (row-scoped parse errors on a run that still
    /// produced data, missing optional sheets).
    pub warnings: Vec<String>,
    /// Row counters summed across sheets.
    pub metadata: RowCounts,
    /// Wall-clock duration of the whole run, milliseconds.
    pub elapsed_ms: u64,
}
