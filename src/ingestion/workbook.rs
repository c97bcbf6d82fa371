//! Workbook (xlsx/xls) reader.
//!
//! Wraps a calamine auto-detected workbook opened over the upload's byte
//! buffer. Sheets are located by exact name; a missing sheet yields zero
//! records plus an error naming the available sheets — and, when the sheet
//! set matches a different registered report type, a targeted "wrong import
//! type" hint instead.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader, Sheets};

use crate::error::IngestResult;
use crate::layout::{ReportType, SheetLayout};
use crate::types::{RawCell, RawRecord, SheetData};

/// An uploaded workbook, ready for per-sheet extraction.
pub struct Workbook<'a> {
    sheets: Sheets<Cursor<&'a [u8]>>,
    names: Vec<String>,
}

impl<'a> Workbook<'a> {
    /// Open a workbook from an in-memory buffer.
    pub fn open(bytes: &'a [u8]) -> IngestResult<Self> {
        let sheets = open_workbook_auto_from_rs(Cursor::new(bytes))?;
        let names = sheets.sheet_names().to_vec();
        Ok(Self { sheets, names })
    }

    /// Tab names present in the workbook.
    pub fn sheet_names(&self) -> &[String] {
        &self.names
    }

    /// Whether a tab with this exact name exists.
    pub fn has_sheet(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Extract one sheet according to its layout.
    ///
    /// `wrong_type_hint` is the report type this workbook's sheet set matched
    /// (if any); it turns the missing-sheet error into an actionable message
    /// for files uploaded under the wrong import type.
    pub fn read_sheet(
        &mut self,
        sheet: &SheetLayout,
        wrong_type_hint: Option<ReportType>,
    ) -> SheetData {
        let mut out = SheetData::default();

        if self.names.is_empty() {
            out.errors.push("No sheets found in workbook".to_string());
            return out;
        }
        if !self.has_sheet(sheet.sheet_name) {
            out.errors.push(match wrong_type_hint {
                Some(other) => format!(
                    "This appears to be a '{other}' file; select that import type instead. \
                     Available sheets: {}",
                    self.names.join(", ")
                ),
                None => format!(
                    "Sheet \"{}\" not found. Available sheets: {}",
                    sheet.sheet_name,
                    self.names.join(", ")
                ),
            });
            return out;
        }

        let range = match self.sheets.worksheet_range(sheet.sheet_name) {
            Ok(range) => range,
            Err(e) => {
                out.errors
                    .push(format!("Failed to read sheet \"{}\": {e}", sheet.sheet_name));
                return out;
            }
        };

        read_sheet_range(&range, sheet, &mut out);
        out
    }
}

fn read_sheet_range(range: &Range<Data>, sheet: &SheetLayout, out: &mut SheetData) {
    let Some((end_row, end_col)) = range.end() else {
        out.errors
            .push(format!("Sheet \"{}\" is empty", sheet.sheet_name));
        return;
    };
    let physical_rows = end_row as usize + 1;
    out.total_rows = physical_rows.saturating_sub(sheet.data_start_row - 1);

    if sheet.header_row > physical_rows {
        out.errors.push(format!(
            "Header row {} exceeds sheet rows {} in \"{}\"",
            sheet.header_row, physical_rows, sheet.sheet_name
        ));
        return;
    }

    // Header projection: trimmed non-empty cells of the header row, keeping
    // their absolute column positions so data reads line up even when blank
    // header cells sit between declared columns.
    let header_abs = (sheet.header_row - 1) as u32;
    let mut headers: Vec<(u32, String)> = Vec::new();
    for col in 0..=end_col {
        if let Some(cell) = range.get_value((header_abs, col)) {
            let label = header_text(cell);
            if !label.is_empty() {
                headers.push((col, label));
            }
        }
    }
    if headers.is_empty() {
        out.errors.push(format!(
            "No headers found in sheet \"{}\"",
            sheet.sheet_name
        ));
        return;
    }

    for row_idx in (sheet.data_start_row - 1)..physical_rows {
        let mut raw = RawRecord::new(row_idx + 1);
        let mut has_data = false;

        for (col, label) in &headers {
            let cell = range
                .get_value((row_idx as u32, *col))
                .map_or(RawCell::Empty, convert_cell);
            if !cell.is_empty() {
                has_data = true;
            }
            raw.cells.insert(label.clone(), cell);
        }

        if has_data {
            out.records.push(raw);
            out.parsed_rows += 1;
        } else {
            out.skipped_rows += 1;
        }
    }
}

fn header_text(c: &Data) -> String {
    match c {
        Data::String(s) => s.trim().to_string(),
        Data::Empty => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

fn convert_cell(c: &Data) -> RawCell {
    match c {
        Data::Empty => RawCell::Empty,
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                RawCell::Empty
            } else {
                RawCell::Text(trimmed.to_string())
            }
        }
        Data::Float(f) => RawCell::Number(*f),
        Data::Int(i) => RawCell::Number(*i as f64),
        Data::Bool(b) => RawCell::Bool(*b),
        Data::DateTime(dt) => RawCell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => RawCell::Text(s.clone()),
        // Formula error cells carry no usable value.
        Data::Error(_) => RawCell::Empty,
    }
}
