//! Delimited-text reader.
//!
//! Reads a whole-file byte buffer into [`RawRecord`]s using the layout's
//! delimiter and header/data row offsets. Row-scoped problems (column count
//! mismatches, undecodable rows) are collected as error strings and counted
//! as skipped; only the absence of any usable structure (empty buffer, header
//! offset past the end, blank header row) leaves the result with zero records
//! plus an error for the orchestrator to arbitrate.

use crate::layout::SheetLayout;
use crate::types::{RawCell, RawRecord, SheetData};

/// Read a delimited buffer according to a sheet layout.
///
/// Quoted fields are unquoted one layer by the underlying csv parser, so a
/// `"1";"2"` row under delimiter `;` yields the fields `1` and `2`. Blank
/// lines are skipped by the parser and never counted.
pub fn read_delimited(bytes: &[u8], sheet: &SheetLayout, delimiter: u8) -> SheetData {
    let mut out = SheetData::default();

    if bytes.is_empty() {
        out.errors.push("File is empty".to_string());
        return out;
    }

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    // Materialize every physical row first; header/data offsets index into
    // this sequence of non-empty lines.
    let mut rows: Vec<csv::StringRecord> = Vec::new();
    for result in rdr.records() {
        match result {
            Ok(record) => rows.push(record),
            Err(e) => {
                out.total_rows += 1;
                out.skipped_rows += 1;
                out.errors.push(format!("Row {}: parse error: {e}", rows.len() + 1));
            }
        }
    }
    // Counters cover the data region only, so parsed + skipped == total holds
    // for every outcome.
    out.total_rows += rows.len().saturating_sub(sheet.data_start_row - 1);

    if rows.is_empty() {
        out.errors.push("File is empty".to_string());
        return out;
    }
    if sheet.header_row > rows.len() {
        out.errors.push(format!(
            "Header row {} exceeds file length {}",
            sheet.header_row,
            rows.len()
        ));
        out.skipped_rows = out.total_rows;
        return out;
    }

    let headers: Vec<String> = rows[sheet.header_row - 1]
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.iter().all(String::is_empty) {
        out.errors.push("No headers found".to_string());
        out.skipped_rows = out.total_rows;
        return out;
    }

    for (offset, record) in rows.iter().enumerate().skip(sheet.data_start_row - 1) {
        let row_number = offset + 1;

        if record.iter().all(|f| f.trim().is_empty()) {
            out.skipped_rows += 1;
            continue;
        }
        if record.len() != headers.len() {
            out.errors.push(format!(
                "Row {row_number}: column count mismatch: expected {}, got {}",
                headers.len(),
                record.len()
            ));
            out.skipped_rows += 1;
            continue;
        }

        let mut raw = RawRecord::new(row_number);
        for (header, field) in headers.iter().zip(record.iter()) {
            let trimmed = field.trim();
            let cell = if trimmed.is_empty() {
                RawCell::Empty
            } else {
                RawCell::Text(trimmed.to_string())
            };
            raw.cells.insert(header.clone(), cell);
        }
        out.records.push(raw);
        out.parsed_rows += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::SheetLayout;

    fn csv_sheet() -> SheetLayout {
        SheetLayout {
            sheet_name: "",
            header_row: 1,
            data_start_row: 2,
            fields: Vec::new(),
        }
    }

    #[test]
    fn reads_quoted_fields_under_semicolon_delimiter() {
        let data = read_delimited(b"A;B\n\"1\";\"2\"\n", &csv_sheet(), b';');
        assert!(data.errors.is_empty());
        assert_eq!(data.parsed_rows, 1);
        let rec = &data.records[0];
        assert_eq!(rec.get("A"), Some(&RawCell::Text("1".to_string())));
        assert_eq!(rec.get("B"), Some(&RawCell::Text("2".to_string())));
    }

    #[test]
    fn column_count_mismatch_is_skipped_not_fatal() {
        let data = read_delimited(b"A;B\n1;2\n1;2;3\n", &csv_sheet(), b';');
        assert_eq!(data.parsed_rows, 1);
        assert_eq!(data.skipped_rows, 1);
        assert_eq!(data.total_rows, 2);
        assert_eq!(data.errors.len(), 1);
        assert!(data.errors[0].contains("column count mismatch"));
    }

    #[test]
    fn counters_add_up_for_clean_input() {
        let data = read_delimited(b"A;B\n1;2\n3;4\n5;6\n", &csv_sheet(), b';');
        assert_eq!(data.parsed_rows, 3);
        assert_eq!(data.parsed_rows + data.skipped_rows, data.total_rows);
    }

    #[test]
    fn empty_buffer_reports_error_with_zero_records() {
        let data = read_delimited(b"", &csv_sheet(), b';');
        assert!(data.records.is_empty());
        assert_eq!(data.errors, vec!["File is empty".to_string()]);
    }

    #[test]
    fn header_row_past_end_is_a_sheet_failure() {
        let sheet = SheetLayout {
            header_row: 5,
            ..csv_sheet()
        };
        let data = read_delimited(b"A;B\n1;2\n", &sheet, b';');
        assert!(data.records.is_empty());
        assert!(data.errors[0].contains("Header row 5 exceeds file length 2"));
    }

    #[test]
    fn blank_fields_become_empty_cells() {
        let data = read_delimited(b"A;B\n1;\n", &csv_sheet(), b';');
        assert_eq!(data.records[0].get("B"), Some(&RawCell::Empty));
    }
}
