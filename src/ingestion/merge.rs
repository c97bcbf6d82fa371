//! Multi-sheet record merge.
//!
//! Report types whose record spans several workbook tabs (the Ozon category
//! products template) are joined here: the primary sheet seeds the composite
//! records, and secondary sheets contribute their fields by merge key. A
//! composite record always anchors to a primary-sheet key — secondary rows
//! whose key is absent from the primary sheet are dropped.

use std::collections::{HashMap, HashSet};

use crate::types::{RawRecord, SheetData};

/// Join one primary sheet with zero or more secondary sheets on `merge_key`.
///
/// Rules:
/// - primary rows with an empty merge key are dropped and counted as skipped;
/// - fields contributed by the primary sheet are never overwritten;
/// - among secondary sheets, the later sheet wins on a shared field;
/// - counters and error/warning lists are summed across all sheets.
pub fn merge_sheets(merge_key: &str, primary: SheetData, secondaries: Vec<SheetData>) -> SheetData {
    let mut out = SheetData {
        total_rows: primary.total_rows,
        parsed_rows: primary.parsed_rows,
        skipped_rows: primary.skipped_rows,
        errors: primary.errors,
        warnings: primary.warnings,
        ..SheetData::default()
    };

    let mut primary_labels: HashSet<String> = HashSet::new();
    let mut order: Vec<String> = Vec::new();
    let mut by_key: HashMap<String, RawRecord> = HashMap::new();

    for record in primary.records {
        let key = record_key(&record, merge_key);
        let Some(key) = key else {
            out.parsed_rows -= 1;
            out.skipped_rows += 1;
            continue;
        };
        primary_labels.extend(record.cells.keys().cloned());
        if !by_key.contains_key(&key) {
            order.push(key.clone());
        }
        by_key.insert(key, record);
    }

    for sheet in secondaries {
        out.total_rows += sheet.total_rows;
        out.parsed_rows += sheet.parsed_rows;
        out.skipped_rows += sheet.skipped_rows;
        out.errors.extend(sheet.errors);
        out.warnings.extend(sheet.warnings);

        for record in sheet.records {
            let Some(key) = record_key(&record, merge_key) else {
                out.parsed_rows -= 1;
                out.skipped_rows += 1;
                continue;
            };
            // Keys without a primary anchor are dropped silently.
            let Some(composite) = by_key.get_mut(&key) else {
                continue;
            };
            for (label, cell) in record.cells {
                if label == merge_key {
                    continue;
                }
                let from_primary = primary_labels.contains(&label);
                if !from_primary || !composite.cells.contains_key(&label) {
                    composite.cells.insert(label, cell);
                }
            }
        }
    }

    out.records = order
        .into_iter()
        .filter_map(|key| by_key.remove(&key))
        .collect();
    out
}

fn record_key(record: &RawRecord, merge_key: &str) -> Option<String> {
    let text = record.get(merge_key)?.to_text();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawCell;

    fn record(row: usize, cells: &[(&str, &str)]) -> RawRecord {
        let mut r = RawRecord::new(row);
        for (label, value) in cells {
            let cell = if value.is_empty() {
                RawCell::Empty
            } else {
                RawCell::Text((*value).to_string())
            };
            r.cells.insert((*label).to_string(), cell);
        }
        r
    }

    fn sheet(records: Vec<RawRecord>) -> SheetData {
        let parsed = records.len();
        SheetData {
            records,
            total_rows: parsed,
            parsed_rows: parsed,
            ..SheetData::default()
        }
    }

    #[test]
    fn secondary_fields_attach_by_key() {
        let primary = sheet(vec![record(4, &[("Артикул*", "A-1"), ("Цена", "100")])]);
        let video = sheet(vec![record(4, &[("Артикул*", "A-1"), ("Видео", "v1")])]);

        let merged = merge_sheets("Артикул*", primary, vec![video]);
        assert_eq!(merged.records.len(), 1);
        assert_eq!(
            merged.records[0].get("Видео"),
            Some(&RawCell::Text("v1".to_string()))
        );
        assert_eq!(merged.total_rows, 2);
        assert_eq!(merged.parsed_rows, 2);
    }

    #[test]
    fn secondary_rows_without_primary_anchor_are_dropped() {
        let primary = sheet(vec![record(4, &[("Артикул*", "A-1")])]);
        let video = sheet(vec![record(4, &[("Артикул*", "A-2"), ("Видео", "v2")])]);

        let merged = merge_sheets("Артикул*", primary, vec![video]);
        assert_eq!(merged.records.len(), 1);
        assert!(merged.records[0].get("Видео").is_none());
    }

    #[test]
    fn empty_primary_key_is_skipped() {
        let primary = sheet(vec![
            record(4, &[("Артикул*", ""), ("Цена", "1")]),
            record(5, &[("Артикул*", "A-1"), ("Цена", "2")]),
        ]);
        let merged = merge_sheets("Артикул*", primary, vec![]);
        assert_eq!(merged.records.len(), 1);
        assert_eq!(merged.parsed_rows, 1);
        assert_eq!(merged.skipped_rows, 1);
    }

    #[test]
    fn primary_fields_are_not_overwritten() {
        let primary = sheet(vec![record(4, &[("Артикул*", "A-1"), ("Цена", "100")])]);
        let rogue = sheet(vec![record(4, &[("Артикул*", "A-1"), ("Цена", "999")])]);

        let merged = merge_sheets("Артикул*", primary, vec![rogue]);
        assert_eq!(
            merged.records[0].get("Цена"),
            Some(&RawCell::Text("100".to_string()))
        );
    }

    #[test]
    fn later_secondary_wins_on_shared_secondary_field() {
        let primary = sheet(vec![record(4, &[("Артикул*", "A-1")])]);
        let first = sheet(vec![record(4, &[("Артикул*", "A-1"), ("Видео", "old")])]);
        let second = sheet(vec![record(4, &[("Артикул*", "A-1"), ("Видео", "new")])]);

        let merged = merge_sheets("Артикул*", primary, vec![first, second]);
        assert_eq!(
            merged.records[0].get("Видео"),
            Some(&RawCell::Text("new".to_string()))
        );
    }
}
