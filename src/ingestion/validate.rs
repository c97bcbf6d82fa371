//! Schema validation and type coercion.
//!
//! One generic pass interprets a layout's field dictionary over merged (or
//! single-sheet) records — no per-report-type branching. Every field error
//! for a record is collected before the record is rejected, so a malformed
//! row reports all of its problems at once. Optional fields that fail
//! numeric/boolean coercion soft-fail to null: source exports mix locales and
//! units, and the loose tolerance is deliberate.

use std::collections::BTreeMap;

use crate::layout::{FieldKind, FieldRule, ReportLayout};
use crate::types::{RawCell, RawRecord, ValidatedRecord, Value};

/// Validate and coerce records against a layout's field dictionary.
///
/// Returns the accepted records plus a flat list of record-scoped errors.
/// A record is rejected when any required field is empty or any fatal
/// coercion (JSON parse) fails; accepted otherwise.
pub fn validate_records(
    layout: &ReportLayout,
    records: &[RawRecord],
) -> (Vec<ValidatedRecord>, Vec<String>) {
    let rules = layout.merged_fields();
    let mut accepted = Vec::with_capacity(records.len());
    let mut errors = Vec::new();

    for record in records {
        let mut values = BTreeMap::new();
        let mut record_errors = Vec::new();

        for rule in &rules {
            match coerce_field(record, rule) {
                Ok(value) => {
                    values.insert(rule.canonical.to_string(), value);
                }
                Err(problem) => {
                    record_errors.push(format!("Row {}: {}: {problem}", record.row, rule.label));
                }
            }
        }

        if record_errors.is_empty() {
            accepted.push(ValidatedRecord {
                row: record.row,
                values,
            });
        } else {
            errors.append(&mut record_errors);
        }
    }

    (accepted, errors)
}

fn coerce_field(record: &RawRecord, rule: &FieldRule) -> Result<Value, String> {
    let cell = record.get(rule.label).unwrap_or(&RawCell::Empty);

    if cell.is_empty() {
        return if rule.required {
            Err("required".to_string())
        } else {
            Ok(Value::Null)
        };
    }

    match rule.kind {
        FieldKind::Str => {
            let mut text = cell.to_text().trim().to_string();
            if rule.strip_quotes {
                text.retain(|c| c != '\'');
            }
            if text.is_empty() && rule.required {
                return Err("required".to_string());
            }
            Ok(Value::Str(text))
        }
        FieldKind::Integer => Ok(coerce_integer(cell)),
        FieldKind::Decimal => Ok(coerce_decimal(cell)),
        FieldKind::Boolean => Ok(coerce_boolean(cell)),
        FieldKind::BigInt => Ok(coerce_bigint(cell)),
        FieldKind::Json => coerce_json(cell),
    }
}

fn coerce_integer(cell: &RawCell) -> Value {
    match cell {
        RawCell::Number(f) => Value::Int(f.floor() as i64),
        RawCell::Text(s) => {
            // Strip everything non-numeric ("1 024 шт." -> 1024); locales vary.
            let digits: String = s.chars().filter(char::is_ascii_digit).collect();
            digits.parse::<i64>().map_or(Value::Null, Value::Int)
        }
        _ => Value::Null,
    }
}

fn coerce_decimal(cell: &RawCell) -> Value {
    match cell {
        RawCell::Number(f) => Value::Decimal(*f),
        RawCell::Text(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ','))
                .map(|c| if c == ',' { '.' } else { c })
                .collect();
            cleaned.parse::<f64>().map_or(Value::Null, Value::Decimal)
        }
        _ => Value::Null,
    }
}

fn coerce_boolean(cell: &RawCell) -> Value {
    match cell {
        RawCell::Bool(b) => Value::Bool(*b),
        RawCell::Text(s) => match s.trim().to_lowercase().as_str() {
            "да" | "yes" | "true" => Value::Bool(true),
            "нет" | "no" | "false" => Value::Bool(false),
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

fn coerce_bigint(cell: &RawCell) -> Value {
    match cell {
        RawCell::Number(f) if f.fract() == 0.0 => Value::BigInt(*f as i128),
        RawCell::Text(s) => {
            let trimmed = s.trim();
            if let Ok(v) = trimmed.parse::<i128>() {
                Value::BigInt(v)
            } else {
                // Exports sometimes render large ids in float notation.
                match trimmed.parse::<f64>() {
                    Ok(f) if f.fract() == 0.0 => Value::BigInt(f as i128),
                    _ => Value::Null,
                }
            }
        }
        _ => Value::Null,
    }
}

fn coerce_json(cell: &RawCell) -> Result<Value, String> {
    match cell {
        RawCell::Text(s) => serde_json::from_str(s)
            .map(Value::Json)
            .map_err(|_| "invalid JSON".to_string()),
        RawCell::Number(f) => Ok(Value::Json(serde_json::json!(f))),
        RawCell::Bool(b) => Ok(Value::Json(serde_json::json!(b))),
        RawCell::Empty => Ok(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{LayoutRegistry, ReportType};
    use crate::types::RawRecord;

    fn category_layout(registry: &LayoutRegistry) -> &ReportLayout {
        registry
            .resolve(ReportType::OzonCategoryProducts, "xlsx")
            .unwrap()
    }

    fn record(row: usize, cells: &[(&str, RawCell)]) -> RawRecord {
        let mut r = RawRecord::new(row);
        for (label, cell) in cells {
            r.cells.insert((*label).to_string(), cell.clone());
        }
        r
    }

    #[test]
    fn russian_boolean_coerces_case_and_whitespace_insensitively() {
        assert_eq!(
            coerce_boolean(&RawCell::Text("Да".to_string())),
            Value::Bool(true)
        );
        assert_eq!(
            coerce_boolean(&RawCell::Text("да ".to_string())),
            Value::Bool(true)
        );
        assert_eq!(
            coerce_boolean(&RawCell::Text("НЕТ".to_string())),
            Value::Bool(false)
        );
        assert_eq!(
            coerce_boolean(&RawCell::Text("maybe".to_string())),
            Value::Null
        );
    }

    #[test]
    fn numeric_coercion_tolerates_currency_and_comma_separators() {
        assert_eq!(
            coerce_decimal(&RawCell::Text("1234,56 ₽".to_string())),
            Value::Decimal(1234.56)
        );
        assert_eq!(
            coerce_integer(&RawCell::Text("2 048 шт.".to_string())),
            Value::Int(2048)
        );
        assert_eq!(
            coerce_decimal(&RawCell::Text("н/д".to_string())),
            Value::Null
        );
    }

    #[test]
    fn bigint_parses_large_identifiers() {
        assert_eq!(
            coerce_bigint(&RawCell::Text("123456789012345678".to_string())),
            Value::BigInt(123_456_789_012_345_678)
        );
        assert_eq!(
            coerce_bigint(&RawCell::Text("oops".to_string())),
            Value::Null
        );
    }

    #[test]
    fn required_field_missing_rejects_record_with_row_scoped_error() {
        let registry = LayoutRegistry::new();
        let layout = category_layout(&registry);
        let rec = record(4, &[("Название товара", RawCell::Text("Ботинки".into()))]);

        let (accepted, errors) = validate_records(layout, &[rec]);
        assert!(accepted.is_empty());
        assert_eq!(errors, vec!["Row 4: Артикул*: required".to_string()]);
    }

    #[test]
    fn all_field_errors_for_one_record_are_collected() {
        let registry = LayoutRegistry::new();
        let layout = category_layout(&registry);
        let rec = record(
            4,
            &[("Rich-контент JSON", RawCell::Text("{broken".to_string()))],
        );

        let (accepted, errors) = validate_records(layout, &[rec]);
        assert!(accepted.is_empty());
        // Missing required key and the broken JSON both reported.
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("required")));
        assert!(errors.iter().any(|e| e.contains("invalid JSON")));
    }

    #[test]
    fn vendor_code_single_quotes_are_stripped() {
        let registry = LayoutRegistry::new();
        let layout = category_layout(&registry);
        let rec = record(4, &[("Артикул*", RawCell::Text("'A-1'".to_string()))]);

        let (accepted, _) = validate_records(layout, &[rec]);
        assert_eq!(
            accepted[0].values.get("oz_vendor_code"),
            Some(&Value::Str("A-1".to_string()))
        );
    }

    #[test]
    fn optional_soft_failures_become_null_not_rejection() {
        let registry = LayoutRegistry::new();
        let layout = category_layout(&registry);
        let rec = record(
            5,
            &[
                ("Артикул*", RawCell::Text("A-2".to_string())),
                ("Цена, руб.*", RawCell::Text("договорная".to_string())),
                ("Признак 18+", RawCell::Text("возможно".to_string())),
            ],
        );

        let (accepted, errors) = validate_records(layout, &[rec]);
        assert!(errors.is_empty());
        assert_eq!(accepted[0].values.get("oz_actual_price"), Some(&Value::Null));
        assert_eq!(accepted[0].values.get("is_18plus"), Some(&Value::Null));
    }
}
