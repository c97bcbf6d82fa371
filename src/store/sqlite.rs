//! SQLite-backed [`ReportStore`].
//!
//! Dataset tables are derived from the layout registry: one table per report
//! type, one column per canonical field, with SQLite affinity chosen by field
//! kind. Replace-all persistence runs DELETE + bulk INSERT inside a single
//! transaction; the connection carries a busy timeout so a wedged database
//! surfaces as a failed run instead of hanging the pipeline.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection};

use crate::error::{IngestError, IngestResult};
use crate::layout::{FieldKind, ReportLayout, ReportType};
use crate::types::{ValidatedRecord, Value};

use super::{ReportStore, RunRecord, RunUpdate};

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// SQLite implementation of the store/audit interface.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at a filesystem path.
    pub fn open(path: impl AsRef<Path>) -> IngestResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory store (tests).
    pub fn open_in_memory() -> IngestResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> IngestResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS report_uploads (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                report_type   TEXT NOT NULL,
                file_name     TEXT NOT NULL,
                file_size     INTEGER NOT NULL,
                status        TEXT NOT NULL,
                error_message TEXT,
                records_count INTEGER,
                created_at    TEXT NOT NULL,
                completed_at  TEXT
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> IngestResult<T>) -> IngestResult<T> {
        let mut guard = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    fn ensure_dataset_table(conn: &Connection, layout: &ReportLayout) -> IngestResult<()> {
        let columns: Vec<String> = layout
            .merged_fields()
            .iter()
            .map(|rule| format!("\"{}\" {}", rule.canonical, column_affinity(rule.kind)))
            .collect();
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            layout.report_type.as_str(),
            columns.join(", ")
        );
        conn.execute(&ddl, [])?;
        Ok(())
    }
}

fn column_affinity(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Str | FieldKind::Json => "TEXT",
        // BigInt is TEXT to dodge the i64 column ceiling.
        FieldKind::BigInt => "TEXT",
        FieldKind::Integer | FieldKind::Boolean => "INTEGER",
        FieldKind::Decimal => "REAL",
    }
}

fn to_sql(value: &Value) -> IngestResult<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Str(s) => SqlValue::Text(s.clone()),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Decimal(f) => SqlValue::Real(*f),
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::BigInt(v) => SqlValue::Text(v.to_string()),
        Value::Json(j) => SqlValue::Text(serde_json::to_string(j)?),
    })
}

fn from_sql(kind: FieldKind, value: SqlValue) -> IngestResult<Value> {
    Ok(match (kind, value) {
        (_, SqlValue::Null) => Value::Null,
        (FieldKind::Str, SqlValue::Text(s)) => Value::Str(s),
        (FieldKind::Json, SqlValue::Text(s)) => Value::Json(serde_json::from_str(&s)?),
        (FieldKind::BigInt, SqlValue::Text(s)) => {
            s.parse::<i128>().map(Value::BigInt).unwrap_or(Value::Null)
        }
        (FieldKind::Integer, SqlValue::Integer(i)) => Value::Int(i),
        (FieldKind::Boolean, SqlValue::Integer(i)) => Value::Bool(i != 0),
        (FieldKind::Decimal, SqlValue::Real(f)) => Value::Decimal(f),
        (FieldKind::Decimal, SqlValue::Integer(i)) => Value::Decimal(i as f64),
        (kind, other) => {
            return Err(IngestError::ParseFailed(format!(
                "unexpected stored value {other:?} for {kind:?} column"
            )))
        }
    })
}

impl ReportStore for SqliteStore {
    fn create_run(
        &self,
        report_type: ReportType,
        file_name: &str,
        file_size: u64,
    ) -> IngestResult<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO report_uploads (report_type, file_name, file_size, status, created_at)
                 VALUES (?1, ?2, ?3, 'processing', ?4)",
                params![
                    report_type.as_str(),
                    file_name,
                    file_size as i64,
                    Utc::now().to_rfc3339()
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn update_run(&self, run_id: i64, update: RunUpdate) -> IngestResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE report_uploads
                 SET status = ?1, error_message = ?2, records_count = ?3, completed_at = ?4
                 WHERE id = ?5",
                params![
                    update.status.as_str(),
                    update.error_message,
                    update.records_count.map(|c| c as i64),
                    Utc::now().to_rfc3339(),
                    run_id
                ],
            )?;
            Ok(())
        })
    }

    fn persist(&self, layout: &ReportLayout, records: &[ValidatedRecord]) -> IngestResult<usize> {
        self.with_conn(|conn| {
            Self::ensure_dataset_table(conn, layout)?;

            let fields = layout.merged_fields();
            let table = layout.report_type.as_str();
            let column_list = fields
                .iter()
                .map(|r| format!("\"{}\"", r.canonical))
                .collect::<Vec<_>>()
                .join(", ");
            let placeholders = (1..=fields.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let insert_sql =
                format!("INSERT INTO \"{table}\" ({column_list}) VALUES ({placeholders})");

            // One transaction for the whole replace: readers see either the
            // old dataset or the new one, never the gap between.
            let tx = conn.transaction()?;
            tx.execute(&format!("DELETE FROM \"{table}\""), [])?;
            {
                let mut stmt = tx.prepare(&insert_sql)?;
                for record in records {
                    let row: Vec<SqlValue> = fields
                        .iter()
                        .map(|rule| {
                            record
                                .values
                                .get(rule.canonical)
                                .map_or(Ok(SqlValue::Null), to_sql)
                        })
                        .collect::<IngestResult<_>>()?;
                    stmt.execute(rusqlite::params_from_iter(row))?;
                }
            }
            tx.commit()?;
            Ok(records.len())
        })
    }

    fn list_recent_runs(&self, limit: usize) -> IngestResult<Vec<RunRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, report_type, file_name, file_size, status, error_message,
                        records_count, created_at, completed_at
                 FROM report_uploads ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    report_type: row.get(1)?,
                    file_name: row.get(2)?,
                    file_size: row.get::<_, i64>(3)? as u64,
                    status: row.get(4)?,
                    error_message: row.get(5)?,
                    records_count: row.get::<_, Option<i64>>(6)?.map(|c| c as usize),
                    created_at: parse_ts(&row.get::<_, String>(7)?),
                    completed_at: row.get::<_, Option<String>>(8)?.map(|s| parse_ts(&s)),
                })
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    fn dataset(&self, layout: &ReportLayout) -> IngestResult<Vec<ValidatedRecord>> {
        self.with_conn(|conn| {
            Self::ensure_dataset_table(conn, layout)?;

            let fields = layout.merged_fields();
            let column_list = fields
                .iter()
                .map(|r| format!("\"{}\"", r.canonical))
                .collect::<Vec<_>>()
                .join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT rowid, {column_list} FROM \"{}\"",
                layout.report_type.as_str()
            ))?;

            let mut out = Vec::new();
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let rowid: i64 = row.get(0)?;
                let mut record = ValidatedRecord {
                    row: rowid as usize,
                    values: Default::default(),
                };
                for (i, rule) in fields.iter().enumerate() {
                    let raw: SqlValue = row.get(i + 1)?;
                    record
                        .values
                        .insert(rule.canonical.to_string(), from_sql(rule.kind, raw)?);
                }
                out.push(record);
            }
            Ok(out)
        })
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutRegistry;
    use crate::store::RunStatus;
    use std::collections::BTreeMap;

    fn wb_record(sku: i128, stock: Option<i64>) -> ValidatedRecord {
        let mut values = BTreeMap::new();
        values.insert("wb_sku".to_string(), Value::BigInt(sku));
        values.insert(
            "wb_fbo_stock".to_string(),
            stock.map_or(Value::Null, Value::Int),
        );
        ValidatedRecord { row: 2, values }
    }

    #[test]
    fn persist_then_read_back_round_trips_by_key() {
        let registry = LayoutRegistry::new();
        let layout = registry.resolve(ReportType::WbPrices, "xlsx").unwrap();
        let store = SqliteStore::open_in_memory().unwrap();

        let records = vec![wb_record(111, Some(5)), wb_record(222, None)];
        let count = store.persist(layout, &records).unwrap();
        assert_eq!(count, 2);

        let mut back = store.dataset(layout).unwrap();
        back.sort_by_key(|r| match r.values.get("wb_sku") {
            Some(Value::BigInt(v)) => *v,
            _ => 0,
        });
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].values.get("wb_sku"), Some(&Value::BigInt(111)));
        assert_eq!(back[0].values.get("wb_fbo_stock"), Some(&Value::Int(5)));
        assert_eq!(back[1].values.get("wb_fbo_stock"), Some(&Value::Null));
    }

    #[test]
    fn replace_all_clears_prior_dataset() {
        let registry = LayoutRegistry::new();
        let layout = registry.resolve(ReportType::WbPrices, "xlsx").unwrap();
        let store = SqliteStore::open_in_memory().unwrap();

        store.persist(layout, &[wb_record(1, None)]).unwrap();
        store.persist(layout, &[wb_record(2, None)]).unwrap();

        let back = store.dataset(layout).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].values.get("wb_sku"), Some(&Value::BigInt(2)));
    }

    #[test]
    fn persisting_empty_set_clears_and_is_idempotent() {
        let registry = LayoutRegistry::new();
        let layout = registry.resolve(ReportType::WbPrices, "xlsx").unwrap();
        let store = SqliteStore::open_in_memory().unwrap();

        store.persist(layout, &[wb_record(1, Some(3))]).unwrap();
        assert_eq!(store.persist(layout, &[]).unwrap(), 0);
        assert!(store.dataset(layout).unwrap().is_empty());
        assert_eq!(store.persist(layout, &[]).unwrap(), 0);
        assert!(store.dataset(layout).unwrap().is_empty());
    }

    #[test]
    fn run_lifecycle_is_recorded() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store
            .create_run(ReportType::OzonOrders, "orders.csv", 1024)
            .unwrap();
        store
            .update_run(
                id,
                RunUpdate {
                    status: RunStatus::Completed,
                    error_message: None,
                    records_count: Some(7),
                },
            )
            .unwrap();

        let runs = store.list_recent_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, id);
        assert_eq!(runs[0].status, "completed");
        assert_eq!(runs[0].records_count, Some(7));
        assert!(runs[0].completed_at.is_some());
    }
}
