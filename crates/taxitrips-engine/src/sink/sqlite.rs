//! SQLite backing store

use super::{BackingStore, MergeOutcome, SurrogateKeyStore, UpsertTarget};
use crate::error::StoreError;
use crate::table::{Row, Value, DATETIME_FORMAT};
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Str(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Int(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::DateTime(dt) => {
                ToSqlOutput::Owned(SqlValue::Text(dt.format(DATETIME_FORMAT).to_string()))
            }
            Value::Region(r) => ToSqlOutput::Owned(SqlValue::Integer(r.id)),
        })
    }
}

/// Quote an SQL identifier, doubling embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQLite connection implementing the upsert and surrogate-key contracts.
///
/// Work is grouped in explicit transactions: the first write after a commit
/// opens one. Dropping the store with a transaction still open rolls it back.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::invalid_target(format!("cannot create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "Opened SQLite store");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Create `target`'s table (untyped columns) and a unique index over its
    /// identity columns, if they do not exist.
    pub fn ensure_table(&self, target: &UpsertTarget) -> Result<(), StoreError> {
        let table = quote_ident(target.table());
        let columns = target
            .columns()
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let identity = target
            .identity()
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let index = quote_ident(&format!("{}_identity", target.table()));
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} ({columns});
             CREATE UNIQUE INDEX IF NOT EXISTS {index} ON {table} ({identity});"
        ))?;
        Ok(())
    }

    /// Number of rows in `table`
    pub fn count_rows(&self, table: &str) -> Result<u64, StoreError> {
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    fn begin(&self) -> Result<(), StoreError> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    fn stage(&self, target: &UpsertTarget, rows: &[Row]) -> Result<String, StoreError> {
        let stage = quote_ident(&format!("stage_{}", target.table()));
        let columns = column_list(target.columns(), None);
        self.conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS temp.{stage};
             CREATE TEMP TABLE {stage} ({columns});"
        ))?;

        let placeholders = (1..=target.columns().len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = self
            .conn
            .prepare(&format!("INSERT INTO temp.{stage} ({columns}) VALUES ({placeholders})"))?;
        for row in rows {
            stmt.execute(params_from_iter(row.iter()))?;
        }
        Ok(stage)
    }
}

fn column_list(columns: &[String], alias: Option<&str>) -> String {
    columns
        .iter()
        .map(|c| match alias {
            Some(a) => format!("{a}.{}", quote_ident(c)),
            None => quote_ident(c),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn identity_match(target: &UpsertTarget, left: &str, right: &str) -> String {
    target
        .identity()
        .iter()
        .map(|c| {
            let c = quote_ident(c);
            format!("{left}.{c} = {right}.{c}")
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

impl BackingStore for SqliteStore {
    fn merge_batch(&mut self, target: &UpsertTarget, rows: &[Row]) -> Result<MergeOutcome, StoreError> {
        if rows.is_empty() {
            return Ok(MergeOutcome::default());
        }
        self.begin()?;
        let stage = self.stage(target, rows)?;
        let table = quote_ident(target.table());
        let matches = identity_match(target, &table, "s");

        let assignments: Vec<String> = target
            .columns()
            .iter()
            .filter(|c| !target.is_identity(c))
            .map(|c| {
                let c = quote_ident(c);
                format!("{c} = s.{c}")
            })
            .collect();
        let updated = if assignments.is_empty() {
            0
        } else {
            self.conn.execute(
                &format!(
                    "UPDATE {table} SET {} FROM temp.{stage} AS s WHERE {matches}",
                    assignments.join(", ")
                ),
                [],
            )?
        };

        let inserted = self.conn.execute(
            &format!(
                "INSERT INTO {table} ({}) SELECT {} FROM temp.{stage} AS s
                 WHERE NOT EXISTS (SELECT 1 FROM {table} WHERE {matches})",
                column_list(target.columns(), None),
                column_list(target.columns(), Some("s")),
            ),
            [],
        )?;

        debug!(table = target.table(), rows = rows.len(), updated, inserted, "Merged batch");
        Ok(MergeOutcome { updated, inserted })
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}

impl SurrogateKeyStore for SqliteStore {
    fn ensure_mapping_table(&mut self, ids_table: &str, column: &str) -> Result<(), StoreError> {
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                {} TEXT NOT NULL UNIQUE
            )",
            quote_ident(ids_table),
            quote_ident(column)
        ))?;
        Ok(())
    }

    fn register_unseen(&mut self, source_table: &str, column: &str, ids_table: &str) -> Result<usize, StoreError> {
        self.begin()?;
        let (src, ids, col) = (quote_ident(source_table), quote_ident(ids_table), quote_ident(column));
        let added = self.conn.execute(
            &format!(
                "INSERT INTO {ids} ({col})
                 SELECT TRIM(ts.{col}) AS raw FROM {src} AS ts
                 LEFT JOIN {ids} AS known ON TRIM(ts.{col}) = known.{col}
                 WHERE known.id IS NULL AND ts.{col} IS NOT NULL AND TRIM(ts.{col}) <> ''
                 GROUP BY raw
                 ORDER BY raw"
            ),
            [],
        )?;
        info!(ids_table, column, added, "Updated anonymization table");
        Ok(added)
    }

    fn load_mapping(&mut self, ids_table: &str, column: &str) -> Result<HashMap<String, i64>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, CAST({} AS TEXT) FROM {}",
            quote_ident(column),
            quote_ident(ids_table)
        ))?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i64>(0)?)))?;
        let mapping = rows.collect::<Result<HashMap<_, _>, _>>()?;
        debug!(ids_table, entries = mapping.len(), "Loaded anonymization mapping");
        Ok(mapping)
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        if !self.conn.is_autocommit() {
            warn!("Closing store with an open transaction, rolling back");
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "Rollback on close failed");
            }
        }
    }
}

/// Open a store, run `f`, then commit (on success) or roll back (on error).
/// The connection is closed when this returns either way.
pub fn with_store<T, E, O, F>(open: O, f: F) -> Result<T, E>
where
    O: FnOnce() -> Result<SqliteStore, StoreError>,
    F: FnOnce(&mut SqliteStore) -> Result<T, E>,
    E: From<StoreError>,
{
    let mut store = open()?;
    match f(&mut store) {
        Ok(value) => {
            store.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = store.rollback() {
                warn!(error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}
