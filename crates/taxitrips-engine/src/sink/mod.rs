//! Chunked, idempotent upserts into a backing store
//!
//! [`ChunkedUpsertSink`] buffers a table's rows into fixed-size chunks and
//! hands each chunk to a [`BackingStore`] as one set-based merge: rows whose
//! identity columns match an existing row update it, all others are inserted.
//! Every chunk is committed on its own, so a failure part-way through leaves
//! earlier chunks in place; re-running over the same input converges to the
//! same final state.
//!
//! Rows with a missing (null or empty) identity value can never match an
//! existing row, and inserting them would duplicate them on every re-run, so
//! the sink skips and counts them instead.

mod sqlite;

pub use sqlite::{with_store, SqliteStore};

use crate::error::StoreError;
use crate::table::{Row, Table};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Default number of rows merged per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// Largest chunk size accepted
pub const MAX_CHUNK_SIZE: usize = 1_000_000;

/// Destination table, its ordered columns and the identity subset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertTarget {
    table: String,
    columns: Vec<String>,
    identity: Vec<String>,
}

impl UpsertTarget {
    pub fn new<C, I, S, T>(table: impl Into<String>, columns: C, identity: I) -> Result<Self, StoreError>
    where
        C: IntoIterator<Item = S>,
        I: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        let table = table.into();
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let identity: Vec<String> = identity.into_iter().map(Into::into).collect();

        if table.is_empty() {
            return Err(StoreError::invalid_target("table name is empty"));
        }
        if columns.is_empty() {
            return Err(StoreError::invalid_target("no columns"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(StoreError::invalid_target(format!("duplicate column {dup}")));
        }
        if identity.is_empty() {
            return Err(StoreError::invalid_target("no identity columns"));
        }
        if let Some(missing) = identity.iter().find(|c| !seen.contains(c.as_str())) {
            return Err(StoreError::invalid_target(format!(
                "identity column {missing} is not one of the columns"
            )));
        }

        Ok(Self {
            table,
            columns,
            identity,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn identity(&self) -> &[String] {
        &self.identity
    }

    pub fn is_identity(&self, column: &str) -> bool {
        self.identity.iter().any(|c| c == column)
    }

    /// Positions of the identity columns within `columns`
    pub fn identity_indices(&self) -> Vec<usize> {
        self.identity
            .iter()
            .filter_map(|id| self.columns.iter().position(|c| c == id))
            .collect()
    }
}

/// Rows touched by one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub updated: usize,
    pub inserted: usize,
}

/// Connection to something that can merge row batches.
///
/// `merge_batch` may open a transaction; `commit` makes everything merged
/// since the last commit durable and `rollback` discards it.
pub trait BackingStore {
    fn merge_batch(&mut self, target: &UpsertTarget, rows: &[Row]) -> Result<MergeOutcome, StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;

    fn rollback(&mut self) -> Result<(), StoreError>;
}

/// Append-only raw value → surrogate ID tables used for anonymization
pub trait SurrogateKeyStore {
    /// Create the mapping table if it does not exist yet.
    fn ensure_mapping_table(&mut self, ids_table: &str, column: &str) -> Result<(), StoreError>;

    /// Assign IDs to every non-missing value of `source_table.column` not yet
    /// present in `ids_table`. Values are stored trimmed, the same way
    /// lookups normalize them. Returns the number of new IDs.
    fn register_unseen(&mut self, source_table: &str, column: &str, ids_table: &str) -> Result<usize, StoreError>;

    /// Full raw value → ID mapping
    fn load_mapping(&mut self, ids_table: &str, column: &str) -> Result<HashMap<String, i64>, StoreError>;
}

/// What a sink run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub rows_read: u64,
    pub chunks: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped_missing_identity: u64,
    /// Rows replaced by a later row with the same identity in the same chunk
    pub superseded_in_chunk: u64,
}

/// Buffers rows into chunks and merges each chunk in its own transaction.
#[derive(Debug, Clone, Copy)]
pub struct ChunkedUpsertSink {
    chunk_size: usize,
}

impl Default for ChunkedUpsertSink {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ChunkedUpsertSink {
    pub fn new(chunk_size: usize) -> Result<Self, StoreError> {
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(StoreError::invalid_target(format!(
                "chunk size must be between 1 and {MAX_CHUNK_SIZE}, got {chunk_size}"
            )));
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Merge every row of `table` into `store`.
    ///
    /// The table must contain all of the target's columns (extra columns are
    /// ignored). On failure the open chunk is rolled back and the error is
    /// returned; chunks committed before it stay committed.
    pub fn run<S>(&self, table: &Table, target: &UpsertTarget, store: &mut S) -> Result<UpsertSummary, StoreError>
    where
        S: BackingStore + ?Sized,
    {
        match self.run_chunks(table, target, store) {
            Ok(summary) => Ok(summary),
            Err(e) => {
                if let Err(rollback) = store.rollback() {
                    warn!(error = %rollback, "Rollback after failed chunk also failed");
                }
                Err(e)
            }
        }
    }

    fn run_chunks<S>(&self, table: &Table, target: &UpsertTarget, store: &mut S) -> Result<UpsertSummary, StoreError>
    where
        S: BackingStore + ?Sized,
    {
        let stream = table.open()?;
        let indices = target
            .columns()
            .iter()
            .map(|c| stream.header().require(c))
            .collect::<Result<Vec<_>, _>>()?;
        let identity = target.identity_indices();

        let mut summary = UpsertSummary::default();
        let mut chunk = Chunk::new(self.chunk_size);

        info!(
            table = target.table(),
            chunk_size = self.chunk_size,
            identity = ?target.identity(),
            "Starting upsert"
        );

        for row in stream {
            let row = row?;
            summary.rows_read += 1;
            let projected: Row = indices
                .iter()
                .map(|&i| row.get(i).cloned().unwrap_or_default())
                .collect();

            if identity.iter().any(|&i| projected[i].is_missing()) {
                summary.skipped_missing_identity += 1;
                debug!(row = summary.rows_read, "Skipping row with missing identity value");
                continue;
            }

            let key: Vec<String> = identity.iter().map(|&i| projected[i].to_text()).collect();
            if chunk.push(key, projected) {
                summary.superseded_in_chunk += 1;
            }
            if chunk.len() >= self.chunk_size {
                self.flush(&mut chunk, target, store, &mut summary)?;
            }
        }
        if !chunk.is_empty() {
            self.flush(&mut chunk, target, store, &mut summary)?;
        }

        if summary.skipped_missing_identity > 0 {
            warn!(
                skipped = summary.skipped_missing_identity,
                "Rows with missing identity values were not uploaded"
            );
        }
        info!(
            table = target.table(),
            rows = summary.rows_read,
            chunks = summary.chunks,
            inserted = summary.inserted,
            updated = summary.updated,
            "Upsert complete"
        );
        Ok(summary)
    }

    fn flush<S>(
        &self,
        chunk: &mut Chunk,
        target: &UpsertTarget,
        store: &mut S,
        summary: &mut UpsertSummary,
    ) -> Result<(), StoreError>
    where
        S: BackingStore + ?Sized,
    {
        let rows = chunk.take();
        let outcome = store.merge_batch(target, &rows)?;
        store.commit()?;

        summary.chunks += 1;
        summary.inserted += outcome.inserted as u64;
        summary.updated += outcome.updated as u64;
        info!(
            "Committed chunk {} ({} rows, {} inserted, {} updated, {} read so far)",
            summary.chunks,
            rows.len(),
            outcome.inserted,
            outcome.updated,
            summary.rows_read
        );
        Ok(())
    }
}

/// Pending rows, deduplicated by identity key. A later row replaces an
/// earlier one in place.
struct Chunk {
    rows: Vec<Row>,
    positions: HashMap<Vec<String>, usize>,
}

impl Chunk {
    fn new(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity.min(8192)),
            positions: HashMap::new(),
        }
    }

    /// Returns true when the row superseded a pending one.
    fn push(&mut self, key: Vec<String>, row: Row) -> bool {
        match self.positions.get(&key) {
            Some(&i) => {
                self.rows[i] = row;
                true
            }
            None => {
                self.positions.insert(key, self.rows.len());
                self.rows.push(row);
                false
            }
        }
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn take(&mut self) -> Vec<Row> {
        self.positions.clear();
        std::mem::take(&mut self.rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::table::Value;

    /// In-memory store recording what it was asked to do
    #[derive(Default)]
    struct RecordingStore {
        committed: HashMap<Vec<String>, Row>,
        pending: Vec<Row>,
        batches: Vec<usize>,
        fail_on_batch: Option<usize>,
    }

    impl BackingStore for RecordingStore {
        fn merge_batch(&mut self, _: &UpsertTarget, rows: &[Row]) -> Result<MergeOutcome, StoreError> {
            if self.fail_on_batch == Some(self.batches.len()) {
                return Err(StoreError::invalid_target("connection lost"));
            }
            self.batches.push(rows.len());
            self.pending.extend_from_slice(rows);
            Ok(MergeOutcome {
                updated: 0,
                inserted: rows.len(),
            })
        }

        fn commit(&mut self) -> Result<(), StoreError> {
            for row in self.pending.drain(..) {
                self.committed.insert(vec![row[0].to_text()], row);
            }
            Ok(())
        }

        fn rollback(&mut self) -> Result<(), StoreError> {
            self.pending.clear();
            Ok(())
        }
    }

    fn trips(n: usize) -> Table {
        let rows = (0..n)
            .map(|i| vec![Value::from(format!("P{i}")), Value::from(format!("{i}.00"))])
            .collect();
        Table::from_rows(["Medallion", "Fare"], rows).unwrap()
    }

    fn target() -> UpsertTarget {
        UpsertTarget::new("taxi_trips", ["Medallion", "Fare"], ["Medallion"]).unwrap()
    }

    #[test]
    fn test_target_validation() {
        assert!(UpsertTarget::new("t", ["a", "a"], ["a"]).is_err());
        assert!(UpsertTarget::new("t", ["a"], Vec::<String>::new()).is_err());
        assert!(UpsertTarget::new("t", ["a"], ["b"]).is_err());
        assert!(UpsertTarget::new("", ["a"], ["a"]).is_err());
    }

    #[test]
    fn test_chunk_size_bounds() {
        assert!(ChunkedUpsertSink::new(0).is_err());
        assert!(ChunkedUpsertSink::new(MAX_CHUNK_SIZE + 1).is_err());
        assert_eq!(ChunkedUpsertSink::default().chunk_size(), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_rows_are_chunked() {
        let mut store = RecordingStore::default();
        let summary = ChunkedUpsertSink::new(2)
            .unwrap()
            .run(&trips(5), &target(), &mut store)
            .unwrap();
        assert_eq!(store.batches, [2, 2, 1]);
        assert_eq!(summary.chunks, 3);
        assert_eq!(summary.inserted, 5);
        assert_eq!(store.committed.len(), 5);
    }

    #[test]
    fn test_failure_keeps_prior_chunks() {
        let mut store = RecordingStore {
            fail_on_batch: Some(1),
            ..Default::default()
        };
        let err = ChunkedUpsertSink::new(2)
            .unwrap()
            .run(&trips(5), &target(), &mut store);
        assert!(err.is_err());
        assert_eq!(store.committed.len(), 2);
        assert!(store.pending.is_empty());
    }

    #[test]
    fn test_missing_identity_and_duplicates() {
        let table = Table::from_rows(
            ["Medallion", "Fare", "Extra"],
            vec![
                vec!["P1".into(), "1.00".into(), "x".into()],
                vec!["".into(), "2.00".into(), "x".into()],
                vec![Value::Null, "3.00".into(), "x".into()],
                vec!["P1".into(), "4.00".into(), "x".into()],
            ],
        )
        .unwrap();
        let mut store = RecordingStore::default();
        let summary = ChunkedUpsertSink::default()
            .run(&table, &target(), &mut store)
            .unwrap();

        assert_eq!(summary.rows_read, 4);
        assert_eq!(summary.skipped_missing_identity, 2);
        assert_eq!(summary.superseded_in_chunk, 1);
        assert_eq!(store.batches, [1]);
        assert_eq!(store.committed[&vec!["P1".to_string()]][1], Value::from("4.00"));
    }

    #[test]
    fn test_missing_target_column() {
        let table = Table::from_rows(["Fare"], vec![]).unwrap();
        let mut store = RecordingStore::default();
        let err = ChunkedUpsertSink::default()
            .run(&table, &target(), &mut store)
            .unwrap_err();
        assert!(matches!(err, StoreError::Table(_)));
    }
}
