//! Lazy tables
//!
//! A [`Table`] is an immutable view: a header plus a recipe for producing
//! rows. Every transform wraps its upstream table in a new [`TableSource`]
//! and returns a new `Table`; nothing is computed until [`Table::open`] is
//! called, and every `open` re-runs the whole upstream chain. Use
//! [`Table::materialize`] when a table has to be consumed more than once.
//!
//! File handles and other resources belong to the root source's row iterator,
//! so they are released as soon as the stream is dropped, including when a
//! consumer stops early or bails out with an error.
//!
//! ```no_run
//! use taxitrips_engine::table::{CsvOptions, Table};
//! use taxitrips_engine::convert::as_money;
//!
//! # fn main() -> taxitrips_engine::error::Result<()> {
//! let trips = Table::from_csv("trips.csv", CsvOptions::default())
//!     .cutout(["Shift #"])
//!     .convert("Fare", as_money);
//! let written = trips.to_csv(std::io::stdout())?;
//! # Ok(())
//! # }
//! ```

mod csv_io;
mod record;
mod transform;
mod value;

pub use csv_io::{CsvOptions, CsvSource, HeaderMode, RaggedRows};
pub use record::Record;
pub use value::{Value, DATETIME_FORMAT};

use crate::concat::{ConcatMode, Concatenator};
use crate::error::{ConvertError, Result, TableError};
use crate::fields::{FieldDefinition, FieldInjector};
use std::collections::HashSet;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Row values, positionally aligned to a [`Header`]
pub type Row = Vec<Value>;

/// Boxed row iterator produced by a [`TableSource`]
pub type Rows = Box<dyn Iterator<Item = Result<Row>>>;

/// Ordered, unique field names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    names: Rc<[String]>,
}

impl Header {
    /// Build a header, rejecting duplicate names.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(TableError::DuplicateField(name.clone()));
            }
        }
        Ok(Self {
            names: names.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Like [`Header::position`], but a missing field is a schema error.
    pub fn require(&self, name: &str) -> Result<usize> {
        self.position(name)
            .ok_or_else(|| TableError::FieldNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }
}

/// Header plus the lazily produced rows of one pass over a table.
pub struct RowStream {
    header: Header,
    rows: Rows,
}

impl RowStream {
    pub fn new(header: Header, rows: Rows) -> Self {
        Self { header, rows }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn into_parts(self) -> (Header, Rows) {
        (self.header, self.rows)
    }
}

impl Iterator for RowStream {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }
}

/// Anything that can produce a fresh [`RowStream`] on demand.
pub trait TableSource {
    fn open(&self) -> Result<RowStream>;
}

/// What to do when a value conversion or computed field fails for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Substitute `Null`, count it, keep going
    #[default]
    Lenient,
    /// Abort the run with a row-scoped error
    FailFast,
}

/// Counters shared between a source and whoever wants to read them after
/// iteration. Cloning the `Arc` is how callers keep a handle.
#[derive(Debug, Default)]
pub struct SourceStats {
    rows: AtomicU64,
    malformed: AtomicU64,
    defaulted: AtomicU64,
    truncated: AtomicU64,
}

impl SourceStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn record_row(&self) {
        self.rows.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_defaulted(&self) {
        self.defaulted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_truncated(&self) {
        self.truncated.fetch_add(1, Ordering::Relaxed);
    }

    /// Records read from the underlying source, malformed ones included
    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }

    /// Rows skipped because they could not be read or had the wrong width
    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Values replaced by `Null` after a failed conversion or computation
    pub fn defaulted(&self) -> u64 {
        self.defaulted.load(Ordering::Relaxed)
    }

    /// Rows cut down to the header width before fields were inserted, losing
    /// their trailing values
    pub fn truncated(&self) -> u64 {
        self.truncated.load(Ordering::Relaxed)
    }
}

/// Row-level error handling for `convert` and `add_fields`
#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    pub policy: ErrorPolicy,
    pub stats: Arc<SourceStats>,
}

impl TransformOptions {
    pub fn new(policy: ErrorPolicy) -> Self {
        Self {
            policy,
            stats: Arc::default(),
        }
    }

    pub fn fail_fast() -> Self {
        Self::new(ErrorPolicy::FailFast)
    }

    pub fn with_stats(mut self, stats: Arc<SourceStats>) -> Self {
        self.stats = stats;
        self
    }
}

/// Lazy, immutable header + rows view
#[derive(Clone)]
pub struct Table {
    source: Rc<dyn TableSource>,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table").finish_non_exhaustive()
    }
}

impl Table {
    pub fn new(source: impl TableSource + 'static) -> Self {
        Self {
            source: Rc::new(source),
        }
    }

    /// In-memory table. Rows are not checked against the header width.
    pub fn from_rows<I, S>(header: I, rows: Vec<Row>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self::new(transform::Memory {
            header: Header::new(header)?,
            rows: Rc::new(rows),
        }))
    }

    pub fn from_csv(path: impl Into<PathBuf>, options: CsvOptions) -> Self {
        Self::new(CsvSource::new(path, options))
    }

    /// Expand each glob pattern in order and concatenate every matching file.
    ///
    /// With no match at all the result is an empty table carrying the
    /// override header, or a schema error when no header is known.
    pub fn from_csvs<I, S>(patterns: I, options: CsvOptions) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        csv_io::from_csvs(patterns, options)
    }

    /// Start one pass over the table.
    pub fn open(&self) -> Result<RowStream> {
        self.source.open()
    }

    /// Header of the table. Opens (and immediately drops) a stream.
    pub fn header(&self) -> Result<Header> {
        Ok(self.open()?.header().clone())
    }

    pub fn fieldnames(&self) -> Result<Vec<String>> {
        Ok(self.header()?.names().to_vec())
    }

    /// Keep only `fields`, in the given order.
    pub fn cut<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(transform::Cut {
            upstream: self.clone(),
            fields: fields.into_iter().map(Into::into).collect(),
        })
    }

    /// Drop `fields`; every one of them must exist.
    pub fn cutout<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(transform::Cutout {
            upstream: self.clone(),
            fields: fields.into_iter().map(Into::into).collect(),
        })
    }

    /// Apply `f` to `field` in every row, substituting `Null` on failure.
    pub fn convert<F>(&self, field: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> std::result::Result<Value, ConvertError> + 'static,
    {
        self.convert_with(field, f, TransformOptions::default())
    }

    pub fn convert_with<F>(&self, field: impl Into<String>, f: F, options: TransformOptions) -> Self
    where
        F: Fn(Value) -> std::result::Result<Value, ConvertError> + 'static,
    {
        Self::new(transform::Convert {
            upstream: self.clone(),
            field: field.into(),
            f: Rc::new(f),
            options,
        })
    }

    /// Replace the header. Rows pass through untouched: their width is not
    /// checked against `names`, so callers must keep the two aligned. The
    /// first mismatched row is logged at `warn`.
    pub fn set_header<I, S>(&self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(transform::SetHeader {
            upstream: self.clone(),
            names: names.into_iter().map(Into::into).collect(),
        })
    }

    /// Demote the current header to the first data row and use `names`.
    pub fn push_header<I, S>(&self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(transform::PushHeader {
            upstream: self.clone(),
            names: names.into_iter().map(Into::into).collect(),
        })
    }

    pub fn rename(&self, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(transform::Rename {
            upstream: self.clone(),
            from: from.into(),
            to: to.into(),
        })
    }

    pub fn add_field(&self, field: FieldDefinition) -> Self {
        self.add_fields(vec![field])
    }

    pub fn add_fields(&self, fields: Vec<FieldDefinition>) -> Self {
        self.add_fields_with(fields, TransformOptions::default())
    }

    pub fn add_fields_with(&self, fields: Vec<FieldDefinition>, options: TransformOptions) -> Self {
        Self::new(FieldInjector::new(self.clone(), fields, options))
    }

    /// Append the rows of `others` after this table's rows (lenient mode).
    pub fn concatenate(&self, others: impl IntoIterator<Item = Table>) -> Self {
        let tables = std::iter::once(self.clone()).chain(others).collect();
        Self::concat(tables, ConcatMode::Lenient)
    }

    pub fn concat(tables: Vec<Table>, mode: ConcatMode) -> Self {
        Self::new(Concatenator::new(tables, mode))
    }

    /// Run the chain once and keep the rows in memory.
    pub fn materialize(&self) -> Result<Self> {
        let stream = self.open()?;
        let header = stream.header().clone();
        let rows = stream.collect::<Result<Vec<_>>>()?;
        Ok(Self::new(transform::Memory {
            header,
            rows: Rc::new(rows),
        }))
    }

    /// Log a running count every `interval` rows, then a final total.
    pub fn progress(&self, label: impl Into<String>, interval: u64) -> Self {
        Self::new(transform::Progress {
            upstream: self.clone(),
            label: label.into(),
            interval: interval.max(1),
        })
    }

    /// Number of data rows. Runs the whole chain.
    pub fn count(&self) -> Result<u64> {
        let mut n = 0;
        for row in self.open()? {
            row?;
            n += 1;
        }
        Ok(n)
    }

    /// Write header and rows as CSV, returning the number of rows written.
    pub fn to_csv<W: std::io::Write>(&self, writer: W) -> Result<u64> {
        csv_io::write(self, writer)
    }

    pub fn to_csv_path(&self, path: impl AsRef<std::path::Path>) -> Result<u64> {
        let file = std::fs::File::create(path)?;
        self.to_csv(std::io::BufWriter::new(file))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn trips() -> Table {
        Table::from_rows(
            ["Medallion", "Fare", "Tips"],
            vec![
                vec!["P100".into(), "10.5".into(), "2".into()],
                vec!["P200".into(), "7".into(), "".into()],
            ],
        )
        .unwrap()
    }

    fn collect(table: &Table) -> (Vec<String>, Vec<Vec<String>>) {
        let stream = table.open().unwrap();
        let header = stream.header().names().to_vec();
        let rows = stream
            .map(|r| r.unwrap().iter().map(Value::to_text).collect())
            .collect();
        (header, rows)
    }

    #[test]
    fn test_duplicate_header_rejected() {
        let err = Header::new(["a", "b", "a"]).unwrap_err();
        assert!(matches!(err, TableError::DuplicateField(name) if name == "a"));
    }

    #[test]
    fn test_cut_reorders() {
        let (header, rows) = collect(&trips().cut(["Tips", "Medallion"]));
        assert_eq!(header, ["Tips", "Medallion"]);
        assert_eq!(rows[0], ["2", "P100"]);
    }

    #[test]
    fn test_cutout_and_rename() {
        let table = trips().cutout(["Tips"]).rename("Fare", "Fare Amount");
        let (header, rows) = collect(&table);
        assert_eq!(header, ["Medallion", "Fare Amount"]);
        assert_eq!(rows[1], ["P200", "7"]);
    }

    #[test]
    fn test_missing_field_is_fatal_at_open() {
        let table = trips().convert("Tolls", Ok);
        assert!(matches!(table.open(), Err(TableError::FieldNotFound(f)) if f == "Tolls"));

        let table = trips().cutout(["Tolls"]);
        assert!(matches!(table.open(), Err(TableError::FieldNotFound(_))));
    }

    #[test]
    fn test_convert_lenient_defaults_to_null() {
        let stats = SourceStats::new();
        let table = trips().convert_with(
            "Tips",
            |v| {
                v.as_f64()
                    .map(|x| Value::Float(x * 2.0))
                    .ok_or_else(|| ConvertError::new("not a number"))
            },
            TransformOptions::default().with_stats(stats.clone()),
        );
        let (_, rows) = collect(&table);
        assert_eq!(rows[0][2], "4");
        assert_eq!(rows[1][2], "");
        assert_eq!(stats.defaulted(), 1);
    }

    #[test]
    fn test_convert_fail_fast_reports_row() {
        let table = trips().convert_with(
            "Tips",
            |v| {
                v.as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| ConvertError::new("not a number"))
            },
            TransformOptions::fail_fast(),
        );
        let err = table.open().unwrap().find_map(|r| r.err()).unwrap();
        assert!(matches!(err, TableError::Conversion { row: 2, .. }));
    }

    #[test]
    fn test_set_header_passes_rows_through() {
        let (header, rows) = collect(&trips().set_header(["id", "amount", "tip"]));
        assert_eq!(header, ["id", "amount", "tip"]);
        assert_eq!(rows[0], ["P100", "10.5", "2"]);

        // Narrower header: rows keep their original width
        let (header, rows) = collect(&trips().set_header(["id", "amount"]));
        assert_eq!(header, ["id", "amount"]);
        assert_eq!(rows[1], ["P200", "7", ""]);
    }

    #[test]
    fn test_push_header_demotes_old_header() {
        let table = Table::from_rows(["1", "2"], vec![vec!["3".into(), "4".into()]])
            .unwrap()
            .push_header(["a", "b"]);
        let (header, rows) = collect(&table);
        assert_eq!(header, ["a", "b"]);
        assert_eq!(rows, [["1", "2"], ["3", "4"]]);
    }

    #[test]
    fn test_materialize_runs_upstream_once() {
        use std::cell::Cell;

        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        let table = trips().convert("Fare", move |v| {
            seen.set(seen.get() + 1);
            Ok(v)
        });

        table.count().unwrap();
        table.count().unwrap();
        assert_eq!(calls.get(), 4, "unmaterialized tables recompute");

        let cached = table.materialize().unwrap();
        cached.count().unwrap();
        cached.count().unwrap();
        assert_eq!(calls.get(), 6);
    }

    #[test]
    fn test_progress_is_transparent() {
        let table = trips().progress("trips", 1);
        assert_eq!(table.count().unwrap(), 2);
        assert_eq!(table.fieldnames().unwrap(), ["Medallion", "Fare", "Tips"]);
    }
}
