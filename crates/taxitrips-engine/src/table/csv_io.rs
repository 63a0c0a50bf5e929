//! CSV sources and sinks

use super::{Header, Row, RowStream, SourceStats, Table, TableSource, Value};
use crate::concat::ConcatMode;
use crate::error::{Result, TableError};
use csv::{StringRecord, StringRecordsIntoIter};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a CSV source's header comes from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HeaderMode {
    /// First record of the file
    #[default]
    FromFile,
    /// Read and discard the file's header, use these names instead
    Replace(Vec<String>),
    /// The file has no header row; use these names
    Push(Vec<String>),
}

/// Handling of records whose width differs from the header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RaggedRows {
    /// Skip and count as malformed
    #[default]
    Skip,
    /// Pass through unchanged for a later transform to pad
    Pass,
}

#[derive(Debug, Clone, Default)]
pub struct CsvOptions {
    pub header: HeaderMode,
    pub ragged: RaggedRows,
    pub stats: Arc<SourceStats>,
}

impl CsvOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, header: HeaderMode) -> Self {
        self.header = header;
        self
    }

    /// Shorthand for [`HeaderMode::Replace`]
    pub fn fieldnames<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.header(HeaderMode::Replace(names.into_iter().map(Into::into).collect()))
    }

    pub fn ragged(mut self, ragged: RaggedRows) -> Self {
        self.ragged = ragged;
        self
    }

    pub fn stats(mut self, stats: Arc<SourceStats>) -> Self {
        self.stats = stats;
        self
    }

    fn override_header(&self) -> Option<&[String]> {
        match &self.header {
            HeaderMode::FromFile => None,
            HeaderMode::Replace(names) | HeaderMode::Push(names) => Some(names),
        }
    }
}

/// One CSV file. The file is opened anew on every pass.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    options: CsvOptions,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>, options: CsvOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }
}

impl TableSource for CsvSource {
    fn open(&self) -> Result<RowStream> {
        let file = File::open(&self.path)?;
        let mut records = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file)
            .into_records();

        let header = match &self.options.header {
            HeaderMode::FromFile => match records.next().transpose()? {
                Some(first) => Header::new(first.iter())?,
                None => Header::new(Vec::<String>::new())?,
            },
            HeaderMode::Replace(names) => {
                records.next().transpose()?;
                Header::new(names.iter().cloned())?
            }
            HeaderMode::Push(names) => Header::new(names.iter().cloned())?,
        };
        debug!(path = %self.path.display(), fields = header.len(), "Opened CSV source");

        let rows = CsvRows {
            records,
            width: header.len(),
            ragged: self.options.ragged,
            stats: self.options.stats.clone(),
            path: self.path.clone(),
        };
        Ok(RowStream::new(header, Box::new(rows)))
    }
}

struct CsvRows {
    records: StringRecordsIntoIter<File>,
    width: usize,
    ragged: RaggedRows,
    stats: Arc<SourceStats>,
    path: PathBuf,
}

impl CsvRows {
    fn line(record: &StringRecord) -> u64 {
        record.position().map_or(0, |p| p.line())
    }
}

impl Iterator for CsvRows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.records.next()? {
                Ok(record) => {
                    self.stats.record_row();
                    if record.len() != self.width && self.ragged == RaggedRows::Skip {
                        self.stats.record_malformed();
                        warn!(
                            path = %self.path.display(),
                            line = Self::line(&record),
                            expected = self.width,
                            found = record.len(),
                            "Skipping malformed row"
                        );
                        continue;
                    }
                    return Some(Ok(record.iter().map(Value::from).collect()));
                }
                Err(e) if e.is_io_error() => return Some(Err(TableError::Csv(e))),
                Err(e) => {
                    self.stats.record_row();
                    self.stats.record_malformed();
                    warn!(path = %self.path.display(), error = %e, "Skipping unreadable row");
                }
            }
        }
    }
}

pub(super) fn from_csvs<I, S>(patterns: I, options: CsvOptions) -> Result<Table>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tables = Vec::new();
    let mut searched = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        searched.push(pattern.to_string());
        for entry in glob::glob(pattern)? {
            let path = entry.map_err(glob::GlobError::into_error)?;
            debug!(path = %path.display(), "Matched input file");
            tables.push(Table::from_csv(path, options.clone()));
        }
    }

    if tables.is_empty() {
        warn!(patterns = ?searched, "No input files matched");
        return match options.override_header() {
            Some(names) => Table::from_rows(names.iter().cloned(), Vec::new()),
            None => Err(TableError::schema_mismatch(format!(
                "no files matched {searched:?} and no header was given"
            ))),
        };
    }
    Ok(Table::concat(tables, ConcatMode::Lenient))
}

pub(super) fn write<W: std::io::Write>(table: &Table, writer: W) -> Result<u64> {
    let stream = table.open()?;
    let mut out = csv::WriterBuilder::new().flexible(true).from_writer(writer);
    out.write_record(stream.header().iter())?;

    let mut written = 0;
    for row in stream {
        let row = row?;
        out.write_record(row.iter().map(Value::to_text))?;
        written += 1;
    }
    out.flush()?;
    Ok(written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_header_from_file_and_malformed_rows() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "cmt.csv",
            "Medallion,Fare\nP1,\"1,000.00\"\nP2\nP3,4.00\n",
        );
        let stats = SourceStats::new();
        let table = Table::from_csv(&path, CsvOptions::new().stats(stats.clone()));

        let rows: Vec<Row> = table.open().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(table.fieldnames().unwrap(), ["Medallion", "Fare"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], Value::from("1,000.00"));
        assert_eq!(stats.malformed(), 1);
        assert_eq!(stats.rows(), 3);
    }

    #[test]
    fn test_replace_and_push_header() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "v.csv", "x,y\n1,2\n");

        let replaced = Table::from_csv(&path, CsvOptions::new().fieldnames(["a", "b"]));
        assert_eq!(replaced.fieldnames().unwrap(), ["a", "b"]);
        assert_eq!(replaced.count().unwrap(), 1);

        let pushed = Table::from_csv(
            &path,
            CsvOptions::new().header(HeaderMode::Push(vec!["a".into(), "b".into()])),
        );
        assert_eq!(pushed.count().unwrap(), 2);
    }

    #[test]
    fn test_ragged_pass() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "r.csv", "a,b,c\n1,2\n");
        let table = Table::from_csv(&path, CsvOptions::new().ragged(RaggedRows::Pass));
        let rows: Vec<Row> = table.open().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows[0].len(), 2);
    }

    #[test]
    fn test_from_csvs_globs_in_order() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "trips_b.csv", "id\n2\n");
        write_file(&dir, "trips_a.csv", "id\n1\n");
        write_file(&dir, "other.csv", "id\n9\n");
        let pattern = format!("{}/trips_*.csv", dir.path().display());

        let table = Table::from_csvs([pattern], CsvOptions::new()).unwrap();
        let ids: Vec<String> = table
            .open()
            .unwrap()
            .map(|r| r.unwrap()[0].to_text())
            .collect();
        assert_eq!(ids, ["1", "2"]);
    }

    #[test]
    fn test_from_csvs_without_matches() {
        let dir = TempDir::new().unwrap();
        let pattern = format!("{}/*.csv", dir.path().display());

        let err = Table::from_csvs([pattern.as_str()], CsvOptions::new()).unwrap_err();
        assert!(matches!(err, TableError::SchemaMismatch(_)));

        let empty = Table::from_csvs([pattern.as_str()], CsvOptions::new().fieldnames(["id"])).unwrap();
        assert_eq!(empty.fieldnames().unwrap(), ["id"]);
        assert_eq!(empty.count().unwrap(), 0);
    }

    #[test]
    fn test_write_round_trip_quotes() {
        let table = Table::from_rows(
            ["Location", "Fare"],
            vec![vec!["Broad St, Philadelphia PA 19107".into(), Value::Float(12.5)]],
        )
        .unwrap();
        let mut buf = Vec::new();
        assert_eq!(table.to_csv(&mut buf).unwrap(), 1);
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "Location,Fare\n\"Broad St, Philadelphia PA 19107\",12.5\n"
        );
    }
}
