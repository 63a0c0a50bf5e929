//! Stable concatenation of tables

use crate::error::{Result, TableError};
use crate::table::{Header, Row, RowStream, Rows, Table, TableSource};
use std::collections::VecDeque;
use tracing::debug;

/// Width checking for concatenated rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcatMode {
    /// Rows pass through unchanged whatever their width
    #[default]
    Lenient,
    /// A source header or row whose width differs from the output header
    /// is a [`TableError::SchemaMismatch`]
    Strict,
}

/// Unions tables under the first table's header.
///
/// Sources are opened one at a time: the next file is not touched until the
/// previous one is exhausted, so at most one upstream handle is live.
pub struct Concatenator {
    tables: Vec<Table>,
    mode: ConcatMode,
}

impl Concatenator {
    pub fn new(tables: Vec<Table>, mode: ConcatMode) -> Self {
        Self { tables, mode }
    }
}

impl TableSource for Concatenator {
    fn open(&self) -> Result<RowStream> {
        let mut pending: VecDeque<Table> = self.tables.iter().cloned().collect();
        let Some(first) = pending.pop_front() else {
            return Ok(RowStream::new(
                Header::new(Vec::<String>::new())?,
                Box::new(std::iter::empty()),
            ));
        };
        let (header, rows) = first.open()?.into_parts();
        debug!(sources = self.tables.len(), fields = header.len(), "Concatenating tables");

        let rows = ConcatRows {
            header: header.clone(),
            current: Some(rows),
            pending,
            mode: self.mode,
            source: 0,
        };
        Ok(RowStream::new(header, Box::new(rows)))
    }
}

struct ConcatRows {
    header: Header,
    current: Option<Rows>,
    pending: VecDeque<Table>,
    mode: ConcatMode,
    source: usize,
}

impl ConcatRows {
    fn check_width(&self, len: usize, what: &str) -> Result<()> {
        if self.mode == ConcatMode::Strict && len != self.header.len() {
            return Err(TableError::schema_mismatch(format!(
                "source {}: {what} has {len} fields, expected {}",
                self.source + 1,
                self.header.len()
            )));
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<bool> {
        self.current = None;
        let Some(next) = self.pending.pop_front() else {
            return Ok(false);
        };
        self.source += 1;
        let (header, rows) = next.open()?.into_parts();
        self.check_width(header.len(), "header")?;
        self.current = Some(rows);
        Ok(true)
    }
}

impl Iterator for ConcatRows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let current = self.current.as_mut()?;
            match current.next() {
                Some(Ok(row)) => {
                    if let Err(e) = self.check_width(row.len(), "row") {
                        self.current = None;
                        return Some(Err(e));
                    }
                    return Some(Ok(row));
                }
                Some(Err(e)) => return Some(Err(e)),
                None => match self.advance() {
                    Ok(true) => continue,
                    Ok(false) => return None,
                    Err(e) => return Some(Err(e)),
                },
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::table::Value;

    fn table(header: &[&str], rows: &[&[&str]]) -> Table {
        Table::from_rows(
            header.iter().copied(),
            rows.iter()
                .map(|r| r.iter().map(|v| Value::from(*v)).collect())
                .collect(),
        )
        .unwrap()
    }

    fn texts(table: &Table) -> Vec<Vec<String>> {
        table
            .open()
            .unwrap()
            .map(|r| r.unwrap().iter().map(Value::to_text).collect())
            .collect()
    }

    #[test]
    fn test_preserves_source_order() {
        let t = Table::concat(
            vec![table(&["a", "b"], &[&["1", "2"]]), table(&["a", "b"], &[&["3", "4"]])],
            ConcatMode::Strict,
        );
        assert_eq!(t.fieldnames().unwrap(), ["a", "b"]);
        assert_eq!(texts(&t), [["1", "2"], ["3", "4"]]);
    }

    #[test]
    fn test_first_header_wins() {
        let t = table(&["a", "b"], &[&["1", "2"]])
            .concatenate([table(&["x", "y"], &[&["3", "4"]]), table(&["p", "q"], &[])]);
        assert_eq!(t.fieldnames().unwrap(), ["a", "b"]);
        assert_eq!(t.count().unwrap(), 2);
    }

    #[test]
    fn test_lenient_passes_ragged_rows() {
        let t = table(&["a", "b"], &[&["1", "2"]]).concatenate([table(&["a"], &[&["3"]])]);
        assert_eq!(texts(&t)[1], ["3"]);
    }

    #[test]
    fn test_strict_rejects_mismatch() {
        let t = Table::concat(
            vec![table(&["a", "b"], &[&["1", "2"]]), table(&["a"], &[&["3"]])],
            ConcatMode::Strict,
        );
        let results: Vec<_> = t.open().unwrap().collect();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(TableError::SchemaMismatch(_))));
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_empty_list() {
        let t = Table::concat(Vec::new(), ConcatMode::Lenient);
        assert_eq!(t.count().unwrap(), 0);
    }
}
