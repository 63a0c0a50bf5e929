//! Row-wise table transforms

use super::{ErrorPolicy, Header, Row, RowStream, Rows, Table, TableSource, TransformOptions, Value};
use crate::error::{ConvertError, Result, TableError};
use std::collections::HashSet;
use std::rc::Rc;
use tracing::{debug, info, warn};

pub(super) type ConvertFn = Rc<dyn Fn(Value) -> std::result::Result<Value, ConvertError>>;

pub(super) struct Memory {
    pub header: Header,
    pub rows: Rc<Vec<Row>>,
}

impl TableSource for Memory {
    fn open(&self) -> Result<RowStream> {
        let rows = self.rows.clone();
        let iter = (0..rows.len()).map(move |i| Ok(rows[i].clone()));
        Ok(RowStream::new(self.header.clone(), Box::new(iter)))
    }
}

/// Pick `indices` out of `row`, padding with `Null` past the row's end.
fn project(row: &[Value], indices: &[usize]) -> Row {
    indices
        .iter()
        .map(|&i| row.get(i).cloned().unwrap_or_default())
        .collect()
}

pub(super) struct Cut {
    pub upstream: Table,
    pub fields: Vec<String>,
}

impl TableSource for Cut {
    fn open(&self) -> Result<RowStream> {
        let (upstream, rows) = self.upstream.open()?.into_parts();
        let indices = self
            .fields
            .iter()
            .map(|f| upstream.require(f))
            .collect::<Result<Vec<_>>>()?;
        let header = Header::new(self.fields.iter().cloned())?;
        let rows = rows.map(move |row| row.map(|row| project(&row, &indices)));
        Ok(RowStream::new(header, Box::new(rows)))
    }
}

pub(super) struct Cutout {
    pub upstream: Table,
    pub fields: Vec<String>,
}

impl TableSource for Cutout {
    fn open(&self) -> Result<RowStream> {
        let (upstream, rows) = self.upstream.open()?.into_parts();
        let dropped = self
            .fields
            .iter()
            .map(|f| upstream.require(f))
            .collect::<Result<HashSet<_>>>()?;
        let keep: Vec<usize> = (0..upstream.len()).filter(|i| !dropped.contains(i)).collect();
        let header = Header::new(keep.iter().map(|&i| upstream.names()[i].clone()))?;
        let rows = rows.map(move |row| row.map(|row| project(&row, &keep)));
        Ok(RowStream::new(header, Box::new(rows)))
    }
}

pub(super) struct Convert {
    pub upstream: Table,
    pub field: String,
    pub f: ConvertFn,
    pub options: TransformOptions,
}

impl TableSource for Convert {
    fn open(&self) -> Result<RowStream> {
        let (header, rows) = self.upstream.open()?.into_parts();
        let index = header.require(&self.field)?;
        let field = self.field.clone();
        let f = self.f.clone();
        let options = self.options.clone();

        let rows = rows.enumerate().map(move |(n, row)| {
            let mut row = row?;
            if let Some(slot) = row.get_mut(index) {
                match f(std::mem::take(slot)) {
                    Ok(value) => *slot = value,
                    Err(source) if options.policy == ErrorPolicy::FailFast => {
                        return Err(TableError::Conversion {
                            field: field.clone(),
                            row: n as u64 + 1,
                            source,
                        });
                    }
                    Err(e) => {
                        debug!(field = %field, row = n + 1, error = %e, "Conversion failed, using null");
                        options.stats.record_defaulted();
                    }
                }
            }
            Ok(row)
        });
        Ok(RowStream::new(header, Box::new(rows)))
    }
}

pub(super) struct SetHeader {
    pub upstream: Table,
    pub names: Vec<String>,
}

impl TableSource for SetHeader {
    fn open(&self) -> Result<RowStream> {
        let (_, rows) = self.upstream.open()?.into_parts();
        let header = Header::new(self.names.iter().cloned())?;
        let width = header.len();
        let mut warned = false;
        let rows = rows.map(move |r| {
            if let Ok(row) = &r {
                if row.len() != width && !warned {
                    warned = true;
                    warn!(
                        header = width,
                        row = row.len(),
                        "Row width differs from the replacement header"
                    );
                }
            }
            r
        });
        Ok(RowStream::new(header, Box::new(rows)))
    }
}

pub(super) struct PushHeader {
    pub upstream: Table,
    pub names: Vec<String>,
}

impl TableSource for PushHeader {
    fn open(&self) -> Result<RowStream> {
        let (old, rows) = self.upstream.open()?.into_parts();
        let first: Row = old.iter().map(Value::from).collect();
        let rows: Rows = Box::new(std::iter::once(Ok(first)).chain(rows));
        Ok(RowStream::new(Header::new(self.names.iter().cloned())?, rows))
    }
}

pub(super) struct Rename {
    pub upstream: Table,
    pub from: String,
    pub to: String,
}

impl TableSource for Rename {
    fn open(&self) -> Result<RowStream> {
        let (header, rows) = self.upstream.open()?.into_parts();
        let index = header.require(&self.from)?;
        let mut names = header.names().to_vec();
        names[index] = self.to.clone();
        Ok(RowStream::new(Header::new(names)?, rows))
    }
}

pub(super) struct Progress {
    pub upstream: Table,
    pub label: String,
    pub interval: u64,
}

impl TableSource for Progress {
    fn open(&self) -> Result<RowStream> {
        let (header, rows) = self.upstream.open()?.into_parts();
        let rows = ProgressRows {
            inner: rows,
            label: self.label.clone(),
            interval: self.interval,
            count: 0,
            finished: false,
        };
        Ok(RowStream::new(header, Box::new(rows)))
    }
}

struct ProgressRows {
    inner: Rows,
    label: String,
    interval: u64,
    count: u64,
    finished: bool,
}

impl Iterator for ProgressRows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next() {
            Some(row) => {
                self.count += 1;
                if self.count % self.interval == 0 {
                    info!(label = %self.label, rows = self.count, "Progress");
                }
                Some(row)
            }
            None => {
                if !self.finished {
                    self.finished = true;
                    info!(label = %self.label, rows = self.count, "Finished");
                }
                None
            }
        }
    }
}
