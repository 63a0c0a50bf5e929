//! Positional field insertion
//!
//! [`FieldInjector`] adds one or more named fields to a table in a single
//! pass. Definitions are applied left to right: each one resolves its index
//! against the header produced by the definitions before it, so two appends
//! in the same call land in call order, and a computed value can read any
//! field inserted earlier in the same call.
//!
//! Input rows shorter than the upstream header are padded with `Null` (and
//! longer ones truncated) before insertion, so every output row has exactly
//! as many values as the output header.

use crate::error::{ConvertError, Result, TableError};
use crate::table::{ErrorPolicy, Header, Record, Row, RowStream, Table, TableSource, TransformOptions, Value};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

/// Function from the row-so-far to a new value
pub type ComputeFn = Rc<dyn Fn(&Record<'_>) -> std::result::Result<Value, ConvertError>>;

/// Value of an injected field
#[derive(Clone)]
pub enum FieldValue {
    Fixed(Value),
    Computed(ComputeFn),
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Fixed(v) => f.debug_tuple("Fixed").field(v).finish(),
            FieldValue::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// A field to insert: name, value source and optional position
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub name: String,
    pub value: FieldValue,
    /// Insertion index; `None` appends
    pub index: Option<usize>,
}

impl FieldDefinition {
    pub fn fixed(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: FieldValue::Fixed(value.into()),
            index: None,
        }
    }

    pub fn computed<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Record<'_>) -> std::result::Result<Value, ConvertError> + 'static,
    {
        Self {
            name: name.into(),
            value: FieldValue::Computed(Rc::new(f)),
            index: None,
        }
    }

    /// Insert at `index` instead of appending.
    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

/// Table source that inserts [`FieldDefinition`]s into every row.
pub struct FieldInjector {
    upstream: Table,
    fields: Rc<[FieldDefinition]>,
    options: TransformOptions,
}

impl FieldInjector {
    pub fn new(upstream: Table, fields: Vec<FieldDefinition>, options: TransformOptions) -> Self {
        Self {
            upstream,
            fields: fields.into(),
            options,
        }
    }
}

/// Resolved insertion plan: the header each definition sees, and its index.
struct Plan {
    steps: Vec<(Header, usize)>,
    output: Header,
}

fn plan(input: &Header, fields: &[FieldDefinition]) -> Result<Plan> {
    let mut names = input.names().to_vec();
    let mut current = input.clone();
    let mut steps = Vec::with_capacity(fields.len());

    for field in fields {
        let index = field.index.unwrap_or(names.len());
        if index > names.len() {
            return Err(TableError::InvalidFieldIndex {
                field: field.name.clone(),
                index,
                len: names.len(),
            });
        }
        steps.push((current, index));
        names.insert(index, field.name.clone());
        current = Header::new(names.iter().cloned())?;
    }

    Ok(Plan {
        steps,
        output: current,
    })
}

impl TableSource for FieldInjector {
    fn open(&self) -> Result<RowStream> {
        let (input, rows) = self.upstream.open()?.into_parts();
        let Plan { steps, output } = plan(&input, &self.fields)?;
        trace!(fields = ?output.names(), "Planned field insertion");

        let width = input.len();
        let fields = self.fields.clone();
        let options = self.options.clone();

        let rows = rows.enumerate().map(move |(n, row)| {
            let mut row = row?;
            if row.len() < width {
                debug!(row = n + 1, found = row.len(), expected = width, "Padding short row");
                row.resize(width, Value::Null);
            } else if row.len() > width {
                debug!(row = n + 1, found = row.len(), expected = width, "Truncating long row");
                options.stats.record_truncated();
                row.truncate(width);
            }
            for (field, (header, index)) in fields.iter().zip(&steps) {
                let value = compute(field, header, &row, n as u64 + 1, &options)?;
                row.insert(*index, value);
            }
            Ok(row)
        });
        Ok(RowStream::new(output, Box::new(rows)))
    }
}

fn compute(
    field: &FieldDefinition,
    header: &Header,
    row: &Row,
    row_number: u64,
    options: &TransformOptions,
) -> Result<Value> {
    match &field.value {
        FieldValue::Fixed(v) => Ok(v.clone()),
        FieldValue::Computed(f) => match f(&Record::new(header, row)) {
            Ok(v) => Ok(v),
            Err(source) if options.policy == ErrorPolicy::FailFast => {
                Err(TableError::FieldComputation {
                    field: field.name.clone(),
                    row: row_number,
                    source,
                })
            }
            Err(e) => {
                debug!(field = %field.name, row = row_number, error = %e, "Computation failed, using null");
                options.stats.record_defaulted();
                Ok(Value::Null)
            }
        },
    }
}
