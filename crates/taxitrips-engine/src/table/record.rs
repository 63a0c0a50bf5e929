use super::{Header, Value};
use crate::error::ConvertError;

const NULL: &Value = &Value::Null;

/// Read-only view of one row through the header that was active when it was
/// produced. Computed fields receive one of these.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    header: &'a Header,
    values: &'a [Value],
}

impl<'a> Record<'a> {
    pub fn new(header: &'a Header, values: &'a [Value]) -> Self {
        Self { header, values }
    }

    pub fn header(&self) -> &'a Header {
        self.header
    }

    /// Value by field name. `None` for unknown fields and for short rows.
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.header
            .position(name)
            .and_then(|i| self.values.get(i))
    }

    /// Value by field name, as an error when the field is unknown.
    pub fn field(&self, name: &str) -> Result<&'a Value, ConvertError> {
        if !self.header.contains(name) {
            return Err(ConvertError::new(format!("no field named {name}")));
        }
        Ok(self.get(name).unwrap_or(NULL))
    }

    pub fn get_str(&self, name: &str) -> Option<&'a str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn index(&self, i: usize) -> Option<&'a Value> {
        self.values.get(i)
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }
}
