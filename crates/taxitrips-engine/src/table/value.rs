//! Scalar cell values

use crate::region::Region;
use chrono::NaiveDateTime;
use std::fmt;
use std::sync::Arc;

/// Canonical text form for datetimes written back to CSV
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One cell of a row.
///
/// CSV sources only ever produce [`Value::Str`]; the other variants come
/// from converters and computed fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Str(String),
    Int(i64),
    Float(f64),
    DateTime(NaiveDateTime),
    /// Matched region, rendered as its ID
    Region(Arc<Region>),
}

impl Value {
    /// `Null` and the empty string both count as missing.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Str(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view. Strings are parsed after trimming.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn as_region(&self) -> Option<&Arc<Region>> {
        match self {
            Value::Region(r) => Some(r),
            _ => None,
        }
    }

    /// Text written to CSV (and used as the lookup key for string matching).
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Str(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            Value::Region(r) => write!(f, "{}", r.id),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}

impl From<Arc<Region>> for Value {
    fn from(r: Arc<Region>) -> Self {
        Value::Region(r)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_render() {
        let dt = NaiveDate::from_ymd_opt(2014, 10, 3)
            .unwrap()
            .and_hms_opt(22, 5, 0)
            .unwrap();
        assert_eq!(Value::Null.to_text(), "");
        assert_eq!(Value::from(dt).to_text(), "2014-10-03 22:05:00");
        assert_eq!(Value::Float(39.95).to_text(), "39.95");
        assert_eq!(Value::from(Some(7_i64)).to_text(), "7");
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn test_missing_and_numeric() {
        assert!(Value::Null.is_missing());
        assert!(Value::from("").is_missing());
        assert!(!Value::from(" ").is_missing());
        assert_eq!(Value::from(" 2.5 ").as_f64(), Some(2.5));
        assert_eq!(Value::from("n/a").as_f64(), None);
    }
}
