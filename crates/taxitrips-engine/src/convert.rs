//! Value converters and computed-field builders for trip cleaning

use crate::error::ConvertError;
use crate::table::{Record, Value};
use chrono::NaiveDateTime;
use regex::Regex;
use tracing::warn;

/// Output format of [`as_iso_datetime`]; seconds are always zeroed.
pub const ISO_MINUTE_FORMAT: &str = "%Y-%m-%d %H:%M:00";

/// Input format of the CMT datetime columns
pub const CMT_DATETIME_FORMAT: &str = "%m/%d/%Y %H:%M";

/// Render a money amount with two decimals.
///
/// A leading `$` and surrounding whitespace are tolerated. Missing values
/// stay null.
pub fn as_money(value: Value) -> Result<Value, ConvertError> {
    if value.is_missing() {
        return Ok(Value::Null);
    }
    let amount = match &value {
        Value::Str(s) => s
            .trim()
            .trim_start_matches('$')
            .trim()
            .parse::<f64>()
            .map_err(|_| ConvertError::new(format!("not a money amount: {s:?}")))?,
        other => other
            .as_f64()
            .ok_or_else(|| ConvertError::new(format!("not a money amount: {other}")))?,
    };
    Ok(Value::Str(format!("{amount:.2}")))
}

/// Converter reformatting datetimes from `input_format` to
/// `YYYY-MM-DD HH:MM:00`. Values that do not parse are passed through
/// unchanged (with a warning when non-empty).
pub fn as_iso_datetime(input_format: &str) -> impl Fn(Value) -> Result<Value, ConvertError> {
    let input_format = input_format.to_string();
    move |value| {
        let Value::Str(s) = &value else {
            return Ok(value);
        };
        match NaiveDateTime::parse_from_str(s.trim(), &input_format) {
            Ok(dt) => Ok(Value::Str(dt.format(ISO_MINUTE_FORMAT).to_string())),
            Err(_) => {
                if !s.is_empty() {
                    warn!(value = %s, format = %input_format, "Could not parse date");
                }
                Ok(value)
            }
        }
    }
}

/// `CASH` → `Cash`, `CC CARD` → `Credit Card`; anything else unchanged.
pub fn normalize_payment_type(value: Value) -> Result<Value, ConvertError> {
    Ok(match value.as_str() {
        Some("CASH") => Value::from("Cash"),
        Some("CC CARD") => Value::from("Credit Card"),
        _ => value,
    })
}

/// Converter keeping the first `n` characters of string values.
pub fn truncate_chars(n: usize) -> impl Fn(Value) -> Result<Value, ConvertError> {
    move |value| {
        Ok(match value {
            Value::Str(s) if s.chars().count() > n => Value::Str(s.chars().take(n).collect()),
            other => other,
        })
    }
}

/// Computed field parsing `field` with `pattern`; null when it does not parse.
pub fn parse_datetime(field: &str, pattern: &str) -> impl Fn(&Record<'_>) -> Result<Value, ConvertError> {
    let field = field.to_string();
    let pattern = pattern.to_string();
    move |record: &Record<'_>| {
        let parsed = match record.field(&field)? {
            Value::DateTime(dt) => Some(*dt),
            Value::Str(s) => NaiveDateTime::parse_from_str(s.trim(), &pattern).ok(),
            _ => None,
        };
        Ok(parsed.into())
    }
}

/// Computed field returning capture `group` of `pattern` searched in
/// `field`, or null when there is no match.
pub fn rematch(
    pattern: &str,
    field: &str,
    group: usize,
) -> Result<impl Fn(&Record<'_>) -> Result<Value, ConvertError>, regex::Error> {
    let re = Regex::new(pattern)?;
    let field = field.to_string();
    Ok(move |record: &Record<'_>| {
        let text = record.field(&field)?.to_text();
        Ok(re
            .captures(&text)
            .and_then(|c| c.get(group))
            .map(|m| Value::from(m.as_str()))
            .into())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::table::Header;

    #[test]
    fn test_as_money() {
        assert_eq!(as_money("12".into()).unwrap(), Value::from("12.00"));
        assert_eq!(as_money(" $3.4 ".into()).unwrap(), Value::from("3.40"));
        assert_eq!(as_money(Value::Float(0.5)).unwrap(), Value::from("0.50"));
        assert_eq!(as_money("".into()).unwrap(), Value::Null);
        assert!(as_money("free".into()).is_err());
    }

    #[test]
    fn test_as_iso_datetime() {
        let convert = as_iso_datetime(CMT_DATETIME_FORMAT);
        assert_eq!(
            convert("10/03/2014 22:05".into()).unwrap(),
            Value::from("2014-10-03 22:05:00")
        );
        assert_eq!(convert("garbage".into()).unwrap(), Value::from("garbage"));
        assert_eq!(convert("".into()).unwrap(), Value::from(""));
    }

    #[test]
    fn test_payment_and_truncate() {
        assert_eq!(normalize_payment_type("CASH".into()).unwrap(), Value::from("Cash"));
        assert_eq!(
            normalize_payment_type("CC CARD".into()).unwrap(),
            Value::from("Credit Card")
        );
        assert_eq!(normalize_payment_type("Other".into()).unwrap(), Value::from("Other"));

        let trunc = truncate_chars(19);
        assert_eq!(
            trunc("2014-10-03 22:05:00.000".into()).unwrap(),
            Value::from("2014-10-03 22:05:00")
        );
        assert_eq!(trunc(Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_parse_datetime_and_rematch() {
        let header = Header::new(["Meter On Datetime", "Pickup Location"]).unwrap();
        let values = vec![
            Value::from("2014-10-03 22:05:00"),
            Value::from("1500 Market St, Philadelphia, PA 19102"),
        ];
        let record = Record::new(&header, &values);

        let dt = parse_datetime("Meter On Datetime", "%Y-%m-%d %H:%M:%S")(&record).unwrap();
        assert_eq!(dt.to_text(), "2014-10-03 22:05:00");

        let zip = rematch(r".*[^\d](\d+)$", "Pickup Location", 1).unwrap()(&record).unwrap();
        assert_eq!(zip, Value::from("19102"));

        let none = rematch(r"(\d{9})", "Pickup Location", 1).unwrap()(&record).unwrap();
        assert_eq!(none, Value::Null);

        let bad = parse_datetime("Meter Off Datetime", "%Y")(&record);
        assert!(bad.is_err());
    }
}
