//! Value normalization and column type coercion.
//!
//! Document values are first normalized into a canonical [`SqlValue`], then
//! coerced to the representation required by the destination column's
//! declared type. Only temporal columns need real conversion; every other
//! column kind receives the normalized value unchanged.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;

use crate::error::CoercionError;

/// Canonical intermediate value between the document and relational models.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Time(NaiveTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "boolean",
            SqlValue::Int(_) => "integer",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Date(_) => "date",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::Time(_) => "time",
        }
    }
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Int(i) => write!(f, "{}", i),
            SqlValue::Float(x) => write!(f, "{}", x),
            SqlValue::Text(s) => write!(f, "{}", s),
            SqlValue::Date(d) => write!(f, "{}", d),
            SqlValue::Timestamp(ts) => write!(f, "{}", ts),
            SqlValue::Time(t) => write!(f, "{}", t),
        }
    }
}

/// Destination column kind, derived from the declared SQL type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Date,
    Timestamp,
    Time,
    Other,
}

impl ColumnKind {
    /// Classifies a declared column type name (`DATE`, `TIMESTAMP`, ...).
    pub fn from_declared(type_name: &str) -> Self {
        let upper = type_name.trim().to_ascii_uppercase();
        if upper.starts_with("TIMESTAMP") || upper.starts_with("DATETIME") {
            ColumnKind::Timestamp
        } else if upper == "DATE" {
            ColumnKind::Date
        } else if upper.starts_with("TIME") {
            ColumnKind::Time
        } else {
            ColumnKind::Other
        }
    }
}

/// Normalizes a document value into its canonical intermediate form.
///
/// Scalars pass through; arrays and objects become canonical JSON text.
pub fn normalize(value: Option<&Value>) -> Result<SqlValue, CoercionError> {
    let Some(value) = value else {
        return Ok(SqlValue::Null);
    };
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Int(i),
            None => match n.as_f64() {
                Some(x) => SqlValue::Float(x),
                None => SqlValue::Text(n.to_string()),
            },
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(
            serde_json::to_string(value).map_err(|e| CoercionError::Serialization(e.to_string()))?,
        ),
    })
}

/// Converts a normalized value to the representation `kind` requires.
pub fn coerce_to_column(value: SqlValue, kind: ColumnKind) -> Result<SqlValue, CoercionError> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    match kind {
        ColumnKind::Date => coerce_to_date(value),
        ColumnKind::Timestamp => coerce_to_timestamp(value),
        ColumnKind::Time => coerce_to_time(value),
        ColumnKind::Other => Ok(value),
    }
}

/// Normalizes and coerces in one step.
pub fn to_sql_value(value: Option<&Value>, kind: ColumnKind) -> Result<SqlValue, CoercionError> {
    coerce_to_column(normalize(value)?, kind)
}

fn coerce_to_date(value: SqlValue) -> Result<SqlValue, CoercionError> {
    match value {
        SqlValue::Date(d) => Ok(SqlValue::Date(d)),
        SqlValue::Timestamp(ts) => Ok(SqlValue::Date(ts.date())),
        SqlValue::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(SqlValue::Null);
            }
            parse_date(text)
                .map(SqlValue::Date)
                .ok_or_else(|| unparsable(text, "DATE"))
        }
        other => Err(unsupported(&other, "DATE")),
    }
}

fn coerce_to_timestamp(value: SqlValue) -> Result<SqlValue, CoercionError> {
    match value {
        SqlValue::Timestamp(ts) => Ok(SqlValue::Timestamp(ts)),
        SqlValue::Date(d) => Ok(SqlValue::Timestamp(d.and_time(NaiveTime::MIN))),
        SqlValue::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(SqlValue::Null);
            }
            parse_local_datetime(text)
                .or_else(|| parse_instant(text))
                .or_else(|| parse_date(text).map(|d| d.and_time(NaiveTime::MIN)))
                .map(SqlValue::Timestamp)
                .ok_or_else(|| unparsable(text, "TIMESTAMP"))
        }
        other => Err(unsupported(&other, "TIMESTAMP")),
    }
}

fn coerce_to_time(value: SqlValue) -> Result<SqlValue, CoercionError> {
    match value {
        SqlValue::Time(t) => Ok(SqlValue::Time(t)),
        SqlValue::Timestamp(ts) => Ok(SqlValue::Time(ts.time())),
        SqlValue::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(SqlValue::Null);
            }
            parse_time(text)
                .map(SqlValue::Time)
                .ok_or_else(|| unparsable(text, "TIME"))
        }
        other => Err(unsupported(&other, "TIME")),
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

fn parse_local_datetime(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M"))
        .ok()
}

// An instant carries a zone designator (`Z` or an offset); stored as UTC.
fn parse_instant(text: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).naive_utc())
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()
}

fn unparsable(text: &str, target: &'static str) -> CoercionError {
    CoercionError::Unparsable {
        value: text.to_string(),
        target,
    }
}

fn unsupported(value: &SqlValue, target: &'static str) -> CoercionError {
    CoercionError::UnsupportedValue {
        kind: value.kind(),
        target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(s: &str) -> SqlValue {
        SqlValue::Text(s.to_string())
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_normalize_scalars() {
        assert_eq!(normalize(None).unwrap(), SqlValue::Null);
        assert_eq!(normalize(Some(&json!(null))).unwrap(), SqlValue::Null);
        assert_eq!(normalize(Some(&json!(true))).unwrap(), SqlValue::Bool(true));
        assert_eq!(normalize(Some(&json!(7))).unwrap(), SqlValue::Int(7));
        assert_eq!(normalize(Some(&json!(1.5))).unwrap(), SqlValue::Float(1.5));
        assert_eq!(normalize(Some(&json!("hi"))).unwrap(), text("hi"));
    }

    #[test]
    fn test_normalize_structured_values_to_json() {
        assert_eq!(
            normalize(Some(&json!({"a": [1, "x"]}))).unwrap(),
            text(r#"{"a":[1,"x"]}"#)
        );
        assert_eq!(normalize(Some(&json!([]))).unwrap(), text("[]"));
    }

    #[test]
    fn test_column_kind_classification() {
        assert_eq!(ColumnKind::from_declared("DATE"), ColumnKind::Date);
        assert_eq!(ColumnKind::from_declared("date"), ColumnKind::Date);
        assert_eq!(ColumnKind::from_declared("TIMESTAMP"), ColumnKind::Timestamp);
        assert_eq!(
            ColumnKind::from_declared("timestamp with time zone"),
            ColumnKind::Timestamp
        );
        assert_eq!(ColumnKind::from_declared("DATETIME"), ColumnKind::Timestamp);
        assert_eq!(ColumnKind::from_declared("TIME"), ColumnKind::Time);
        assert_eq!(ColumnKind::from_declared("TEXT"), ColumnKind::Other);
        assert_eq!(ColumnKind::from_declared(""), ColumnKind::Other);
    }

    #[test]
    fn test_date_column() {
        assert_eq!(
            coerce_to_column(text("2023-05-01"), ColumnKind::Date).unwrap(),
            SqlValue::Date(date(2023, 5, 1))
        );
        let ts = date(2023, 5, 1).and_hms_opt(13, 30, 0).unwrap();
        assert_eq!(
            coerce_to_column(SqlValue::Timestamp(ts), ColumnKind::Date).unwrap(),
            SqlValue::Date(date(2023, 5, 1))
        );
        assert_eq!(
            coerce_to_column(text("   "), ColumnKind::Date).unwrap(),
            SqlValue::Null
        );
    }

    #[test]
    fn test_date_column_rejects_garbage() {
        let err = coerce_to_column(text("not-a-date"), ColumnKind::Date).unwrap_err();
        assert_eq!(
            err,
            CoercionError::Unparsable {
                value: "not-a-date".to_string(),
                target: "DATE"
            }
        );
        assert!(matches!(
            coerce_to_column(SqlValue::Int(3), ColumnKind::Date),
            Err(CoercionError::UnsupportedValue { .. })
        ));
    }

    #[test]
    fn test_timestamp_date_only_equals_midnight() {
        let date_only = coerce_to_column(text("2023-05-01"), ColumnKind::Timestamp).unwrap();
        let midnight = coerce_to_column(text("2023-05-01T00:00:00"), ColumnKind::Timestamp).unwrap();
        assert_eq!(date_only, midnight);
    }

    #[test]
    fn test_timestamp_parse_order() {
        let expected = date(2024, 2, 29).and_hms_milli_opt(8, 15, 30, 250).unwrap();
        assert_eq!(
            coerce_to_column(text("2024-02-29T08:15:30.250"), ColumnKind::Timestamp).unwrap(),
            SqlValue::Timestamp(expected)
        );
        assert_eq!(
            coerce_to_column(text("2024-02-29T10:15:30.250+02:00"), ColumnKind::Timestamp).unwrap(),
            SqlValue::Timestamp(expected)
        );
        assert_eq!(
            coerce_to_column(text("2024-02-29T08:15:30.250Z"), ColumnKind::Timestamp).unwrap(),
            SqlValue::Timestamp(expected)
        );
        assert_eq!(
            coerce_to_column(text("2024-02-29T08:15"), ColumnKind::Timestamp).unwrap(),
            SqlValue::Timestamp(date(2024, 2, 29).and_hms_opt(8, 15, 0).unwrap())
        );
        assert!(coerce_to_column(text("yesterday"), ColumnKind::Timestamp).is_err());
    }

    #[test]
    fn test_time_column() {
        assert_eq!(
            coerce_to_column(text("10:15"), ColumnKind::Time).unwrap(),
            SqlValue::Time(NaiveTime::from_hms_opt(10, 15, 0).unwrap())
        );
        let ts = date(2023, 5, 1).and_hms_opt(23, 59, 1).unwrap();
        assert_eq!(
            coerce_to_column(SqlValue::Timestamp(ts), ColumnKind::Time).unwrap(),
            SqlValue::Time(NaiveTime::from_hms_opt(23, 59, 1).unwrap())
        );
        assert!(coerce_to_column(text("25:99"), ColumnKind::Time).is_err());
    }

    #[test]
    fn test_other_columns_pass_through() {
        assert_eq!(
            coerce_to_column(text("not-a-date"), ColumnKind::Other).unwrap(),
            text("not-a-date")
        );
        assert_eq!(
            coerce_to_column(SqlValue::Float(2.5), ColumnKind::Other).unwrap(),
            SqlValue::Float(2.5)
        );
    }

    #[test]
    fn test_null_short_circuits() {
        for kind in [
            ColumnKind::Date,
            ColumnKind::Timestamp,
            ColumnKind::Time,
            ColumnKind::Other,
        ] {
            assert_eq!(to_sql_value(None, kind).unwrap(), SqlValue::Null);
        }
    }
}
