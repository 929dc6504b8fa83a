//! Dynamically typed column values.
//!
//! Column projections and filter operands are not statically shaped like
//! `Student`, so they travel as `FieldValue`s.

use crate::model::student::ColumnType;
use chrono::NaiveDateTime;
use rusqlite::types::{Value, ValueRef};
use std::fmt::{Display, Formatter};

/// Text layout used for persisted datetimes; sorts chronologically.
pub const DATETIME_FORMAT: &str = "%F %T%.f";
const DATETIME_FORMAT_ISO: &str = "%FT%T%.f";

/// One column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl FieldValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Converts into an owned SQLite bind value.
    pub(crate) fn to_sql_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Integer(value) => Value::Integer(*value),
            Self::Text(value) => Value::Text(value.clone()),
            Self::DateTime(value) => Value::Text(format_datetime(*value)),
        }
    }

    /// Decodes a raw SQLite value read from a column of `column_type`.
    pub(crate) fn from_sql(column_type: ColumnType, value: ValueRef<'_>) -> Result<Self, String> {
        match value {
            ValueRef::Null => Ok(Self::Null),
            ValueRef::Integer(value) => Ok(Self::Integer(value)),
            ValueRef::Text(bytes) => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|err| format!("text value is not valid UTF-8: {err}"))?;
                match column_type {
                    ColumnType::DateTime => parse_datetime(text)
                        .map(Self::DateTime)
                        .ok_or_else(|| format!("invalid datetime value `{text}`")),
                    ColumnType::Integer | ColumnType::Text => Ok(Self::Text(text.to_string())),
                }
            }
            ValueRef::Real(value) => Err(format!("unexpected real value `{value}`")),
            ValueRef::Blob(_) => Err("unexpected blob value".to_string()),
        }
    }
}

/// Renders a datetime in the persisted text layout.
pub(crate) fn format_datetime(value: NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, DATETIME_FORMAT_ISO))
        .ok()
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::DateTime(value) => write!(f, "{}", value.format("%F %T")),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

/// One row of a column projection, in selection order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record(pub Vec<FieldValue>);

impl Record {
    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.0.get(index)
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("(")?;
        for (index, value) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldValue, Record};
    use crate::model::student::ColumnType;
    use chrono::NaiveDate;
    use rusqlite::types::{Value, ValueRef};

    #[test]
    fn datetime_binds_as_sortable_text_and_decodes_back() {
        let birthday = NaiveDate::from_ymd_opt(1912, 6, 23)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let bound = FieldValue::DateTime(birthday).to_sql_value();
        assert_eq!(bound, Value::Text("1912-06-23 00:00:00".to_string()));

        let decoded =
            FieldValue::from_sql(ColumnType::DateTime, ValueRef::Text(b"1912-06-23 00:00:00"))
                .unwrap();
        assert_eq!(decoded.as_datetime(), Some(birthday));
    }

    #[test]
    fn invalid_datetime_text_is_reported() {
        let err = FieldValue::from_sql(ColumnType::DateTime, ValueRef::Text(b"not a date"))
            .unwrap_err();
        assert!(err.contains("not a date"));
    }

    #[test]
    fn record_displays_as_tuple() {
        let record = Record(vec![FieldValue::from("Alan Turing"), FieldValue::from(11)]);
        assert_eq!(record.to_string(), "(Alan Turing, 11)");
    }
}
