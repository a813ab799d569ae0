//! Dynamic cell values and column types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of a column, declared in a table definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// Boolean.
    Bool,
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit float.
    Real,
    /// UTF-8 text.
    Text,
    /// Milliseconds since the Unix epoch.
    Timestamp,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Bool => "bool",
            ColumnType::Integer => "integer",
            ColumnType::Real => "real",
            ColumnType::Text => "text",
            ColumnType::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// A dynamic cell value.
///
/// Records hold one `Value` per column. A single generic value type
/// replaces per-table structs; table-specific behavior lives in free
/// functions at the calling layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value (only valid for nullable columns).
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    Integer(i64),
    /// Floating point value.
    Real(f64),
    /// Text value.
    Text(String),
    /// Timestamp value (milliseconds since the Unix epoch).
    Timestamp(u64),
}

impl Value {
    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true if this value matches the given column type.
    ///
    /// `Null` matches no type; nullability is checked separately.
    pub fn matches(&self, column_type: ColumnType) -> bool {
        matches!(
            (self, column_type),
            (Value::Bool(_), ColumnType::Bool)
                | (Value::Integer(_), ColumnType::Integer)
                | (Value::Real(_), ColumnType::Real)
                | (Value::Text(_), ColumnType::Text)
                | (Value::Timestamp(_), ColumnType::Timestamp)
        )
    }

    /// Returns the text content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content, if this is an integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the boolean content, if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the timestamp content, if this is a timestamp value.
    pub fn as_timestamp(&self) -> Option<u64> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_matching() {
        assert!(Value::Integer(3).matches(ColumnType::Integer));
        assert!(Value::Text("x".into()).matches(ColumnType::Text));
        assert!(Value::Timestamp(10).matches(ColumnType::Timestamp));
        assert!(!Value::Integer(3).matches(ColumnType::Text));
        assert!(!Value::Null.matches(ColumnType::Integer));
    }

    #[test]
    fn accessors() {
        assert_eq!(Value::from("alice").as_text(), Some("alice"));
        assert_eq!(Value::from(7i64).as_integer(), Some(7));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::Timestamp(42).as_timestamp(), Some(42));
        assert_eq!(Value::Null.as_text(), None);
        assert!(Value::Null.is_null());
    }
}
