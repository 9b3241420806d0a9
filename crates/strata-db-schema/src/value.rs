//! Runtime values moved between rows, statements and default expressions.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;

/// A runtime SQL value.
///
/// Produced by [`TypeHandler::read`](crate::TypeHandler::read) and
/// [`TypeHandler::parse`](crate::TypeHandler::parse), consumed by
/// [`TypeHandler::write`](crate::TypeHandler::write).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL
    Null,

    /// Boolean
    Bool(bool),

    /// 32-bit signed integer (INTEGER)
    I32(i32),

    /// 64-bit signed integer (BIGINT)
    I64(i64),

    /// 32-bit float (FLOAT)
    F32(f32),

    /// 64-bit float (DOUBLE)
    F64(f64),

    /// Text (VARCHAR, CLOB)
    String(String),

    /// Binary data (BLOB)
    Bytes(Vec<u8>),

    /// Date and time without zone (TIMESTAMP)
    Timestamp(NaiveDateTime),

    /// Calendar date (DATE)
    Date(NaiveDate),

    /// Time of day (TIME)
    Time(NaiveTime),
}

impl Value {
    /// Returns true if this is a NULL value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Bytes(v) => {
                write!(f, "\\x")?;
                for b in v {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Value::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::Time(v) => write!(f, "{}", v.format("%H:%M:%S%.f")),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// A function the database evaluates when a default is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseFunction {
    /// `CURRENT_DATE`
    CurrentDate,
    /// `CURRENT_TIMESTAMP`
    CurrentTimestamp,
}

impl DatabaseFunction {
    /// Recognize a function keyword, ignoring case.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.eq_ignore_ascii_case("CURRENT_DATE") {
            Some(DatabaseFunction::CurrentDate)
        } else if input.eq_ignore_ascii_case("CURRENT_TIMESTAMP") {
            Some(DatabaseFunction::CurrentTimestamp)
        } else {
            None
        }
    }
}

impl fmt::Display for DatabaseFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseFunction::CurrentDate => write!(f, "CURRENT_DATE"),
            DatabaseFunction::CurrentTimestamp => write!(f, "CURRENT_TIMESTAMP"),
        }
    }
}

/// A column default (or on-update) value.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// An explicit `NULL` default.
    Null,
    /// A database-evaluated function.
    Function(DatabaseFunction),
    /// A literal, already parsed by the column's type handler.
    Value(Value),
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Null => write!(f, "NULL"),
            DefaultValue::Function(func) => write!(f, "{}", func),
            DefaultValue::Value(v) => write!(f, "{}", v),
        }
    }
}
