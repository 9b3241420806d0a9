//! Logical types and the registry that resolves them.
//!
//! A [`TypeRegistry`] answers three questions:
//!
//! - which handler serves an explicitly requested [`LogicalType`],
//! - which logical type a native SQL type code maps to,
//! - which logical type stores values of a given [`ValueType`].
//!
//! Value types resolve against an explicit, ranked list of matchers: the
//! exact name first, then each ancestor in order (nearest first). When two
//! handlers claim the same name, the one registered last wins.
//!
//! Native codes resolve the other way around: the first handler to claim a
//! code keeps it, so a custom type stored as `VARCHAR` never shadows
//! [`LogicalType::Varchar`] when reading a live schema. Codes nobody claims
//! resolve to [`LogicalType::Generic`].

use crate::{DatabaseFunction, DefaultValue, Value};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Native SQL type codes, JDBC numbering.
pub mod sql_types {
    pub const BIGINT: i32 = -5;
    pub const INTEGER: i32 = 4;
    pub const FLOAT: i32 = 6;
    pub const DOUBLE: i32 = 8;
    pub const VARCHAR: i32 = 12;
    pub const BOOLEAN: i32 = 16;
    pub const DATE: i32 = 91;
    pub const TIME: i32 = 92;
    pub const TIMESTAMP: i32 = 93;
    pub const OTHER: i32 = 1111;
    pub const BLOB: i32 = 2004;
    pub const CLOB: i32 = 2005;
}

/// Database-agnostic type tag for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Integer,
    Long,
    Double,
    Float,
    Boolean,
    Varchar,
    Clob,
    Timestamp,
    Date,
    Time,
    Blob,
    /// A reference to another entity's primary key.
    EntityReference,
    /// A type registered by the application, identified by name.
    Custom(&'static str),
    /// A native type no handler claims, identified by its SQL code.
    Generic(i32),
}

impl LogicalType {
    /// The built-in types, in registration order.
    pub const BUILTIN: [LogicalType; 12] = [
        LogicalType::Integer,
        LogicalType::Long,
        LogicalType::Double,
        LogicalType::Float,
        LogicalType::Boolean,
        LogicalType::Varchar,
        LogicalType::Clob,
        LogicalType::Timestamp,
        LogicalType::Date,
        LogicalType::Time,
        LogicalType::Blob,
        LogicalType::EntityReference,
    ];
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Integer => write!(f, "INTEGER"),
            LogicalType::Long => write!(f, "LONG"),
            LogicalType::Double => write!(f, "DOUBLE"),
            LogicalType::Float => write!(f, "FLOAT"),
            LogicalType::Boolean => write!(f, "BOOLEAN"),
            LogicalType::Varchar => write!(f, "VARCHAR"),
            LogicalType::Clob => write!(f, "CLOB"),
            LogicalType::Timestamp => write!(f, "TIMESTAMP"),
            LogicalType::Date => write!(f, "DATE"),
            LogicalType::Time => write!(f, "TIME"),
            LogicalType::Blob => write!(f, "BLOB"),
            LogicalType::EntityReference => write!(f, "ENTITY_REFERENCE"),
            LogicalType::Custom(name) => write!(f, "{}", name),
            LogicalType::Generic(code) => write!(f, "GENERIC({})", code),
        }
    }
}

/// Errors raised while resolving or converting types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeResolutionError {
    #[error("no type handler registered for value type `{0}`")]
    UnknownValueType(String),

    #[error("no type handler registered for logical type {0}")]
    Unregistered(LogicalType),

    #[error("cannot parse {input:?} as {ty}: {reason}")]
    Parse {
        ty: LogicalType,
        input: String,
        reason: String,
    },

    #[error("{ty} cannot hold a {found} value")]
    Mismatch { ty: LogicalType, found: &'static str },

    #[error("cannot access column `{column}`: {reason}")]
    Access { column: String, reason: String },
}

/// A source value type, as seen by the registry.
///
/// Rust has no runtime class hierarchy, so the "supertypes" of a value type
/// are listed explicitly, nearest first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueType {
    /// Fully qualified name.
    pub name: String,
    /// Ancestors, nearest first.
    pub ancestors: Vec<String>,
}

impl ValueType {
    /// Value type named after a Rust type.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::named(std::any::type_name::<T>())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ancestors: Vec::new(),
        }
    }

    /// Append an ancestor. Call in order from nearest to farthest.
    pub fn with_ancestor(mut self, name: impl Into<String>) -> Self {
        self.ancestors.push(name.into());
        self
    }
}

/// A row being read, addressed by column name.
pub trait RowCursor {
    fn get(&self, column: &str) -> Result<Value, TypeResolutionError>;
}

/// A statement being prepared, addressed by parameter position.
pub trait StatementSink {
    fn bind(&mut self, index: usize, value: Value) -> Result<(), TypeResolutionError>;
}

/// Behavior attached to a logical type.
///
/// Custom types implement this and are added with [`TypeRegistry::register`];
/// past that point nothing distinguishes them from built-ins.
pub trait TypeHandler: Send + Sync {
    fn logical_type(&self) -> LogicalType;

    /// Native SQL type code used to store this type.
    fn sql_type(&self) -> i32;

    /// Precision used when a field doesn't specify one (0 = none).
    fn default_precision(&self) -> u32 {
        0
    }

    /// Source value types this handler stores.
    fn value_types(&self) -> Vec<ValueType> {
        Vec::new()
    }

    /// Whether reading a column with [`sql_type`](Self::sql_type) may
    /// resolve to this type.
    fn claims_sql_type(&self) -> bool {
        true
    }

    /// Convert a value into this type's canonical representation.
    fn coerce(&self, value: Value) -> Result<Value, TypeResolutionError> {
        Ok(value)
    }

    fn serialize(&self, value: &Value) -> Result<String, TypeResolutionError> {
        Ok(self.coerce(value.clone())?.to_string())
    }

    fn parse(&self, input: &str) -> Result<Value, TypeResolutionError>;

    /// Compare two values of this type.
    fn value_equals(&self, a: &Value, b: &Value) -> bool {
        match (self.coerce(a.clone()), self.coerce(b.clone())) {
            (Ok(a), Ok(b)) => a == b,
            _ => a == b,
        }
    }

    fn read(&self, cursor: &dyn RowCursor, column: &str) -> Result<Value, TypeResolutionError> {
        self.coerce(cursor.get(column)?)
    }

    fn write(
        &self,
        statement: &mut dyn StatementSink,
        index: usize,
        value: &Value,
    ) -> Result<(), TypeResolutionError> {
        statement.bind(index, self.coerce(value.clone())?)
    }
}

/// Handler for the built-in logical types and for [`LogicalType::Generic`].
#[derive(Debug, Clone, Copy)]
struct Builtin(LogicalType);

impl TypeHandler for Builtin {
    fn logical_type(&self) -> LogicalType {
        self.0
    }

    fn sql_type(&self) -> i32 {
        match self.0 {
            LogicalType::Integer | LogicalType::EntityReference => sql_types::INTEGER,
            LogicalType::Long => sql_types::BIGINT,
            LogicalType::Double => sql_types::DOUBLE,
            LogicalType::Float => sql_types::FLOAT,
            LogicalType::Boolean => sql_types::BOOLEAN,
            LogicalType::Varchar => sql_types::VARCHAR,
            LogicalType::Clob => sql_types::CLOB,
            LogicalType::Timestamp => sql_types::TIMESTAMP,
            LogicalType::Date => sql_types::DATE,
            LogicalType::Time => sql_types::TIME,
            LogicalType::Blob => sql_types::BLOB,
            LogicalType::Custom(_) => sql_types::OTHER,
            LogicalType::Generic(code) => code,
        }
    }

    fn default_precision(&self) -> u32 {
        match self.0 {
            LogicalType::Varchar => 255,
            _ => 0,
        }
    }

    fn value_types(&self) -> Vec<ValueType> {
        match self.0 {
            LogicalType::Integer => vec![
                ValueType::of::<i32>(),
                ValueType::of::<i16>(),
                ValueType::of::<i8>(),
                ValueType::of::<u16>(),
                ValueType::of::<u8>(),
            ],
            LogicalType::Long => vec![ValueType::of::<i64>(), ValueType::of::<u32>()],
            LogicalType::Double => vec![ValueType::of::<f64>()],
            LogicalType::Float => vec![ValueType::of::<f32>()],
            LogicalType::Boolean => vec![ValueType::of::<bool>()],
            LogicalType::Varchar => vec![
                ValueType::of::<String>(),
                ValueType::of::<str>(),
                ValueType::of::<char>(),
            ],
            LogicalType::Timestamp => vec![ValueType::of::<NaiveDateTime>()],
            LogicalType::Date => vec![ValueType::of::<NaiveDate>()],
            LogicalType::Time => vec![ValueType::of::<NaiveTime>()],
            LogicalType::Blob => vec![ValueType::of::<Vec<u8>>(), ValueType::of::<[u8]>()],
            _ => Vec::new(),
        }
    }

    fn claims_sql_type(&self) -> bool {
        // Entity references borrow INTEGER storage; a live INTEGER column is
        // read back as INTEGER.
        self.0 != LogicalType::EntityReference
    }

    fn coerce(&self, value: Value) -> Result<Value, TypeResolutionError> {
        let ty = self.0;
        let mismatch = |found: &Value| TypeResolutionError::Mismatch {
            ty,
            found: found.kind(),
        };
        match (ty, value) {
            (_, Value::Null) => Ok(Value::Null),
            (LogicalType::Generic(_) | LogicalType::Custom(_), v) => Ok(v),
            (LogicalType::Varchar | LogicalType::Clob, Value::String(v)) => Ok(Value::String(v)),
            (_, Value::String(s)) => self.parse(&s),

            (LogicalType::Integer, Value::I32(v)) => Ok(Value::I32(v)),
            (LogicalType::Integer, Value::I64(v)) => i32::try_from(v)
                .map(Value::I32)
                .map_err(|_| mismatch(&Value::I64(v))),
            (LogicalType::Long | LogicalType::EntityReference, Value::I32(v)) => {
                Ok(Value::I64(v.into()))
            }
            (LogicalType::Long | LogicalType::EntityReference, Value::I64(v)) => Ok(Value::I64(v)),

            (LogicalType::Double, Value::F64(v)) => Ok(Value::F64(v)),
            (LogicalType::Double, Value::F32(v)) => Ok(Value::F64(v.into())),
            (LogicalType::Double, Value::I32(v)) => Ok(Value::F64(v.into())),
            (LogicalType::Double, Value::I64(v)) => Ok(Value::F64(v as f64)),
            (LogicalType::Float, Value::F32(v)) => Ok(Value::F32(v)),
            (LogicalType::Float, Value::F64(v)) => Ok(Value::F32(v as f32)),
            (LogicalType::Float, Value::I32(v)) => Ok(Value::F32(v as f32)),

            (LogicalType::Boolean, Value::Bool(v)) => Ok(Value::Bool(v)),
            (LogicalType::Boolean, Value::I32(0) | Value::I64(0)) => Ok(Value::Bool(false)),
            (LogicalType::Boolean, Value::I32(1) | Value::I64(1)) => Ok(Value::Bool(true)),

            (LogicalType::Blob, Value::Bytes(v)) => Ok(Value::Bytes(v)),

            (LogicalType::Timestamp, Value::Timestamp(v)) => Ok(Value::Timestamp(v)),
            (LogicalType::Timestamp, Value::Date(d)) => d
                .and_hms_opt(0, 0, 0)
                .map(Value::Timestamp)
                .ok_or_else(|| mismatch(&Value::Date(d))),
            (LogicalType::Date, Value::Date(v)) => Ok(Value::Date(v)),
            (LogicalType::Date, Value::Timestamp(v)) => Ok(Value::Date(v.date())),
            (LogicalType::Time, Value::Time(v)) => Ok(Value::Time(v)),
            (LogicalType::Time, Value::Timestamp(v)) => Ok(Value::Time(v.time())),

            (_, v) => Err(mismatch(&v)),
        }
    }

    fn parse(&self, input: &str) -> Result<Value, TypeResolutionError> {
        let ty = self.0;
        let err = |reason: String| TypeResolutionError::Parse {
            ty,
            input: input.to_owned(),
            reason,
        };
        let trimmed = input.trim();
        match ty {
            LogicalType::Integer => trimmed
                .parse::<i32>()
                .map(Value::I32)
                .map_err(|e| err(e.to_string())),
            LogicalType::Long | LogicalType::EntityReference => trimmed
                .parse::<i64>()
                .map(Value::I64)
                .map_err(|e| err(e.to_string())),
            LogicalType::Double => trimmed
                .parse::<f64>()
                .map(Value::F64)
                .map_err(|e| err(e.to_string())),
            LogicalType::Float => trimmed
                .parse::<f32>()
                .map(Value::F32)
                .map_err(|e| err(e.to_string())),
            LogicalType::Boolean => parse_bool(trimmed)
                .map(Value::Bool)
                .ok_or_else(|| err("expected a boolean literal".to_owned())),
            LogicalType::Varchar
            | LogicalType::Clob
            | LogicalType::Custom(_)
            | LogicalType::Generic(_) => Ok(Value::String(input.to_owned())),
            LogicalType::Timestamp => parse_timestamp(trimmed)
                .map(Value::Timestamp)
                .map_err(|e| err(e.to_string())),
            LogicalType::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|e| err(e.to_string())),
            LogicalType::Time => NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f")
                .map(Value::Time)
                .map_err(|e| err(e.to_string())),
            LogicalType::Blob => decode_hex(trimmed)
                .map(Value::Bytes)
                .ok_or_else(|| err("expected hex-encoded bytes".to_owned())),
        }
    }
}

fn parse_bool(input: &str) -> Option<bool> {
    match input.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn parse_timestamp(input: &str) -> chrono::ParseResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f"))
}

fn decode_hex(input: &str) -> Option<Vec<u8>> {
    let digits = input.strip_prefix("\\x").unwrap_or(input);
    if digits.len() % 2 != 0 || !digits.is_ascii() {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}

#[derive(Debug, Clone)]
struct ValueMatcher {
    value_type: String,
    logical_type: LogicalType,
}

/// Registry of type handlers.
///
/// Owned explicitly and passed to the reader, generator and differ; there is
/// no process-wide instance.
#[derive(Clone)]
pub struct TypeRegistry {
    handlers: IndexMap<LogicalType, Arc<dyn TypeHandler>>,
    by_sql_type: HashMap<i32, LogicalType>,
    /// In registration order; later entries win ties.
    value_matchers: Vec<ValueMatcher>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TypeRegistry {
    /// An empty registry. Only generic types resolve.
    pub fn empty() -> Self {
        Self {
            handlers: IndexMap::new(),
            by_sql_type: HashMap::new(),
            value_matchers: Vec::new(),
        }
    }

    /// A registry holding every built-in logical type.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for ty in LogicalType::BUILTIN {
            registry.register(Builtin(ty));
        }
        registry
    }

    /// Register a handler.
    ///
    /// Replaces any handler previously registered for the same logical type.
    pub fn register<H: TypeHandler + 'static>(&mut self, handler: H) -> &mut Self {
        let ty = handler.logical_type();
        if handler.claims_sql_type() {
            self.by_sql_type.entry(handler.sql_type()).or_insert(ty);
        }
        for value_type in handler.value_types() {
            self.value_matchers.push(ValueMatcher {
                value_type: value_type.name,
                logical_type: ty,
            });
        }
        self.handlers.insert(ty, Arc::new(handler));
        self
    }

    /// Registered logical types, in registration order.
    pub fn logical_types(&self) -> impl Iterator<Item = LogicalType> + '_ {
        self.handlers.keys().copied()
    }

    /// Handler for an explicitly requested logical type.
    pub fn handler(&self, ty: LogicalType) -> Result<Arc<dyn TypeHandler>, TypeResolutionError> {
        if let Some(handler) = self.handlers.get(&ty) {
            return Ok(Arc::clone(handler));
        }
        match ty {
            LogicalType::Generic(_) => Ok(Arc::new(Builtin(ty))),
            _ => Err(TypeResolutionError::Unregistered(ty)),
        }
    }

    /// Logical type for a native SQL type code.
    pub fn resolve_sql_type(&self, code: i32) -> LogicalType {
        self.by_sql_type
            .get(&code)
            .copied()
            .unwrap_or(LogicalType::Generic(code))
    }

    /// Logical type storing values of `value_type`.
    pub fn resolve_value_type(
        &self,
        value_type: &ValueType,
    ) -> Result<LogicalType, TypeResolutionError> {
        std::iter::once(&value_type.name)
            .chain(&value_type.ancestors)
            .find_map(|name| {
                self.value_matchers
                    .iter()
                    .rev()
                    .find(|m| &m.value_type == name)
                    .map(|m| m.logical_type)
            })
            .ok_or_else(|| TypeResolutionError::UnknownValueType(value_type.name.clone()))
    }

    /// Logical type storing values of the Rust type `T`.
    pub fn resolve<T: ?Sized + 'static>(&self) -> Result<LogicalType, TypeResolutionError> {
        self.resolve_value_type(&ValueType::of::<T>())
    }

    pub fn sql_type(&self, ty: LogicalType) -> Result<i32, TypeResolutionError> {
        Ok(self.handler(ty)?.sql_type())
    }

    pub fn default_precision(&self, ty: LogicalType) -> u32 {
        self.handler(ty).map(|h| h.default_precision()).unwrap_or(0)
    }

    /// Whether two logical types share native storage.
    pub fn storage_equivalent(&self, a: LogicalType, b: LogicalType) -> bool {
        if a == b {
            return true;
        }
        match (self.sql_type(a), self.sql_type(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// Parse a textual default expression for a column of type `ty`.
    ///
    /// `NULL` and the date/time function keywords are recognized before the
    /// handler sees the input.
    pub fn parse_default(
        &self,
        ty: LogicalType,
        input: &str,
    ) -> Result<DefaultValue, TypeResolutionError> {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("NULL") {
            return Ok(DefaultValue::Null);
        }
        if let Some(function) = DatabaseFunction::parse(trimmed) {
            return Ok(DefaultValue::Function(function));
        }
        Ok(DefaultValue::Value(self.handler(ty)?.parse(input)?))
    }

    /// Compare two optional defaults of a column of type `ty`.
    pub fn defaults_equal(
        &self,
        ty: LogicalType,
        a: Option<&DefaultValue>,
        b: Option<&DefaultValue>,
    ) -> bool {
        match (a, b) {
            (Some(DefaultValue::Value(a)), Some(DefaultValue::Value(b))) => match self.handler(ty) {
                Ok(handler) => handler.value_equals(a, b),
                Err(_) => a == b,
            },
            (a, b) => a == b,
        }
    }
}
