use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{AnnalError, AnnalResult};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueType {
    Bool = 1,
    I32 = 2,
    I64 = 3,
    F64 = 4,
    Str = 5,
    Bytes = 6,
    Json = 7,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
    Json(JsonValue),
    /// Only meaningful as the single argument of an IN / NOT IN rule.
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null | Value::List(_) => None,
            Value::Bool(_) => Some(ValueType::Bool),
            Value::I32(_) => Some(ValueType::I32),
            Value::I64(_) => Some(ValueType::I64),
            Value::F64(_) => Some(ValueType::F64),
            Value::Str(_) => Some(ValueType::Str),
            Value::Bytes(_) => Some(ValueType::Bytes),
            Value::Json(_) => Some(ValueType::Json),
        }
    }

    pub fn into_bool(self) -> AnnalResult<bool> {
        match self {
            Value::Bool(value) => Ok(value),
            Value::I32(value) => Ok(value != 0),
            Value::I64(value) => Ok(value != 0),
            other => Err(mismatch("bool", &other)),
        }
    }

    pub fn into_i32(self) -> AnnalResult<i32> {
        match self {
            Value::I32(value) => Ok(value),
            Value::I64(value) => i32::try_from(value)
                .map_err(|_| AnnalError::encoding(format!("{value} does not fit in i32"))),
            other => Err(mismatch("i32", &other)),
        }
    }

    pub fn into_i64(self) -> AnnalResult<i64> {
        match self {
            Value::I32(value) => Ok(i64::from(value)),
            Value::I64(value) => Ok(value),
            other => Err(mismatch("i64", &other)),
        }
    }

    pub fn into_f64(self) -> AnnalResult<f64> {
        match self {
            Value::F64(value) => Ok(value),
            Value::I32(value) => Ok(f64::from(value)),
            Value::I64(value) => Ok(value as f64),
            other => Err(mismatch("f64", &other)),
        }
    }

    pub fn into_string(self) -> AnnalResult<String> {
        match self {
            Value::Str(value) => Ok(value),
            other => Err(mismatch("string", &other)),
        }
    }

    pub fn into_bytes(self) -> AnnalResult<Vec<u8>> {
        match self {
            Value::Bytes(value) => Ok(value),
            other => Err(mismatch("bytes", &other)),
        }
    }

    pub fn into_json(self) -> AnnalResult<JsonValue> {
        match self {
            Value::Json(value) => Ok(value),
            Value::Str(raw) => serde_json::from_str(&raw)
                .map_err(|err| AnnalError::encoding(format!("json column: {err}"))),
            other => Err(mismatch("json", &other)),
        }
    }

    /// Parses a stored enumerant name back into `E`.
    pub fn into_enumerant<E: Enumerant>(self) -> AnnalResult<E> {
        let name = self.into_string()?;
        E::from_name(&name)
            .ok_or_else(|| AnnalError::encoding(format!("unknown enumerant '{name}'")))
    }
}

fn mismatch(expected: &str, actual: &Value) -> AnnalError {
    AnnalError::encoding(format!("expected {expected} value, got {actual:?}"))
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        Value::Json(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Enumerated property values are persisted by name.
pub trait Enumerant: Sized {
    fn name(&self) -> &'static str;
    fn from_name(name: &str) -> Option<Self>;
}

/// One result row: ordered column/value pairs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push((column.into(), value.into()));
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    /// Case-insensitive lookup.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

/// Identity value assigned by the store during an insert.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum GeneratedKey {
    Int(i32),
    BigInt(i64),
    Text(String),
}

impl GeneratedKey {
    /// Narrows to `Int` when the key fits.
    pub fn from_i64(value: i64) -> Self {
        match i32::try_from(value) {
            Ok(narrow) => GeneratedKey::Int(narrow),
            Err(_) => GeneratedKey::BigInt(value),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GeneratedKey::Int(value) => Some(i64::from(*value)),
            GeneratedKey::BigInt(value) => Some(*value),
            GeneratedKey::Text(_) => None,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            GeneratedKey::Int(value) => Value::I32(value),
            GeneratedKey::BigInt(value) => Value::I64(value),
            GeneratedKey::Text(value) => Value::Str(value),
        }
    }
}
