//! Bind values for compiled queries.

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

/// A parameter value bound to a compiled statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(JsonValue),
    Timestamp(NaiveDateTime),
    /// Operand of membership operators; flattened into one parameter per item.
    List(Vec<Value>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True for the values an auto-increment key column treats as "unset".
    pub fn is_zero_key(&self) -> bool {
        matches!(self, Self::Null | Self::Int(0))
    }

    /// Get the type name of this value for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
            Self::Timestamp(_) => "timestamp",
            Self::List(_) => "list",
        }
    }

    /// Items of a membership operand. Scalars count as a single item.
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Self::List(items) => items,
            Self::Null => Vec::new(),
            other => vec![other],
        }
    }

    /// Render the value as an inline SQL literal.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Text(v) => quote(v),
            Self::Bytes(v) => quote(&String::from_utf8_lossy(v)),
            Self::Json(v) => quote(&v.to_string()),
            Self::Timestamp(v) => quote(&v.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Self::List(items) => {
                let rendered: Vec<String> = items.iter().map(Value::to_sql_literal).collect();
                format!("({})", rendered.join(", "))
            }
        }
    }

    /// Normalise a value for the map-based update path.
    ///
    /// Composite values are stored as their JSON encoding and floats as their
    /// shortest fixed-point decimal string.
    pub fn into_update_value(self) -> Value {
        match self {
            Self::Json(v @ (JsonValue::Array(_) | JsonValue::Object(_))) => {
                Self::Text(v.to_string())
            }
            Self::Json(JsonValue::Number(n)) if n.is_f64() => {
                Self::Text(n.as_f64().map(|f| f.to_string()).unwrap_or_default())
            }
            Self::Json(JsonValue::Number(n)) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Text(n.to_string()),
            },
            Self::Json(JsonValue::String(s)) => Self::Text(s),
            Self::Json(JsonValue::Bool(b)) => Self::Bool(b),
            Self::Json(JsonValue::Null) => Self::Null,
            Self::List(items) => {
                let json: Vec<JsonValue> = items.into_iter().map(Value::into_json).collect();
                Self::Text(JsonValue::Array(json).to_string())
            }
            Self::Float(f) => Self::Text(f.to_string()),
            other => other,
        }
    }

    /// JSON representation of the value.
    pub fn into_json(self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(b),
            Self::Int(i) => JsonValue::from(i),
            Self::Float(f) => serde_json::Number::from_f64(f)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(f.to_string())),
            Self::Text(s) => JsonValue::String(s),
            Self::Bytes(b) => JsonValue::from(b),
            Self::Json(v) => v,
            Self::Timestamp(t) => JsonValue::String(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Self::List(items) => JsonValue::Array(items.into_iter().map(Value::into_json).collect()),
        }
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        Self::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(v: &[T]) -> Self {
        Self::List(v.iter().cloned().map(Into::into).collect())
    }
}
