use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Values that can be bound as statement parameters or returned in result
/// rows.
///
/// This enum provides a unified representation of database values on both
/// sides of the bridge boundary. The wire shape is plain JSON: `Null`
/// serializes as `null`, numbers as numbers, text as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// NULL value
    Null,
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
}

impl SqlValue {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        if let SqlValue::Int(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        if let SqlValue::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        if let SqlValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    /// Coerce an arbitrary displayable value to its text form.
    ///
    /// Parameter lists only carry null, number, and text values; anything
    /// without a native representation is stringified.
    pub fn stringified(value: impl std::fmt::Display) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::stringified(value)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(inner) => inner.into(),
            None => SqlValue::Null,
        }
    }
}

impl From<JsonValue> for SqlValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => SqlValue::Null,
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    SqlValue::Float(f)
                } else {
                    SqlValue::Text(n.to_string())
                }
            }
            JsonValue::String(s) => SqlValue::Text(s),
            other => SqlValue::Text(other.to_string()),
        }
    }
}
