//! Typed config values supplied as defaults and returned from evaluations.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

/// A config value as seen by application code.
///
/// The variant of the default passed to `get_value`/`watch` decides which
/// [`RequestedType`] the evaluation runs with.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Boolean(bool),
    Number(f64),
    /// Object-shaped defaults (JSON documents, URLs, enum wrappers).
    Json(Value),
}

/// Shape the caller asked for, derived from the runtime variant of the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedType {
    String,
    Boolean,
    Number,
    Object,
}

impl RequestedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestedType::String => "string",
            RequestedType::Boolean => "boolean",
            RequestedType::Number => "number",
            RequestedType::Object => "object",
        }
    }
}

impl ConfigValue {
    pub fn requested_type(&self) -> RequestedType {
        match self {
            ConfigValue::String(_) => RequestedType::String,
            ConfigValue::Boolean(_) => RequestedType::Boolean,
            ConfigValue::Number(_) => RequestedType::Number,
            ConfigValue::Json(_) => RequestedType::Object,
        }
    }

    /// Rejects defaults that carry no value at all.
    pub fn validate(&self) -> Result<(), ClientError> {
        match self {
            ConfigValue::Json(Value::Null) => Err(ClientError::Validation(
                "Invalid default value. The default value for a config must be defined and non-null."
                    .to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ConfigValue::Json(v) => Some(v),
            _ => None,
        }
    }

    /// JSON form used when hashing values of declared type `json`.
    pub(crate) fn to_json_string(&self) -> String {
        let value = match self {
            ConfigValue::String(s) => Value::String(s.clone()),
            ConfigValue::Boolean(b) => Value::Bool(*b),
            ConfigValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ConfigValue::Json(v) => v.clone(),
        };
        value.to_string()
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::String(s) => f.write_str(s),
            ConfigValue::Boolean(b) => write!(f, "{b}"),
            ConfigValue::Number(n) => write!(f, "{n}"),
            ConfigValue::Json(Value::String(s)) => f.write_str(s),
            ConfigValue::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Boolean(value)
    }
}

macro_rules! impl_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ConfigValue {
                fn from(value: $t) -> Self {
                    ConfigValue::Number(value as f64)
                }
            }
        )*
    };
}

impl_from_number!(f32, f64, i32, i64, u32, u64);

impl From<Value> for ConfigValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => ConfigValue::String(s),
            Value::Bool(b) => ConfigValue::Boolean(b),
            Value::Number(n) => match n.as_f64() {
                Some(f) => ConfigValue::Number(f),
                None => ConfigValue::Json(Value::Number(n)),
            },
            other => ConfigValue::Json(other),
        }
    }
}

impl From<reqwest::Url> for ConfigValue {
    fn from(value: reqwest::Url) -> Self {
        ConfigValue::Json(Value::String(value.to_string()))
    }
}
