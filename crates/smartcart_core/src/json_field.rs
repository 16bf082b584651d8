//! crates/smartcart_core/src/json_field.rs
//!
//! Normalization of JSON columns that the backend may deliver either as
//! JSON-encoded text or as already-structured values.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

/// The two shapes a stored JSON field can arrive in, plus absence.
#[derive(Debug, Clone, PartialEq)]
pub enum RawJson {
    /// `null` or no value at all.
    Missing,
    /// JSON-encoded text that still has to be parsed.
    Text(String),
    /// A value the store already decoded.
    Structured(Value),
}

impl From<Value> for RawJson {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RawJson::Missing,
            Value::String(text) => RawJson::Text(text),
            other => RawJson::Structured(other),
        }
    }
}

impl From<&Value> for RawJson {
    fn from(value: &Value) -> Self {
        RawJson::from(value.clone())
    }
}

impl From<Option<Value>> for RawJson {
    fn from(value: Option<Value>) -> Self {
        value.map_or(RawJson::Missing, RawJson::from)
    }
}

impl From<Option<&Value>> for RawJson {
    fn from(value: Option<&Value>) -> Self {
        value.map_or(RawJson::Missing, RawJson::from)
    }
}

impl From<&str> for RawJson {
    fn from(text: &str) -> Self {
        RawJson::Text(text.to_string())
    }
}

impl RawJson {
    /// Decodes the field into `T`, or `None` when it is missing or malformed.
    ///
    /// Malformed text and shape mismatches are logged, never propagated.
    pub fn decode<T: DeserializeOwned>(self) -> Option<T> {
        match self {
            RawJson::Missing => None,
            RawJson::Text(text) => match serde_json::from_str::<T>(&text) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!(error = %e, "Failed to parse JSON string field");
                    None
                }
            },
            RawJson::Structured(value) => match serde_json::from_value::<T>(value) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!(error = %e, "JSON field has an unexpected shape");
                    None
                }
            },
        }
    }
}

/// Normalizes a raw JSON field, returning `default` when it is absent or unusable.
pub fn parse_json_field<T: DeserializeOwned>(raw: impl Into<RawJson>, default: T) -> T {
    raw.into().decode().unwrap_or(default)
}

/// `deserialize_with` helper for optional fields that may be stored as JSON text.
pub fn deserialize_json_field<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(RawJson::from(raw).decode())
}
