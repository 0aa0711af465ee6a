//! Thin JSON codec used anywhere a structured value has to round-trip
//! through a backend string field (`STATE` snapshots, delta payloads, and
//! any caller-supplied value that isn't already a plain string). Symmetric
//! by construction: whatever `encode` produces, `decode` accepts.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

pub fn encode<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T> {
    Ok(serde_json::from_str(raw)?)
}
