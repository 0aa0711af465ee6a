use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A versioned snapshot stored under `<ns>-STATE-<key>`. `version` strictly
/// increases by +1 per successful write and is never reused within a single
/// chain (a write of `{}` deletes the record and resets the chain).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateVersion<T> {
    pub version: i64,
    #[serde(rename = "writtenAt")]
    pub written_at: DateTime<Utc>,
    pub value: T,
}

impl<T> StateVersion<T> {
    pub fn new(version: i64, value: T) -> Self {
        Self {
            version,
            written_at: Utc::now(),
            value,
        }
    }
}

/// Structural delta published on `<ns>-STATE-<key>-DELTA` after every
/// successful versioned write. Exactly one `DiffMessage` exists per
/// persisted `StateVersion` with `to_version == version`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiffMessage {
    #[serde(rename = "fromVersion")]
    pub from_version: i64,
    #[serde(rename = "toVersion")]
    pub to_version: i64,
    #[serde(rename = "writtenAt")]
    pub written_at: DateTime<Utc>,
    #[serde(rename = "deltaPayload")]
    pub delta_payload: serde_json::Value,
}

impl DiffMessage {
    pub fn new(from_version: i64, delta_payload: serde_json::Value) -> Self {
        Self {
            from_version,
            to_version: from_version + 1,
            written_at: Utc::now(),
            delta_payload,
        }
    }
}
