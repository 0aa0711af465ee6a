use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Wire shape of a queued message: `{ type, meta, occurredAt }`. Kept as a
/// plain struct with an untyped `meta` on the wire (matching spec.md's data
/// model bit-exactly) and a typed `MutationKind` derived from it for
/// dispatch — this is the "dynamic message typing... reimplement as a
/// tagged variant... open `Unknown` variant" design note from spec.md §9.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub meta: serde_json::Value,
    #[serde(rename = "occurredAt")]
    pub occurred_at: DateTime<Utc>,
}

impl Message {
    pub fn new(msg_type: impl Into<String>, meta: serde_json::Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            meta,
            occurred_at: Utc::now(),
        }
    }

    /// Serialize to the exact byte string used both for `LPUSH`/`LMOVE` and
    /// as the `LREM` match token in `confirm`. Must round-trip losslessly —
    /// no field reordering after this point.
    pub fn to_wire(&self) -> Result<String> {
        serde_json::to_string(self).map_err(StoreError::from)
    }

    pub fn from_wire(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(StoreError::from)
    }

    /// Dispatch view used by the processor's `apply()`. Unrecognized types
    /// (or a recognized type with a malformed `meta`) decode to `Unknown`
    /// rather than failing — spec.md's "log warning, treat as success,
    /// confirm" path for forward compatibility.
    pub fn kind(&self) -> MutationKind {
        let decode = |value: &serde_json::Value| serde_json::from_value(value.clone()).ok();

        match self.msg_type.as_str() {
            "WRITE_SIMPLE_VALUE" => decode(&self.meta)
                .map(MutationKind::WriteSimpleValue)
                .unwrap_or_else(|| MutationKind::Unknown(self.msg_type.clone())),
            "WRITE_STATE_OBJECT" => decode(&self.meta)
                .map(MutationKind::WriteStateObject)
                .unwrap_or_else(|| MutationKind::Unknown(self.msg_type.clone())),
            "WRITE_HASHMAP_VALUE" => decode(&self.meta)
                .map(MutationKind::WriteHashmapValue)
                .unwrap_or_else(|| MutationKind::Unknown(self.msg_type.clone())),
            "ADD_STRINGS_TO_SET" => decode(&self.meta)
                .map(MutationKind::AddStringsToSet)
                .unwrap_or_else(|| MutationKind::Unknown(self.msg_type.clone())),
            "REMOVE_STRINGS_FROM_SET" => decode(&self.meta)
                .map(MutationKind::RemoveStringsFromSet)
                .unwrap_or_else(|| MutationKind::Unknown(self.msg_type.clone())),
            other => MutationKind::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WriteSimpleValueMeta {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WriteStateObjectMeta {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WriteHashmapValueMeta {
    pub key: String,
    pub field: String,
    /// `null` maps to `HDEL` of `field` (spec.md §9's resolution of the
    /// "leaked tombstone" ambiguity).
    pub value: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SetMeta {
    pub key: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationKind {
    WriteSimpleValue(WriteSimpleValueMeta),
    WriteStateObject(WriteStateObjectMeta),
    WriteHashmapValue(WriteHashmapValueMeta),
    AddStringsToSet(SetMeta),
    RemoveStringsFromSet(SetMeta),
    Unknown(String),
}

/// A popped message paired with the exact handle needed to confirm it.
#[derive(Debug, Clone)]
pub struct MessageWithHandle {
    pub message: Message,
    pub handle: String,
}
