//! Versioned wrapper persisted once per feed item.
//!
//! On disk an envelope is stored as `{"acp": {...}}` so that other record
//! types can share the same table without colliding.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ids::FeedId;

pub const ENVELOPE_VERSION: u32 = 1;
const WRAPPER_KEY: &str = "acp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Message,
    Tool,
    Plan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEnvelope {
    pub version: u32,
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub feed_id: FeedId,
    /// Absent on records written before sequences were assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub item: Value,
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("record is not an envelope (missing `{WRAPPER_KEY}` object)")]
    NotAnEnvelope,
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u64),
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl PersistedEnvelope {
    #[must_use]
    pub fn to_record(&self) -> Value {
        let mut wrapper = Map::new();
        wrapper.insert(
            WRAPPER_KEY.to_string(),
            serde_json::to_value(self).unwrap_or(Value::Null),
        );
        Value::Object(wrapper)
    }

    /// Parse a stored record. The version is checked before the body so a
    /// future layout is reported as such rather than as malformed.
    pub fn from_record(record: &Value) -> Result<Self, EnvelopeError> {
        let inner = record
            .get(WRAPPER_KEY)
            .filter(|inner| inner.is_object())
            .ok_or(EnvelopeError::NotAnEnvelope)?;
        match inner.get("version").and_then(Value::as_u64) {
            Some(version) if version == u64::from(ENVELOPE_VERSION) => {}
            Some(version) => return Err(EnvelopeError::UnsupportedVersion(version)),
            None => return Err(EnvelopeError::UnsupportedVersion(0)),
        }
        Ok(Self::deserialize(inner)?)
    }
}
