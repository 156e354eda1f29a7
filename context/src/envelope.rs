//! Building sanitized envelopes from feed snapshots.
//!
//! Everything written to storage passes through [`envelope_for`]. Large or
//! sensitive payloads are reduced before serialization: long text is capped,
//! binary media is replaced by a marker, tool output is dropped and tool
//! input keeps only an allow-listed set of keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use weft_core::FeedRecord;
use weft_types::{
    ContentBlock, ENVELOPE_VERSION, EnvelopeKind, FeedId, FeedItemKind, PersistedEnvelope,
    ToolCall, ToolCallContent,
};
use weft_utils::{cap_chars, cap_chars_tail};

const TRUNCATION_SUFFIX: &str = "\n… [truncated]";
const TERMINAL_MARKER: &str = "… [earlier output truncated]\n";
/// Stands in for image and audio payloads.
pub const OMITTED_DATA: &str = "[omitted]";

pub const DEFAULT_RAW_INPUT_KEYS: &[&str] = &[
    "path",
    "file_path",
    "filePath",
    "command",
    "cmd",
    "pattern",
    "query",
    "url",
    "description",
    "title",
    "cwd",
];

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("feed item `{0}` is never persisted")]
    NotPersistable(FeedId),
    #[error("failed to encode feed record: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizeLimits {
    pub max_text_chars: usize,
    pub max_diff_chars: usize,
    pub max_terminal_chars: usize,
    pub raw_input_keys: Vec<String>,
}

impl Default for SanitizeLimits {
    fn default() -> Self {
        Self {
            max_text_chars: 16_000,
            max_diff_chars: 64_000,
            max_terminal_chars: 32_000,
            raw_input_keys: DEFAULT_RAW_INPUT_KEYS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Provenance stamped on every envelope of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeMeta {
    pub provider_id: Option<String>,
    pub session_id: Option<String>,
}

pub fn envelope_for(
    mut record: FeedRecord,
    meta: &EnvelopeMeta,
    limits: &SanitizeLimits,
) -> Result<PersistedEnvelope, PersistenceError> {
    let kind = match &record.item.kind {
        FeedItemKind::Message(_) => EnvelopeKind::Message,
        FeedItemKind::ToolCall { .. } => EnvelopeKind::Tool,
        FeedItemKind::Plan { .. } => EnvelopeKind::Plan,
        FeedItemKind::PermissionRequest { .. } => {
            return Err(PersistenceError::NotPersistable(record.item.id));
        }
    };
    sanitize_record(&mut record, limits);

    Ok(PersistedEnvelope {
        version: ENVELOPE_VERSION,
        kind,
        feed_id: record.item.id.clone(),
        sequence: Some(record.item.sequence),
        created_at: record.item.created_at_ms,
        provider_id: meta.provider_id.clone(),
        session_id: meta.session_id.clone(),
        item: serde_json::to_value(&record)?,
    })
}

fn sanitize_record(record: &mut FeedRecord, limits: &SanitizeLimits) {
    match &mut record.item.kind {
        FeedItemKind::Message(message) => {
            message.streaming = false;
            message.run_duration_ms = None;
            for block in &mut message.blocks {
                sanitize_block(block, limits);
            }
        }
        FeedItemKind::Plan { entries } => {
            for entry in entries {
                cap_in_place(&mut entry.content, limits.max_text_chars, TRUNCATION_SUFFIX);
            }
        }
        FeedItemKind::ToolCall { .. } | FeedItemKind::PermissionRequest { .. } => {}
    }

    if let Some(call) = &mut record.tool_call {
        sanitize_tool_call(call, limits);
    }
    for output in record.terminal_output.values_mut() {
        if output.chars().count() > limits.max_terminal_chars {
            *output = cap_chars_tail(output, limits.max_terminal_chars, TERMINAL_MARKER)
                .into_owned();
        }
    }
}

fn sanitize_tool_call(call: &mut ToolCall, limits: &SanitizeLimits) {
    call.raw_output = None;
    call.raw_input = call
        .raw_input
        .take()
        .and_then(|input| allowed_input(input, limits));

    for entry in &mut call.content {
        match entry {
            ToolCallContent::Content { content } => sanitize_block(content, limits),
            ToolCallContent::Diff {
                old_text, new_text, ..
            } => {
                if let Some(old) = old_text {
                    cap_in_place(old, limits.max_diff_chars, TRUNCATION_SUFFIX);
                }
                cap_in_place(new_text, limits.max_diff_chars, TRUNCATION_SUFFIX);
            }
            ToolCallContent::Terminal { .. } => {}
        }
    }
}

/// Keep only allow-listed keys of an object input; a bare string input is
/// kept capped; anything else is dropped.
fn allowed_input(input: Value, limits: &SanitizeLimits) -> Option<Value> {
    match input {
        Value::Object(fields) => {
            let kept: Map<String, Value> = fields
                .into_iter()
                .filter(|(key, _)| limits.raw_input_keys.iter().any(|allowed| allowed == key))
                .map(|(key, value)| (key, cap_value(value, limits.max_text_chars)))
                .collect();
            (!kept.is_empty()).then_some(Value::Object(kept))
        }
        Value::String(text) => Some(cap_value(Value::String(text), limits.max_text_chars)),
        _ => None,
    }
}

fn cap_value(value: Value, max_chars: usize) -> Value {
    match value {
        Value::String(mut text) => {
            cap_in_place(&mut text, max_chars, TRUNCATION_SUFFIX);
            Value::String(text)
        }
        other => other,
    }
}

fn sanitize_block(block: &mut ContentBlock, limits: &SanitizeLimits) {
    match block {
        ContentBlock::Text { text } => cap_in_place(text, limits.max_text_chars, TRUNCATION_SUFFIX),
        ContentBlock::Image { data, .. } | ContentBlock::Audio { data, .. } => {
            if !data.is_empty() {
                *data = OMITTED_DATA.to_string();
            }
        }
        ContentBlock::Resource { resource } => {
            resource.blob = None;
            if let Some(text) = &mut resource.text {
                cap_in_place(text, limits.max_text_chars, TRUNCATION_SUFFIX);
            }
        }
        ContentBlock::ResourceLink { .. } => {}
    }
}

fn cap_in_place(text: &mut String, max_chars: usize, suffix: &str) {
    if text.chars().count() > max_chars {
        *text = cap_chars(text, max_chars, suffix).into_owned();
    }
}
