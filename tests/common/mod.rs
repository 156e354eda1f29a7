//! Shared test utilities and fixtures

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedReceiver;

use weft_context::SqliteFeedStore;
use weft_core::FeedLimits;
use weft_engine::{ChannelTransport, OutboundRequest, SessionRegistry, SessionSettings, SharedStore};
use weft_types::FeedItem;

/// A registry over an on-disk database at `path`.
pub fn registry_at(path: &Path, settings: SessionSettings) -> SessionRegistry {
    let store: SharedStore = Arc::new(Mutex::new(SqliteFeedStore::open(path).unwrap()));
    SessionRegistry::new(store, settings, FeedLimits::default())
}

pub fn agent() -> (Box<ChannelTransport>, UnboundedReceiver<OutboundRequest>) {
    let (transport, rx) = ChannelTransport::new();
    (Box::new(transport), rx)
}

pub fn drain(rx: &mut UnboundedReceiver<OutboundRequest>) -> Vec<OutboundRequest> {
    let mut out = Vec::new();
    while let Ok(request) = rx.try_recv() {
        out.push(request);
    }
    out
}

pub fn agent_chunk(text: &str) -> Value {
    json!({
        "type": "session_update",
        "update": {"sessionUpdate": "agent_message_chunk", "content": {"type": "text", "text": text}}
    })
}

pub fn thought_chunk(text: &str) -> Value {
    json!({
        "type": "session_update",
        "update": {"sessionUpdate": "agent_thought_chunk", "content": {"type": "text", "text": text}}
    })
}

pub fn tool_update(id: &str, status: &str) -> Value {
    json!({
        "type": "session_update",
        "update": {"sessionUpdate": "tool_call_update", "toolCallId": id, "status": status}
    })
}

pub fn started(options: Value) -> Value {
    json!({"type": "session_started", "sessionId": "acp-1", "configOptions": options})
}

/// Feed items with the fields that are never persisted cleared.
pub fn comparable(items: &[FeedItem]) -> Vec<FeedItem> {
    items
        .iter()
        .cloned()
        .map(|mut item| {
            if let Some(message) = item.kind.as_message_mut() {
                message.streaming = false;
                message.run_duration_ms = None;
            }
            item
        })
        .collect()
}
