//! Content blocks carried by messages and tool call output.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single block of message content, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        mime_type: String,
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Audio { mime_type: String, data: String },
    Resource { resource: EmbeddedResource },
    #[serde(rename_all = "camelCase")]
    ResourceLink {
        uri: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<u64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedResource {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

impl ContentBlock {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Parse a block from an arbitrary JSON value.
    ///
    /// Accepts the tagged wire shape, a bare string, a flat `resource` block
    /// (uri at the top level) and untagged objects carrying `text`. Anything
    /// else yields `None`.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        if let Some(text) = value.as_str() {
            return Some(Self::text(text));
        }
        let obj = value.as_object()?;
        if let Ok(block) = serde_json::from_value::<Self>(value.clone()) {
            return Some(block);
        }
        let kind = obj.get("type").and_then(Value::as_str);
        if kind == Some("resource")
            && let Some(uri) = obj.get("uri").and_then(Value::as_str)
        {
            let field = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
            return Some(Self::Resource {
                resource: EmbeddedResource {
                    uri: uri.to_string(),
                    mime_type: field("mimeType").or_else(|| field("mime_type")),
                    text: field("text"),
                    blob: field("blob"),
                },
            });
        }
        obj.get("text").and_then(Value::as_str).map(Self::text)
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Audio { .. } => "audio",
            Self::Resource { .. } => "resource",
            Self::ResourceLink { .. } => "resource_link",
        }
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Secondary classification of a message. Absent for ordinary replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Agent reasoning ("thinking") output.
    Thought,
    /// A session error surfaced into the conversation.
    Error,
}
