//! Tool call aggregate and its partial update form.
//!
//! A `ToolCall` is created on the first `tool_call`/`tool_call_update` that
//! names its id and is mutated by every later update until it reaches a
//! terminal status.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::ContentBlock;
use crate::ids::{TerminalId, ToolCallId};

/// Category of action a tool call performs. Unknown strings map to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum ToolKind {
    Read,
    Edit,
    Delete,
    Move,
    Search,
    Execute,
    Think,
    Fetch,
    SwitchMode,
    Other,
}

impl From<String> for ToolKind {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl ToolKind {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "read" => Self::Read,
            "edit" => Self::Edit,
            "delete" => Self::Delete,
            "move" => Self::Move,
            "search" => Self::Search,
            "execute" => Self::Execute,
            "think" => Self::Think,
            "fetch" => Self::Fetch,
            "switch_mode" | "switchmode" => Self::SwitchMode,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum ToolCallStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl From<String> for ToolCallStatus {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl ToolCallStatus {
    /// Lenient parse; unrecognized values are treated as `Pending`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "in_progress" | "inprogress" | "running" => Self::InProgress,
            "completed" | "complete" | "done" | "success" => Self::Completed,
            "failed" | "error" => Self::Failed,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Pending,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallLocation {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Output attached to a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCallContent {
    Content {
        content: ContentBlock,
    },
    #[serde(rename_all = "camelCase")]
    Diff {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default, alias = "before")]
        old_text: Option<String>,
        #[serde(default, alias = "after")]
        new_text: String,
    },
    #[serde(rename_all = "camelCase")]
    Terminal { terminal_id: TerminalId },
}

impl ToolCallContent {
    /// Parse one content entry, tolerating snake_case keys and bare blocks.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        match obj.get("type").and_then(Value::as_str) {
            Some("content") => obj
                .get("content")
                .and_then(ContentBlock::from_value)
                .map(|content| Self::Content { content }),
            Some("diff") => {
                let text = |keys: &[&str]| {
                    keys.iter()
                        .find_map(|key| obj.get(*key).and_then(Value::as_str))
                        .map(str::to_string)
                };
                Some(Self::Diff {
                    path: text(&["path"]),
                    old_text: text(&["oldText", "old_text", "before"]),
                    new_text: text(&["newText", "new_text", "after"]).unwrap_or_default(),
                })
            }
            Some("terminal") => ["terminalId", "terminal_id"]
                .iter()
                .find_map(|key| obj.get(*key).and_then(Value::as_str))
                .map(|id| Self::Terminal {
                    terminal_id: TerminalId::new(id),
                }),
            _ => ContentBlock::from_value(value).map(|content| Self::Content { content }),
        }
    }

    #[must_use]
    pub fn terminal_id(&self) -> Option<&TerminalId> {
        match self {
            Self::Terminal { terminal_id } => Some(terminal_id),
            _ => None,
        }
    }
}

/// Aggregate state of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub tool_call_id: ToolCallId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ToolKind>,
    #[serde(default)]
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<ToolCallLocation>,
    #[serde(default)]
    pub content: Vec<ToolCallContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<Value>,
}

impl ToolCall {
    #[must_use]
    pub fn new(tool_call_id: ToolCallId) -> Self {
        Self {
            tool_call_id,
            title: None,
            kind: None,
            status: ToolCallStatus::Pending,
            locations: Vec::new(),
            content: Vec::new(),
            raw_input: None,
            raw_output: None,
        }
    }

    /// Merge a partial update. Present fields overwrite; a present content
    /// list replaces the previous one.
    pub fn apply(&mut self, update: &ToolCallUpdate) {
        if let Some(title) = &update.title {
            self.title = Some(title.clone());
        }
        if let Some(kind) = update.kind {
            self.kind = Some(kind);
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(locations) = &update.locations {
            self.locations = locations.clone();
        }
        if let Some(content) = &update.content {
            self.content = content.clone();
        }
        if let Some(raw_input) = &update.raw_input {
            self.raw_input = Some(raw_input.clone());
        }
        if let Some(raw_output) = &update.raw_output {
            self.raw_output = Some(raw_output.clone());
        }
    }

    pub fn terminal_ids(&self) -> impl Iterator<Item = &TerminalId> {
        self.content.iter().filter_map(ToolCallContent::terminal_id)
    }
}

/// Partial tool call state carried by `tool_call` and `tool_call_update`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallUpdate {
    pub tool_call_id: ToolCallId,
    pub title: Option<String>,
    pub kind: Option<ToolKind>,
    pub status: Option<ToolCallStatus>,
    pub locations: Option<Vec<ToolCallLocation>>,
    pub content: Option<Vec<ToolCallContent>>,
    pub raw_input: Option<Value>,
    pub raw_output: Option<Value>,
}

impl ToolCallUpdate {
    #[must_use]
    pub fn new(tool_call_id: ToolCallId) -> Self {
        Self {
            tool_call_id,
            title: None,
            kind: None,
            status: None,
            locations: None,
            content: None,
            raw_input: None,
            raw_output: None,
        }
    }

    /// Parse an update object. Returns `None` when no tool call id is present.
    ///
    /// Content entries that fail to parse are dropped individually.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let get = |keys: &[&str]| keys.iter().find_map(|key| obj.get(*key));
        let id = match get(&["toolCallId", "tool_call_id", "id"])? {
            Value::String(id) if !id.is_empty() => id.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let string = |keys: &[&str]| get(keys).and_then(Value::as_str).map(str::to_string);

        let locations = get(&["locations"]).and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        });
        let content = get(&["content"]).and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(ToolCallContent::from_value)
                .collect()
        });

        Some(Self {
            tool_call_id: ToolCallId::new(id),
            title: string(&["title"]),
            kind: string(&["kind"]).map(|raw| ToolKind::parse(&raw)),
            status: string(&["status"]).map(|raw| ToolCallStatus::parse(&raw)),
            locations,
            content,
            raw_input: get(&["rawInput", "raw_input"]).cloned(),
            raw_output: get(&["rawOutput", "raw_output"]).cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_requires_an_id() {
        assert!(ToolCallUpdate::from_value(&json!({"title": "Read"})).is_none());
        let update = ToolCallUpdate::from_value(&json!({"tool_call_id": 7})).unwrap();
        assert_eq!(update.tool_call_id.as_str(), "7");
    }

    #[test]
    fn apply_replaces_content_and_keeps_absent_fields() {
        let mut call = ToolCall::new(ToolCallId::new("t1"));
        let first = ToolCallUpdate::from_value(&json!({
            "toolCallId": "t1",
            "title": "Edit main.rs",
            "kind": "edit",
            "status": "in_progress",
            "content": [{"type": "terminal", "terminalId": "term-1"}]
        }))
        .unwrap();
        call.apply(&first);

        let second = ToolCallUpdate::from_value(&json!({
            "toolCallId": "t1",
            "status": "completed",
            "content": [{"type": "diff", "path": "main.rs", "oldText": "a", "newText": "b"}]
        }))
        .unwrap();
        call.apply(&second);

        assert_eq!(call.title.as_deref(), Some("Edit main.rs"));
        assert_eq!(call.kind, Some(ToolKind::Edit));
        assert!(call.status.is_terminal());
        assert_eq!(call.content.len(), 1);
        assert!(matches!(call.content[0], ToolCallContent::Diff { .. }));
    }

    #[test]
    fn diff_content_accepts_before_after_aliases() {
        let content = ToolCallContent::from_value(&json!({
            "type": "diff",
            "before": "x",
            "after": "y"
        }))
        .unwrap();
        assert_eq!(
            content,
            ToolCallContent::Diff {
                path: None,
                old_text: Some("x".into()),
                new_text: "y".into(),
            }
        );
    }

    #[test]
    fn unknown_kind_and_status_are_tolerated() {
        assert_eq!(ToolKind::parse("teleport"), ToolKind::Other);
        assert_eq!(ToolCallStatus::parse("canceled"), ToolCallStatus::Cancelled);
        let call: ToolCall = serde_json::from_value(json!({
            "toolCallId": "t9",
            "kind": "teleport",
            "status": "weird"
        }))
        .unwrap();
        assert_eq!(call.kind, Some(ToolKind::Other));
        assert_eq!(call.status, ToolCallStatus::Pending);
    }
}
