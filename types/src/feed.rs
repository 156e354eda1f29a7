//! Feed items: the ordered, displayable units of a session's conversation.

use serde::{Deserialize, Serialize};

use crate::content::{ContentBlock, MessageKind, Role};
use crate::ids::{FeedId, GroupId, RequestId, ToolCallId};

/// One entry in a session feed.
///
/// `sequence` is assigned at creation and is the only ordering key used for
/// replay. `group` is set when the item was collapsed together with its
/// neighbours into a finished tool/thought group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: FeedId,
    pub sequence: u64,
    pub created_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupId>,
    pub kind: FeedItemKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedItemKind {
    Message(MessageItem),
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool_call_id: ToolCallId,
    },
    Plan {
        entries: Vec<PlanEntry>,
    },
    #[serde(rename_all = "camelCase")]
    PermissionRequest {
        request_id: RequestId,
    },
}

impl FeedItemKind {
    #[must_use]
    pub fn as_message(&self) -> Option<&MessageItem> {
        match self {
            Self::Message(message) => Some(message),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_message_mut(&mut self) -> Option<&mut MessageItem> {
        match self {
            Self::Message(message) => Some(message),
            _ => None,
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::ToolCall { .. } => "tool_call",
            Self::Plan { .. } => "plan",
            Self::PermissionRequest { .. } => "permission_request",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageItem {
    pub role: Role,
    pub blocks: Vec<ContentBlock>,
    /// Ephemeral: true while chunks may still be coalesced into this message.
    #[serde(default)]
    pub streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_kind: Option<MessageKind>,
    /// Ephemeral: wall time of the prompt turn this message closed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_duration_ms: Option<u64>,
}

impl MessageItem {
    #[must_use]
    pub fn new(role: Role, message_kind: Option<MessageKind>) -> Self {
        Self {
            role,
            blocks: Vec::new(),
            streaming: true,
            message_kind,
            run_duration_ms: None,
        }
    }

    #[must_use]
    pub fn is_thought(&self) -> bool {
        self.message_kind == Some(MessageKind::Thought)
    }

    /// Append a block, merging text into a trailing text block.
    pub fn push_block(&mut self, block: ContentBlock) {
        if let ContentBlock::Text { text } = &block
            && let Some(ContentBlock::Text { text: last }) = self.blocks.last_mut()
        {
            last.push_str(text);
            return;
        }
        self.blocks.push(block);
    }

    /// Concatenated text of all text blocks.
    #[must_use]
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanEntryPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanEntryStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<PlanEntryPriority>,
    #[serde(default)]
    pub status: PlanEntryStatus,
}
