//! Core domain types for Weft.
//!
//! This crate contains pure domain types with no IO and no async: the feed
//! model, tool call aggregates, persisted envelopes and the tolerant ACP event
//! parser. Everything here can be used from any layer of the workspace.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod content;
mod diff;
mod effort;
mod envelope;
mod feed;
mod ids;
mod permission;
mod protocol;
mod tool;

pub use content::{ContentBlock, EmbeddedResource, MessageKind, Role};
pub use diff::{DiffLine, DiffLineKind, DiffPreview};
pub use effort::ThinkingBudgetLevel;
pub use envelope::{ENVELOPE_VERSION, EnvelopeError, EnvelopeKind, PersistedEnvelope};
pub use feed::{FeedItem, FeedItemKind, MessageItem, PlanEntry, PlanEntryPriority, PlanEntryStatus};
pub use ids::{FeedId, GroupId, RequestId, SessionKey, TerminalId, ToolCallId};
pub use permission::{PermissionOption, PermissionOutcome, PermissionRequest};
pub use protocol::{AcpEvent, AvailableCommand, ProtocolShapeError, SessionUpdate};
pub use tool::{
    ToolCall, ToolCallContent, ToolCallLocation, ToolCallStatus, ToolCallUpdate, ToolKind,
};
