//! Plain-text rendering of a feed for terminal output.

use std::fmt::Write as _;

use serde::Serialize;

use weft_core::FeedReconciler;
use weft_types::{FeedItem, FeedItemKind, MessageKind, PlanEntry, PlanEntryStatus, Role, ToolCall};
use weft_utils::DiffEngine;

const PREVIEW_CHARS: usize = 72;

/// JSON shape printed by `--json`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedDump<'a> {
    pub items: &'a [FeedItem],
    pub tool_calls: Vec<&'a ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_plan: Option<&'a [PlanEntry]>,
    pub next_sequence: u64,
}

impl<'a> FeedDump<'a> {
    pub fn new(feed: &'a FeedReconciler) -> Self {
        let mut tool_calls: Vec<&ToolCall> = feed.tool_calls().values().collect();
        tool_calls.sort_by(|a, b| a.tool_call_id.cmp(&b.tool_call_id));
        Self {
            items: feed.items(),
            tool_calls,
            latest_plan: feed.latest_plan(),
            next_sequence: feed.next_sequence(),
        }
    }
}

pub fn render_feed(feed: &FeedReconciler, diff: &DiffEngine) -> String {
    let mut out = String::new();
    for item in feed.items() {
        let _ = writeln!(out, "{}", render_item(feed, item));
        if let FeedItemKind::ToolCall { tool_call_id } = &item.kind
            && let Some(call) = feed.tool_call(tool_call_id)
        {
            for preview in diff.previews_for(call) {
                let truncated = if preview.truncated { " (truncated)" } else { "" };
                let _ = writeln!(
                    out,
                    "       {} +{} -{}{truncated}",
                    preview.path.as_deref().unwrap_or("<unnamed>"),
                    preview.additions,
                    preview.deletions
                );
            }
        }
    }
    if let Some(entries) = feed.latest_plan() {
        let done = entries
            .iter()
            .filter(|entry| entry.status == PlanEntryStatus::Completed)
            .count();
        let _ = writeln!(out, "plan: {done}/{} done", entries.len());
    }
    out
}

fn render_item(feed: &FeedReconciler, item: &FeedItem) -> String {
    let group = item
        .group
        .map(|group| format!(" [g{}]", group.value()))
        .unwrap_or_default();
    let body = match &item.kind {
        FeedItemKind::Message(message) => {
            let who = match (message.role, message.message_kind) {
                (_, Some(MessageKind::Thought)) => "thought",
                (_, Some(MessageKind::Error)) => "error",
                (Role::User, _) => "user",
                (Role::Assistant, _) => "agent",
            };
            format!("{who}: {}", preview(&message.text()))
        }
        FeedItemKind::ToolCall { tool_call_id } => match feed.tool_call(tool_call_id) {
            Some(call) => format!(
                "tool {} [{}] {}",
                tool_call_id,
                call.status.as_str(),
                call.title.as_deref().unwrap_or("")
            ),
            None => format!("tool {tool_call_id}"),
        },
        FeedItemKind::Plan { entries } => format!("plan ({} entries)", entries.len()),
        FeedItemKind::PermissionRequest { request_id } => {
            format!("permission {request_id} awaiting answer")
        }
    };
    format!("{:>4} {}{group}  {}", item.sequence, item.id, body.trim_end())
}

fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > PREVIEW_CHARS || text.lines().nth(1).is_some() {
        let head: String = line.chars().take(PREVIEW_CHARS).collect();
        format!("{head}…")
    } else {
        line.to_string()
    }
}
