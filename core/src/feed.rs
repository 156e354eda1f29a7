//! Feed reconciliation.
//!
//! [`FeedReconciler`] is a pure reducer: it consumes parsed protocol events
//! one at a time and mutates an ordered list of [`FeedItem`]s plus the tool
//! call aggregates, terminal buffers and pending permissions behind them.
//! Every call returns the [`FeedMutation`]s it caused so an outer layer can
//! refresh views and persist finalized items without diffing state.
//!
//! Historical records go through [`FeedReconciler::replay`], which applies
//! the same append, finalization and grouping rules as live events.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::mem;

use serde::{Deserialize, Serialize};

use weft_types::{
    AcpEvent, ContentBlock, FeedId, FeedItem, FeedItemKind, GroupId, MessageItem, MessageKind,
    PermissionRequest, PlanEntry, RequestId, Role, SessionUpdate, TerminalId, ToolCall,
    ToolCallId, ToolCallStatus, ToolCallUpdate,
};
use weft_utils::RollingLines;

use crate::errors::format_session_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedLimits {
    /// Lines kept per terminal buffer.
    pub terminal_max_lines: usize,
    /// Extra lines tolerated before a terminal buffer is cut back.
    pub terminal_slack: usize,
}

impl Default for FeedLimits {
    fn default() -> Self {
        Self {
            terminal_max_lines: 400,
            terminal_slack: 100,
        }
    }
}

/// A change produced by one reducer step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMutation {
    Appended(FeedId),
    Updated(FeedId),
    Removed(FeedId),
    ToolCallChanged(ToolCallId),
    Grouped { group: GroupId, members: Vec<FeedId> },
    TerminalOutput(TerminalId),
    PlanChanged,
    /// The item reached a state that should be written to storage.
    Persist(FeedId),
}

/// Everything needed to restore one feed item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRecord {
    pub item: FeedItem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub terminal_output: BTreeMap<TerminalId, String>,
}

#[derive(Debug, Clone, Copy)]
struct Turn {
    started_at_ms: i64,
    first_sequence: u64,
}

enum ReplayKind {
    Message(Role, Option<MessageKind>),
    Tool(ToolCallId),
    Plan(Vec<PlanEntry>),
}

#[derive(Debug, Clone)]
pub struct FeedReconciler {
    items: Vec<FeedItem>,
    index: HashMap<FeedId, usize>,
    tool_calls: HashMap<ToolCallId, ToolCall>,
    /// Tool calls that reached a terminal status and were handed to storage.
    persisted_tools: HashSet<ToolCallId>,
    permissions: Vec<PermissionRequest>,
    terminals: HashMap<TerminalId, RollingLines>,
    latest_plan: Option<Vec<PlanEntry>>,
    turn_plan: Option<FeedId>,
    turn: Option<Turn>,
    /// Tool call and thought items not yet settled into a group or inline.
    pending_group: Vec<FeedId>,
    streaming: Vec<FeedId>,
    /// Replayed items whose record carried a group.
    recorded_groups: HashSet<FeedId>,
    replaying: bool,
    next_sequence: u64,
    next_group: u64,
    limits: FeedLimits,
    revision: usize,
}

impl Default for FeedReconciler {
    fn default() -> Self {
        Self::new(FeedLimits::default())
    }
}

impl FeedReconciler {
    #[must_use]
    pub fn new(limits: FeedLimits) -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
            tool_calls: HashMap::new(),
            persisted_tools: HashSet::new(),
            permissions: Vec::new(),
            terminals: HashMap::new(),
            latest_plan: None,
            turn_plan: None,
            turn: None,
            pending_group: Vec::new(),
            streaming: Vec::new(),
            recorded_groups: HashSet::new(),
            replaying: false,
            next_sequence: 1,
            next_group: 1,
            limits,
            revision: 0,
        }
    }

    // ── Accessors ──

    #[must_use]
    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    #[must_use]
    pub fn item(&self, id: &FeedId) -> Option<&FeedItem> {
        self.index.get(id).map(|&idx| &self.items[idx])
    }

    #[must_use]
    pub fn tool_call(&self, id: &ToolCallId) -> Option<&ToolCall> {
        self.tool_calls.get(id)
    }

    #[must_use]
    pub fn tool_calls(&self) -> &HashMap<ToolCallId, ToolCall> {
        &self.tool_calls
    }

    #[must_use]
    pub fn terminal(&self, id: &TerminalId) -> Option<&RollingLines> {
        self.terminals.get(id)
    }

    #[must_use]
    pub fn terminals(&self) -> &HashMap<TerminalId, RollingLines> {
        &self.terminals
    }

    #[must_use]
    pub fn latest_plan(&self) -> Option<&[PlanEntry]> {
        self.latest_plan.as_deref()
    }

    #[must_use]
    pub fn pending_permissions(&self) -> &[PermissionRequest] {
        &self.permissions
    }

    #[must_use]
    pub fn has_pending_permissions(&self) -> bool {
        !self.permissions.is_empty()
    }

    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    #[must_use]
    pub fn limits(&self) -> FeedLimits {
        self.limits
    }

    /// Bumped after every step that changed anything. Usable as a cache key.
    #[must_use]
    pub fn revision(&self) -> usize {
        self.revision
    }

    // ── Live events ──

    pub fn apply(&mut self, event: &AcpEvent, now_ms: i64) -> Vec<FeedMutation> {
        let mut out = Vec::new();
        match event {
            AcpEvent::SessionUpdate(update) => self.apply_update(update, now_ms, &mut out),
            AcpEvent::PermissionRequest(request) => {
                self.on_permission_request(request, now_ms, &mut out);
            }
            AcpEvent::TerminalOutput { terminal_id, chunk } => {
                self.on_terminal_output(terminal_id, chunk, &mut out);
            }
            AcpEvent::PromptEnd { .. } => self.end_turn(now_ms, &mut out),
            AcpEvent::SessionError { error } => {
                self.close_out(ToolCallStatus::Failed, &mut out);
                self.end_turn(now_ms, &mut out);
                self.push_error(error, now_ms, &mut out);
            }
            AcpEvent::SessionExit => {
                self.close_out(ToolCallStatus::Cancelled, &mut out);
                self.end_turn(now_ms, &mut out);
            }
            AcpEvent::SessionStarted { .. } => {}
        }
        self.touch(&out);
        out
    }

    fn apply_update(&mut self, update: &SessionUpdate, now_ms: i64, out: &mut Vec<FeedMutation>) {
        match update {
            SessionUpdate::MessageChunk {
                role,
                message_kind,
                blocks,
            } => self.on_message_chunk(*role, *message_kind, blocks, now_ms, out),
            SessionUpdate::Plan { entries } => self.on_plan(entries, now_ms, out),
            SessionUpdate::ToolCall(update) | SessionUpdate::ToolCallUpdate(update) => {
                self.on_tool_update(update, now_ms, out);
            }
            SessionUpdate::ConfigOptions(_)
            | SessionUpdate::ModelUpdate { .. }
            | SessionUpdate::AvailableCommands(_) => {}
            SessionUpdate::Unknown(kind) => {
                tracing::debug!(kind = %kind, "unknown session update ignored");
            }
        }
    }

    /// Append the user's prompt and open a new turn.
    pub fn push_user_prompt(&mut self, blocks: Vec<ContentBlock>, now_ms: i64) -> Vec<FeedMutation> {
        let mut out = Vec::new();
        self.pending_group.clear();
        self.turn = Some(Turn {
            started_at_ms: now_ms,
            first_sequence: self.next_sequence,
        });
        self.turn_plan = None;

        let mut message = MessageItem::new(Role::User, None);
        message.streaming = false;
        for block in blocks {
            message.push_block(block);
        }
        let sequence = self.allocate_sequence();
        let id = FeedId::for_message(sequence);
        self.push_item(
            FeedItem {
                id: id.clone(),
                sequence,
                created_at_ms: now_ms,
                group: None,
                kind: FeedItemKind::Message(message),
            },
            &mut out,
        );
        out.push(FeedMutation::Persist(id));
        self.touch(&out);
        out
    }

    /// Resolve and remove one pending permission request.
    pub fn resolve_permission(
        &mut self,
        request_id: &RequestId,
    ) -> Option<(PermissionRequest, Vec<FeedMutation>)> {
        let pos = self
            .permissions
            .iter()
            .position(|request| &request.request_id == request_id)?;
        let request = self.permissions.remove(pos);
        let mut out = Vec::new();
        self.remove_item(&FeedId::for_permission(request_id), &mut out);
        self.touch(&out);
        Some((request, out))
    }

    /// Cancel the running turn: non-terminal tool calls become `cancelled`
    /// and every pending permission is dropped. The dropped requests are
    /// returned so the caller can answer them.
    pub fn cancel_in_flight(&mut self, now_ms: i64) -> (Vec<PermissionRequest>, Vec<FeedMutation>) {
        let mut out = Vec::new();
        let dropped = self.close_out(ToolCallStatus::Cancelled, &mut out);
        self.end_turn(now_ms, &mut out);
        self.touch(&out);
        (dropped, out)
    }

    fn on_message_chunk(
        &mut self,
        role: Role,
        message_kind: Option<MessageKind>,
        blocks: &[ContentBlock],
        now_ms: i64,
        out: &mut Vec<FeedMutation>,
    ) {
        if blocks.is_empty() {
            return;
        }
        if let Some(last) = self.items.last_mut()
            && let FeedItemKind::Message(message) = &mut last.kind
            && message.streaming
            && message.role == role
            && message.message_kind == message_kind
        {
            for block in blocks {
                message.push_block(block.clone());
            }
            out.push(FeedMutation::Updated(last.id.clone()));
            return;
        }

        self.before_message(role, message_kind, out);
        let mut message = MessageItem::new(role, message_kind);
        for block in blocks {
            message.push_block(block.clone());
        }
        let sequence = self.allocate_sequence();
        let id = FeedId::for_message(sequence);
        self.push_item(
            FeedItem {
                id: id.clone(),
                sequence,
                created_at_ms: now_ms,
                group: None,
                kind: FeedItemKind::Message(message),
            },
            out,
        );
        self.after_message(id, message_kind);
    }

    /// Buffer handling that must run before a new message is appended, while
    /// earlier messages still carry their streaming flag.
    fn before_message(
        &mut self,
        role: Role,
        message_kind: Option<MessageKind>,
        out: &mut Vec<FeedMutation>,
    ) {
        match (role, message_kind) {
            (Role::User, _) => self.pending_group.clear(),
            (Role::Assistant, Some(MessageKind::Thought)) => {}
            (Role::Assistant, _) => self.settle_group(out),
        }
    }

    fn after_message(&mut self, id: FeedId, message_kind: Option<MessageKind>) {
        if message_kind == Some(MessageKind::Thought) {
            self.pending_group.push(id.clone());
        }
        self.streaming.push(id);
    }

    fn on_plan(&mut self, entries: &[PlanEntry], now_ms: i64, out: &mut Vec<FeedMutation>) {
        self.latest_plan = Some(entries.to_vec());

        if let Some(id) = &self.turn_plan
            && let Some(&idx) = self.index.get(id)
        {
            self.items[idx].kind = FeedItemKind::Plan {
                entries: entries.to_vec(),
            };
            out.push(FeedMutation::Updated(id.clone()));
            out.push(FeedMutation::Persist(id.clone()));
        } else {
            let sequence = self.allocate_sequence();
            let id = FeedId::for_plan(sequence);
            self.push_item(
                FeedItem {
                    id: id.clone(),
                    sequence,
                    created_at_ms: now_ms,
                    group: None,
                    kind: FeedItemKind::Plan {
                        entries: entries.to_vec(),
                    },
                },
                out,
            );
            out.push(FeedMutation::Persist(id.clone()));
            self.turn_plan = Some(id);
        }
        out.push(FeedMutation::PlanChanged);
    }

    fn on_tool_update(&mut self, update: &ToolCallUpdate, now_ms: i64, out: &mut Vec<FeedMutation>) {
        let tool_call_id = &update.tool_call_id;
        if self.persisted_tools.contains(tool_call_id) {
            tracing::debug!(tool_call = %tool_call_id, "update for finished tool call ignored");
            return;
        }

        let call = self
            .tool_calls
            .entry(tool_call_id.clone())
            .or_insert_with(|| ToolCall::new(tool_call_id.clone()));
        call.apply(update);
        let finished = call.status.is_terminal();

        let feed_id = FeedId::for_tool_call(tool_call_id);
        if self.index.contains_key(&feed_id) {
            out.push(FeedMutation::Updated(feed_id.clone()));
        } else {
            let sequence = self.allocate_sequence();
            self.push_item(
                FeedItem {
                    id: feed_id.clone(),
                    sequence,
                    created_at_ms: now_ms,
                    group: None,
                    kind: FeedItemKind::ToolCall {
                        tool_call_id: tool_call_id.clone(),
                    },
                },
                out,
            );
            self.pending_group.push(feed_id.clone());
        }
        out.push(FeedMutation::ToolCallChanged(tool_call_id.clone()));

        if finished {
            self.persisted_tools.insert(tool_call_id.clone());
            out.push(FeedMutation::Persist(feed_id));
        }
    }

    fn on_permission_request(
        &mut self,
        request: &PermissionRequest,
        now_ms: i64,
        out: &mut Vec<FeedMutation>,
    ) {
        if let Some(tool_call) = &request.tool_call {
            self.on_tool_update(tool_call, now_ms, out);
        }
        if self
            .permissions
            .iter()
            .any(|pending| pending.request_id == request.request_id)
        {
            return;
        }

        let sequence = self.allocate_sequence();
        self.push_item(
            FeedItem {
                id: FeedId::for_permission(&request.request_id),
                sequence,
                created_at_ms: now_ms,
                group: None,
                kind: FeedItemKind::PermissionRequest {
                    request_id: request.request_id.clone(),
                },
            },
            out,
        );
        self.permissions.push(request.clone());
    }

    fn on_terminal_output(
        &mut self,
        terminal_id: &TerminalId,
        chunk: &str,
        out: &mut Vec<FeedMutation>,
    ) {
        let limits = self.limits;
        self.terminals
            .entry(terminal_id.clone())
            .or_insert_with(|| RollingLines::new(limits.terminal_max_lines, limits.terminal_slack))
            .push_terminal(chunk);
        out.push(FeedMutation::TerminalOutput(terminal_id.clone()));

        if let Some(owner) = self
            .tool_calls
            .values()
            .find(|call| call.terminal_ids().any(|id| id == terminal_id))
        {
            out.push(FeedMutation::Updated(FeedId::for_tool_call(
                &owner.tool_call_id,
            )));
        }
    }

    fn push_error(&mut self, error: &str, now_ms: i64, out: &mut Vec<FeedMutation>) {
        let mut message = MessageItem::new(Role::Assistant, Some(MessageKind::Error));
        message.streaming = false;
        message.push_block(ContentBlock::text(format_session_error(error)));
        let sequence = self.allocate_sequence();
        let id = FeedId::for_message(sequence);
        self.push_item(
            FeedItem {
                id: id.clone(),
                sequence,
                created_at_ms: now_ms,
                group: None,
                kind: FeedItemKind::Message(message),
            },
            out,
        );
        out.push(FeedMutation::Persist(id));
    }

    /// Close the running turn: finalize streams, flush the group buffer
    /// inline and stamp the turn's wall time on its last assistant message.
    fn end_turn(&mut self, now_ms: i64, out: &mut Vec<FeedMutation>) {
        self.finalize_streaming(out);
        self.pending_group.clear();
        self.turn_plan = None;

        let Some(turn) = self.turn.take() else {
            return;
        };
        let elapsed = u64::try_from(now_ms - turn.started_at_ms).unwrap_or(0);
        let last_answer = self
            .items
            .iter_mut()
            .rev()
            .take_while(|item| item.sequence >= turn.first_sequence)
            .find(|item| {
                item.kind.as_message().is_some_and(|message| {
                    message.role == Role::Assistant
                        && message.message_kind != Some(MessageKind::Error)
                })
            });
        if let Some(item) = last_answer
            && let Some(message) = item.kind.as_message_mut()
        {
            message.run_duration_ms = Some(elapsed);
            out.push(FeedMutation::Updated(item.id.clone()));
        }
    }

    /// Move every non-terminal tool call to `status` and drop all pending
    /// permissions.
    fn close_out(
        &mut self,
        status: ToolCallStatus,
        out: &mut Vec<FeedMutation>,
    ) -> Vec<PermissionRequest> {
        let open: Vec<ToolCallId> = self
            .items
            .iter()
            .filter_map(|item| match &item.kind {
                FeedItemKind::ToolCall { tool_call_id } => Some(tool_call_id),
                _ => None,
            })
            .filter(|id| {
                self.tool_calls
                    .get(*id)
                    .is_some_and(|call| !call.status.is_terminal())
            })
            .cloned()
            .collect();

        for tool_call_id in open {
            if let Some(call) = self.tool_calls.get_mut(&tool_call_id) {
                call.status = status;
            }
            let feed_id = FeedId::for_tool_call(&tool_call_id);
            out.push(FeedMutation::Updated(feed_id.clone()));
            out.push(FeedMutation::ToolCallChanged(tool_call_id.clone()));
            out.push(FeedMutation::Persist(feed_id));
            self.persisted_tools.insert(tool_call_id);
        }

        let dropped = mem::take(&mut self.permissions);
        for request in &dropped {
            self.remove_item(&FeedId::for_permission(&request.request_id), out);
        }
        dropped
    }

    // ── Grouping and finalization ──

    fn settle_group(&mut self, out: &mut Vec<FeedMutation>) {
        if self.pending_group.is_empty() {
            return;
        }
        let members = mem::take(&mut self.pending_group);
        let collapse = if self.replaying {
            members.iter().all(|id| self.recorded_groups.contains(id))
        } else {
            members.iter().all(|id| self.is_settled(id))
        };
        if !collapse {
            return;
        }

        let group = GroupId::new(self.next_group);
        self.next_group += 1;
        for id in &members {
            if let Some(&idx) = self.index.get(id) {
                self.items[idx].group = Some(group);
            }
        }
        let persists = members.iter().cloned().map(FeedMutation::Persist);
        out.push(FeedMutation::Grouped {
            group,
            members: members.clone(),
        });
        out.extend(persists);
    }

    fn is_settled(&self, id: &FeedId) -> bool {
        match self.item(id).map(|item| &item.kind) {
            Some(FeedItemKind::ToolCall { tool_call_id }) => self
                .tool_calls
                .get(tool_call_id)
                .is_some_and(|call| call.status.is_terminal()),
            Some(FeedItemKind::Message(message)) => !message.streaming,
            _ => true,
        }
    }

    fn finalize_streaming(&mut self, out: &mut Vec<FeedMutation>) {
        for id in self.streaming.drain(..) {
            if let Some(&idx) = self.index.get(&id)
                && let Some(message) = self.items[idx].kind.as_message_mut()
                && message.streaming
            {
                message.streaming = false;
                out.push(FeedMutation::Updated(id.clone()));
                out.push(FeedMutation::Persist(id));
            }
        }
    }

    // ── Storage ──

    fn allocate_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    /// Appending any item ends the stream of every open message.
    fn push_item(&mut self, item: FeedItem, out: &mut Vec<FeedMutation>) {
        self.finalize_streaming(out);
        let id = item.id.clone();
        self.index.insert(id.clone(), self.items.len());
        self.items.push(item);
        out.push(FeedMutation::Appended(id));
    }

    fn remove_item(&mut self, id: &FeedId, out: &mut Vec<FeedMutation>) {
        let Some(idx) = self.index.remove(id) else {
            return;
        };
        self.items.remove(idx);
        for (pos, item) in self.items.iter().enumerate().skip(idx) {
            self.index.insert(item.id.clone(), pos);
        }
        out.push(FeedMutation::Removed(id.clone()));
    }

    fn touch(&mut self, out: &[FeedMutation]) {
        if !out.is_empty() {
            self.revision = self.revision.wrapping_add(1);
        }
    }

    // ── Snapshots and replay ──

    /// The record to persist for `id`. Permission requests are never stored.
    #[must_use]
    pub fn snapshot(&self, id: &FeedId) -> Option<FeedRecord> {
        let item = self.item(id)?;
        match &item.kind {
            FeedItemKind::PermissionRequest { .. } => None,
            FeedItemKind::ToolCall { tool_call_id } => {
                let call = self.tool_calls.get(tool_call_id)?;
                let terminal_output = call
                    .terminal_ids()
                    .filter_map(|terminal| {
                        self.terminals
                            .get(terminal)
                            .map(|buffer| (terminal.clone(), buffer.text()))
                    })
                    .collect();
                Some(FeedRecord {
                    item: item.clone(),
                    tool_call: Some(call.clone()),
                    terminal_output,
                })
            }
            FeedItemKind::Message(_) | FeedItemKind::Plan { .. } => Some(FeedRecord {
                item: item.clone(),
                tool_call: None,
                terminal_output: BTreeMap::new(),
            }),
        }
    }

    /// Insert a historical record. Records must arrive in replay order;
    /// call [`finish_replay`](Self::finish_replay) after the last one.
    pub fn replay(&mut self, record: FeedRecord) -> Vec<FeedMutation> {
        self.replaying = true;
        let mut out = Vec::new();
        let FeedRecord {
            mut item,
            tool_call,
            terminal_output,
        } = record;

        if self.index.contains_key(&item.id) {
            tracing::debug!(feed_id = %item.id, "duplicate record skipped during replay");
            return out;
        }

        let kind = match &mut item.kind {
            FeedItemKind::Message(message) => {
                message.streaming = true;
                message.run_duration_ms = None;
                ReplayKind::Message(message.role, message.message_kind)
            }
            FeedItemKind::ToolCall { tool_call_id } => ReplayKind::Tool(tool_call_id.clone()),
            FeedItemKind::Plan { entries } => ReplayKind::Plan(entries.clone()),
            FeedItemKind::PermissionRequest { .. } => return out,
        };

        let recorded_group = item.group.take().is_some();
        let id = item.id.clone();
        // Live ids come from the counter, so it must clear ids restored verbatim.
        let floor = item
            .id
            .allocated_sequence()
            .map_or(item.sequence, |allocated| allocated.max(item.sequence));
        self.next_sequence = self.next_sequence.max(floor.saturating_add(1));

        match kind {
            ReplayKind::Message(role, message_kind) => {
                self.before_message(role, message_kind, &mut out);
                self.push_item(item, &mut out);
                self.after_message(id.clone(), message_kind);
            }
            ReplayKind::Tool(tool_call_id) => {
                let call = tool_call.unwrap_or_else(|| {
                    tracing::warn!(tool_call = %tool_call_id, "tool record without aggregate");
                    ToolCall::new(tool_call_id.clone())
                });
                for (terminal, text) in terminal_output {
                    let buffer = RollingLines::from_text(
                        &text,
                        self.limits.terminal_max_lines,
                        self.limits.terminal_slack,
                    );
                    self.terminals.insert(terminal, buffer);
                }
                if call.status.is_terminal() {
                    self.persisted_tools.insert(tool_call_id.clone());
                }
                self.tool_calls.insert(tool_call_id, call);
                self.push_item(item, &mut out);
                self.pending_group.push(id.clone());
            }
            ReplayKind::Plan(entries) => {
                self.latest_plan = Some(entries);
                self.push_item(item, &mut out);
            }
        }

        if recorded_group {
            self.recorded_groups.insert(id);
        }
        self.touch(&out);
        out
    }

    /// End replay: finalize every replayed message and return to live
    /// grouping rules.
    pub fn finish_replay(&mut self) {
        let mut scratch = Vec::new();
        self.finalize_streaming(&mut scratch);
        self.replaying = false;
        self.recorded_groups.clear();
    }
}
