//! Per-session lifecycle and command handling.
//!
//! A [`SessionController`] owns one session's feed reducer, its resolved
//! config controls and its side of the agent transport. Inbound events go
//! through [`SessionController::handle_event`]; commands are plain methods
//! returning [`CommandResult`]. Nothing here awaits: persistence is handed
//! to a [`PersistSink`] and transport submission only enqueues.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use weft_context::{EnvelopeMeta, SanitizeLimits, envelope_for};
use weft_core::{
    CommandError, CommandResult, ConfigOption, EffortControl, FeedMutation, FeedReconciler,
    ResolvedControls, ResolverWeights, merge_options, normalize_options, resolve_controls,
};
use weft_types::{
    AcpEvent, AvailableCommand, ContentBlock, DiffPreview, FeedId, PermissionOutcome, RequestId,
    SessionKey, SessionUpdate, ThinkingBudgetLevel, ToolCallId,
};
use weft_utils::{DiffEngine, DiffLimits};

use crate::persist::PersistSink;
use crate::transport::{AgentTransport, OutboundRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Starting,
    Running,
    AwaitingPermission,
    Error,
    Exited,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::AwaitingPermission => "awaiting_permission",
            Self::Error => "error",
            Self::Exited => "exited",
        }
    }

    /// The agent process is up and answering.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Running | Self::AwaitingPermission)
    }

    #[must_use]
    pub fn can_start(self) -> bool {
        matches!(self, Self::Idle | Self::Error | Self::Exited)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub start_timeout: Duration,
    pub provider_id: Option<String>,
    pub sanitize: SanitizeLimits,
    pub resolver: ResolverWeights,
    pub diff: DiffLimits,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(30),
            provider_id: None,
            sanitize: SanitizeLimits::default(),
            resolver: ResolverWeights::default(),
            diff: DiffLimits::default(),
        }
    }
}

pub struct SessionController {
    key: SessionKey,
    status: SessionStatus,
    feed: FeedReconciler,
    transport: Box<dyn AgentTransport>,
    sink: Arc<dyn PersistSink>,
    settings: SessionSettings,
    diff: DiffEngine,
    session_id: Option<String>,
    agent_capabilities: Option<Value>,
    options: Vec<ConfigOption>,
    controls: ResolvedControls,
    current_model: Option<String>,
    commands: Vec<AvailableCommand>,
    prompt_in_flight: bool,
    starting_since_ms: Option<i64>,
    last_error: Option<String>,
}

impl SessionController {
    /// `feed` is either empty or the result of hydration.
    pub fn new(
        key: SessionKey,
        feed: FeedReconciler,
        transport: Box<dyn AgentTransport>,
        sink: Arc<dyn PersistSink>,
        settings: SessionSettings,
    ) -> Self {
        let diff = DiffEngine::new(settings.diff);
        Self {
            key,
            status: SessionStatus::Idle,
            feed,
            transport,
            sink,
            settings,
            diff,
            session_id: None,
            agent_capabilities: None,
            options: Vec::new(),
            controls: ResolvedControls::default(),
            current_model: None,
            commands: Vec::new(),
            prompt_in_flight: false,
            starting_since_ms: None,
            last_error: None,
        }
    }

    // ── Accessors ──

    #[must_use]
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn feed(&self) -> &FeedReconciler {
        &self.feed
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    #[must_use]
    pub fn agent_capabilities(&self) -> Option<&Value> {
        self.agent_capabilities.as_ref()
    }

    #[must_use]
    pub fn config_options(&self) -> &[ConfigOption] {
        &self.options
    }

    #[must_use]
    pub fn controls(&self) -> &ResolvedControls {
        &self.controls
    }

    /// Last model reported by the agent, else the model option's current value.
    #[must_use]
    pub fn current_model(&self) -> Option<&str> {
        self.current_model.as_deref().or_else(|| {
            self.controls
                .model
                .as_ref()
                .and_then(|model| model.current.as_deref())
        })
    }

    #[must_use]
    pub fn effort_level(&self) -> Option<ThinkingBudgetLevel> {
        self.controls.effort.as_ref().and_then(EffortControl::current)
    }

    #[must_use]
    pub fn available_commands(&self) -> &[AvailableCommand] {
        &self.commands
    }

    #[must_use]
    pub fn prompt_in_flight(&self) -> bool {
        self.prompt_in_flight
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Bounded diff previews for every diff the tool call carries.
    #[must_use]
    pub fn diff_previews(&self, tool_call_id: &ToolCallId) -> Vec<DiffPreview> {
        self.feed
            .tool_call(tool_call_id)
            .map(|call| self.diff.previews_for(call))
            .unwrap_or_default()
    }

    // ── Inbound events ──

    pub fn handle_event(&mut self, event: &AcpEvent, now_ms: i64) -> Vec<FeedMutation> {
        match event {
            AcpEvent::SessionStarted {
                session_id,
                agent_capabilities,
                config_options,
            } => {
                self.on_session_started(session_id.as_deref(), agent_capabilities.as_ref(), config_options);
                return Vec::new();
            }
            AcpEvent::SessionUpdate(SessionUpdate::ConfigOptions(values)) => {
                merge_options(&mut self.options, values);
                self.resolve();
                return Vec::new();
            }
            AcpEvent::SessionUpdate(SessionUpdate::ModelUpdate { current_model_id }) => {
                if let Some(model_id) = current_model_id {
                    self.record_model(model_id);
                }
                return Vec::new();
            }
            AcpEvent::SessionUpdate(SessionUpdate::AvailableCommands(commands)) => {
                self.commands.clone_from(commands);
                return Vec::new();
            }
            AcpEvent::SessionError { error } => {
                if !matches!(
                    self.status,
                    SessionStatus::Starting | SessionStatus::Running | SessionStatus::AwaitingPermission
                ) {
                    tracing::debug!(session = %self.key, status = %self.status, %error, "late session error ignored");
                    return Vec::new();
                }
                tracing::warn!(session = %self.key, %error, "session error");
                self.set_status(SessionStatus::Error);
                self.last_error = Some(error.clone());
                self.prompt_in_flight = false;
                self.starting_since_ms = None;
            }
            AcpEvent::SessionExit => {
                if self.status == SessionStatus::Exited {
                    return Vec::new();
                }
                self.set_status(SessionStatus::Exited);
                self.prompt_in_flight = false;
                self.starting_since_ms = None;
            }
            AcpEvent::PromptEnd { stop_reason } => {
                tracing::debug!(session = %self.key, stop_reason = ?stop_reason, "prompt ended");
                self.prompt_in_flight = false;
            }
            AcpEvent::SessionUpdate(_)
            | AcpEvent::PermissionRequest(_)
            | AcpEvent::TerminalOutput { .. } => {}
        }

        let mutations = self.feed.apply(event, now_ms);
        self.persist(&mutations);
        if self.status == SessionStatus::Running && self.feed.has_pending_permissions() {
            self.set_status(SessionStatus::AwaitingPermission);
        }
        mutations
    }

    fn on_session_started(
        &mut self,
        session_id: Option<&str>,
        capabilities: Option<&Value>,
        config_options: &[Value],
    ) {
        match self.status {
            SessionStatus::Idle | SessionStatus::Starting => {
                self.starting_since_ms = None;
                self.set_status(SessionStatus::Running);
            }
            SessionStatus::Running | SessionStatus::AwaitingPermission => {
                tracing::debug!(session = %self.key, "session_started while running; refreshing config");
            }
            SessionStatus::Error | SessionStatus::Exited => {
                tracing::debug!(session = %self.key, status = %self.status, "stale session_started ignored");
                return;
            }
        }
        if let Some(id) = session_id {
            self.session_id = Some(id.to_string());
        }
        if let Some(capabilities) = capabilities {
            self.agent_capabilities = Some(capabilities.clone());
        }
        if !config_options.is_empty() {
            self.options = normalize_options(config_options);
            self.resolve();
        }
    }

    /// Expire a start that has not been acknowledged in time. Returns true
    /// when the session moved to `error`.
    pub fn tick(&mut self, now_ms: i64) -> bool {
        let Some(since) = self.starting_since_ms else {
            return false;
        };
        if self.status != SessionStatus::Starting {
            self.starting_since_ms = None;
            return false;
        }
        let timeout_ms = i64::try_from(self.settings.start_timeout.as_millis()).unwrap_or(i64::MAX);
        if now_ms.saturating_sub(since) <= timeout_ms {
            return false;
        }
        tracing::warn!(session = %self.key, timeout_ms, "agent did not acknowledge start");
        self.starting_since_ms = None;
        self.last_error = Some(format!(
            "agent did not start within {}s",
            self.settings.start_timeout.as_secs()
        ));
        self.set_status(SessionStatus::Error);
        true
    }

    // ── Commands ──

    pub fn start_session(&mut self, now_ms: i64) -> CommandResult {
        self.try_start(now_ms).into()
    }

    fn try_start(&mut self, now_ms: i64) -> Result<(), CommandError> {
        if !self.status.can_start() {
            tracing::debug!(session = %self.key, status = %self.status, "start ignored; session already up");
            return Ok(());
        }
        self.set_status(SessionStatus::Starting);
        self.starting_since_ms = Some(now_ms);
        self.prompt_in_flight = false;
        self.last_error = None;

        if let Err(err) = self.transport.submit(OutboundRequest::Start) {
            self.set_status(SessionStatus::Error);
            self.starting_since_ms = None;
            self.last_error = Some(err.to_string());
            return Err(CommandError::Lifecycle(err.0));
        }
        Ok(())
    }

    pub fn send_prompt(&mut self, blocks: Vec<ContentBlock>, now_ms: i64) -> CommandResult {
        self.try_send_prompt(blocks, now_ms).into()
    }

    fn try_send_prompt(&mut self, blocks: Vec<ContentBlock>, now_ms: i64) -> Result<(), CommandError> {
        self.require_ready()?;
        if self.prompt_in_flight {
            return Err(CommandError::PromptInFlight);
        }
        let has_content = blocks
            .iter()
            .any(|block| block.as_text().is_none_or(|text| !text.trim().is_empty()));
        if !has_content {
            return Err(CommandError::EmptyPrompt);
        }

        self.submit(OutboundRequest::Prompt {
            blocks: blocks.clone(),
        })?;
        self.prompt_in_flight = true;
        let mutations = self.feed.push_user_prompt(blocks, now_ms);
        self.persist(&mutations);
        Ok(())
    }

    pub fn respond_permission(
        &mut self,
        request_id: &RequestId,
        outcome: PermissionOutcome,
    ) -> CommandResult {
        self.try_respond_permission(request_id, outcome).into()
    }

    fn try_respond_permission(
        &mut self,
        request_id: &RequestId,
        outcome: PermissionOutcome,
    ) -> Result<(), CommandError> {
        let request = self
            .feed
            .pending_permissions()
            .iter()
            .find(|request| &request.request_id == request_id)
            .ok_or_else(|| CommandError::UnknownPermission(request_id.to_string()))?;
        if let PermissionOutcome::Selected { option_id } = &outcome
            && !request.options.is_empty()
            && !request.options.iter().any(|option| &option.option_id == option_id)
        {
            return Err(CommandError::InvalidChoice {
                option: request_id.to_string(),
                value: option_id.clone(),
            });
        }

        // The request stays pending until the agent has the answer.
        self.submit(OutboundRequest::RespondPermission {
            request_id: request_id.clone(),
            outcome,
        })?;
        if let Some((_, mutations)) = self.feed.resolve_permission(request_id) {
            self.persist(&mutations);
        }
        if self.status == SessionStatus::AwaitingPermission && !self.feed.has_pending_permissions() {
            self.set_status(SessionStatus::Running);
        }
        Ok(())
    }

    /// Cancel the running turn. A cancel with nothing in flight succeeds
    /// without doing anything.
    pub fn cancel(&mut self, now_ms: i64) -> CommandResult {
        if !self.prompt_in_flight && !self.feed.has_pending_permissions() {
            return CommandResult::ok();
        }
        let (dropped, mutations) = self.feed.cancel_in_flight(now_ms);
        self.persist(&mutations);
        self.prompt_in_flight = false;
        if self.status == SessionStatus::AwaitingPermission {
            self.set_status(SessionStatus::Running);
        }

        for request in dropped {
            let request_id = request.request_id;
            if let Err(err) = self.transport.submit(OutboundRequest::RespondPermission {
                request_id: request_id.clone(),
                outcome: PermissionOutcome::Cancelled,
            }) {
                tracing::warn!(session = %self.key, request = %request_id, %err, "could not cancel permission request");
            }
        }
        if let Err(err) = self.transport.submit(OutboundRequest::Cancel) {
            tracing::warn!(session = %self.key, %err, "cancel not delivered");
        }
        CommandResult::ok()
    }

    pub fn set_config_option(&mut self, option_id: &str, value: &str) -> CommandResult {
        self.try_set_config_option(option_id, value).into()
    }

    fn try_set_config_option(&mut self, option_id: &str, value: &str) -> Result<(), CommandError> {
        self.require_live()?;
        let option = self
            .options
            .iter()
            .find(|option| option.id == option_id)
            .ok_or_else(|| CommandError::UnknownOption(option_id.to_string()))?;
        if !option.accepts(value) {
            return Err(CommandError::InvalidChoice {
                option: option_id.to_string(),
                value: value.to_string(),
            });
        }
        self.submit(OutboundRequest::SetConfigOption {
            config_id: option_id.to_string(),
            value: value.to_string(),
        })?;
        self.record_option_value(option_id, value);
        Ok(())
    }

    pub fn set_model(&mut self, model_id: &str) -> CommandResult {
        self.try_set_model(model_id).into()
    }

    fn try_set_model(&mut self, model_id: &str) -> Result<(), CommandError> {
        self.require_live()?;
        let model = self
            .controls
            .model
            .as_ref()
            .ok_or(CommandError::ControlUnsupported("model"))?;
        if !model.choices.is_empty() && !model.choices.iter().any(|choice| choice.value == model_id) {
            return Err(CommandError::InvalidChoice {
                option: model.option_id.clone(),
                value: model_id.to_string(),
            });
        }
        self.submit(OutboundRequest::SetModel {
            model_id: model_id.to_string(),
        })?;
        self.record_model(model_id);
        Ok(())
    }

    pub fn set_effort(&mut self, level: ThinkingBudgetLevel) -> CommandResult {
        self.try_set_effort(level).into()
    }

    fn try_set_effort(&mut self, level: ThinkingBudgetLevel) -> Result<(), CommandError> {
        self.require_live()?;
        let (option_id, value) = self
            .controls
            .effort_request(level)
            .ok_or(CommandError::ControlUnsupported("reasoning effort"))?;
        match self.controls.effort {
            Some(EffortControl::ModelVariants { .. }) => {
                self.submit(OutboundRequest::SetModel {
                    model_id: value.clone(),
                })?;
                self.record_model(&value);
            }
            _ => {
                self.submit(OutboundRequest::SetConfigOption {
                    config_id: option_id.clone(),
                    value: value.clone(),
                })?;
                self.record_option_value(&option_id, &value);
            }
        }
        Ok(())
    }

    // ── Internals ──

    fn require_live(&self) -> Result<(), CommandError> {
        if self.status.is_live() {
            Ok(())
        } else {
            Err(CommandError::NotRunning {
                status: self.status.as_str(),
            })
        }
    }

    fn require_ready(&self) -> Result<(), CommandError> {
        match self.status {
            SessionStatus::Running => Ok(()),
            SessionStatus::AwaitingPermission => Err(CommandError::PermissionPending {
                count: self.feed.pending_permissions().len(),
            }),
            status => Err(CommandError::NotRunning {
                status: status.as_str(),
            }),
        }
    }

    /// A dead transport leaves the session in `error` so it can be started again.
    fn submit(&mut self, request: OutboundRequest) -> Result<(), CommandError> {
        let label = request.label();
        if let Err(err) = self.transport.submit(request) {
            tracing::warn!(session = %self.key, request = label, %err, "transport rejected request");
            self.last_error = Some(err.0.clone());
            self.set_status(SessionStatus::Error);
            return Err(CommandError::Transport(err.0));
        }
        Ok(())
    }

    fn set_status(&mut self, status: SessionStatus) {
        if self.status != status {
            tracing::info!(session = %self.key, from = %self.status, to = %status, "session status");
            self.status = status;
        }
    }

    fn resolve(&mut self) {
        self.controls = resolve_controls(&self.options, &self.settings.resolver);
    }

    fn record_option_value(&mut self, option_id: &str, value: &str) {
        if let Some(option) = self.options.iter_mut().find(|option| option.id == option_id) {
            option.current_value = Some(value.to_string());
        }
        self.resolve();
    }

    fn record_model(&mut self, model_id: &str) {
        self.current_model = Some(model_id.to_string());
        if let Some(option_id) = self.controls.model.as_ref().map(|model| model.option_id.clone()) {
            self.record_option_value(&option_id, model_id);
        }
    }

    fn persist(&self, mutations: &[FeedMutation]) {
        let meta = EnvelopeMeta {
            provider_id: self.settings.provider_id.clone(),
            session_id: self.session_id.clone(),
        };
        let mut seen: HashSet<&FeedId> = HashSet::new();
        for mutation in mutations {
            let FeedMutation::Persist(feed_id) = mutation else {
                continue;
            };
            if !seen.insert(feed_id) {
                continue;
            }
            let Some(record) = self.feed.snapshot(feed_id) else {
                continue;
            };
            match envelope_for(record, &meta, &self.settings.sanitize) {
                Ok(envelope) => self.sink.persist(&self.key, envelope),
                Err(err) => {
                    tracing::warn!(session = %self.key, feed_id = %feed_id, %err, "feed record not persisted");
                }
            }
        }
    }
}
