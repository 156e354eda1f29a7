//! The outbound half of the agent connection.
//!
//! The engine never frames or sends protocol messages itself. It hands
//! [`OutboundRequest`]s to an [`AgentTransport`] and moves on; replies come
//! back later as inbound events.

use thiserror::Error;
use tokio::sync::mpsc;

use weft_types::{ContentBlock, PermissionOutcome, RequestId};

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundRequest {
    Start,
    Prompt {
        blocks: Vec<ContentBlock>,
    },
    Cancel,
    RespondPermission {
        request_id: RequestId,
        outcome: PermissionOutcome,
    },
    SetConfigOption {
        config_id: String,
        value: String,
    },
    SetModel {
        model_id: String,
    },
}

impl OutboundRequest {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Prompt { .. } => "prompt",
            Self::Cancel => "cancel",
            Self::RespondPermission { .. } => "respond_permission",
            Self::SetConfigOption { .. } => "set_config_option",
            Self::SetModel { .. } => "set_model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Accepts requests synchronously. Submission only enqueues; it never waits
/// for the agent's answer.
pub trait AgentTransport: Send {
    fn submit(&mut self, request: OutboundRequest) -> Result<(), TransportError>;
}

/// Transport that forwards every request into an unbounded channel, for a
/// driver task (or a test) to drain.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<OutboundRequest>,
}

impl ChannelTransport {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AgentTransport for ChannelTransport {
    fn submit(&mut self, request: OutboundRequest) -> Result<(), TransportError> {
        let label = request.label();
        self.tx
            .send(request)
            .map_err(|_| TransportError(format!("agent channel closed while sending {label}")))
    }
}
