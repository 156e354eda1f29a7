//! Session orchestration for Weft.
//!
//! Wires the pure feed reducer to the outside world: one
//! [`SessionController`] per session, an [`AgentTransport`] for outbound
//! requests and a background [`StoreWriter`] for persistence. The
//! [`SessionRegistry`] owns them all and routes raw inbound events.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

mod controller;
mod persist;
mod registry;
mod transport;

use chrono::Utc;

pub use controller::{SessionController, SessionSettings, SessionStatus};
pub use persist::{PersistSink, SharedStore, StoreWriter};
pub use registry::{DispatchError, SessionRegistry};
pub use transport::{AgentTransport, ChannelTransport, OutboundRequest, TransportError};

pub use weft_core::{CommandError, CommandResult, FeedLimits, FeedMutation};

/// Wall-clock milliseconds, the timestamp unit used throughout the feed.
#[must_use]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
