//! Session feed domain logic for Weft.
//!
//! This crate holds the synchronous halves of a session: the feed reducer,
//! the config option resolver, reasoning-effort detection and the command
//! error taxonomy. Nothing here performs IO or awaits.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config_options;
pub mod effort;
pub mod errors;
mod feed;

pub use config_options::{
    Concept, ConfigChoice, ConfigOption, EffortControl, ModelControl, ResolvedControls,
    ResolverWeights, merge_options, normalize_options, resolve_controls,
};
pub use effort::{EffortMap, ModelVariant, detect_level};
pub use errors::{CommandError, CommandResult, format_session_error};
pub use feed::{FeedLimits, FeedMutation, FeedReconciler, FeedRecord};
