//! Durable feed history.
//!
//! ```text
//! FeedRecord ──envelope_for──▶ PersistedEnvelope ──FeedStore::upsert──▶ SQLite
//!                                                                        │
//! FeedReconciler ◀──replay── hydrate ◀──FeedStore::load_session──────────┘
//! ```
//!
//! Envelopes are sanitized before they are written and keyed by
//! `<session_key>:<feed_id>`, so re-saving an item overwrites it.

mod envelope;
mod hydrate;
mod sqlite_util;
mod store;

pub use envelope::{
    DEFAULT_RAW_INPUT_KEYS, EnvelopeMeta, OMITTED_DATA, PersistenceError, SanitizeLimits,
    envelope_for,
};
pub use hydrate::{HydratedFeed, hydrate};
pub use store::{FeedStore, SqliteFeedStore, StoredRow, record_key};
