//! The set of open sessions and the store they share.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use thiserror::Error;
use tokio::task;

use weft_context::{HydratedFeed, hydrate};
use weft_core::{FeedLimits, FeedMutation};
use weft_types::{AcpEvent, SessionKey};

use crate::controller::{SessionController, SessionSettings};
use crate::persist::{PersistSink, SharedStore, StoreWriter};
use crate::transport::AgentTransport;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no open session for `{0}`")]
    UnknownSession(SessionKey),
}

/// Owns every open [`SessionController`] and the single persistence writer
/// they all feed.
pub struct SessionRegistry {
    sessions: HashMap<SessionKey, SessionController>,
    store: SharedStore,
    writer: StoreWriter,
    settings: SessionSettings,
    feed_limits: FeedLimits,
}

impl SessionRegistry {
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(store: SharedStore, settings: SessionSettings, feed_limits: FeedLimits) -> Self {
        let writer = StoreWriter::spawn(Arc::clone(&store));
        Self {
            sessions: HashMap::new(),
            store,
            writer,
            settings,
            feed_limits,
        }
    }

    /// Open `key`, hydrating its feed from storage. Opening a key that is
    /// already open returns the live controller and drops `transport`.
    pub async fn open_session(
        &mut self,
        key: SessionKey,
        transport: Box<dyn AgentTransport>,
    ) -> Result<&mut SessionController> {
        if self.sessions.contains_key(&key) {
            tracing::debug!(session = %key, "session already open");
        } else {
            // Earlier writes for this key must land before we read them back.
            self.writer.flush().await;
            let hydrated = self.load(&key).await?;
            tracing::info!(
                session = %key,
                items = hydrated.items().len(),
                dropped = hydrated.dropped_rows(),
                "session hydrated"
            );
            let sink: Arc<dyn PersistSink> = Arc::new(self.writer.clone());
            let controller = SessionController::new(
                key.clone(),
                hydrated.into_reconciler(),
                transport,
                sink,
                self.settings.clone(),
            );
            self.sessions.insert(key.clone(), controller);
        }
        match self.sessions.entry(key) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => Err(anyhow!("session {} vanished while opening", slot.key())),
        }
    }

    async fn load(&self, key: &SessionKey) -> Result<HydratedFeed> {
        let store = Arc::clone(&self.store);
        let limits = self.feed_limits;
        let session = key.clone();
        task::spawn_blocking(move || {
            let rows = {
                let guard = store
                    .lock()
                    .map_err(|_| anyhow!("feed store lock poisoned"))?;
                guard.load_session(&session)?
            };
            Ok::<_, anyhow::Error>(hydrate(&rows, limits))
        })
        .await
        .context("hydration task panicked")?
        .with_context(|| format!("failed to hydrate session {key}"))
    }

    /// Parse a raw event and route it to its session. Malformed events are
    /// logged and produce no mutations.
    pub fn dispatch(
        &mut self,
        key: &SessionKey,
        raw: &Value,
        now_ms: i64,
    ) -> Result<Vec<FeedMutation>, DispatchError> {
        let controller = self
            .sessions
            .get_mut(key)
            .ok_or_else(|| DispatchError::UnknownSession(key.clone()))?;
        match AcpEvent::from_value(raw) {
            Ok(event) => Ok(controller.handle_event(&event, now_ms)),
            Err(err) => {
                tracing::warn!(session = %key, %err, "dropping malformed event");
                Ok(Vec::new())
            }
        }
    }

    /// Run start timeouts for every session. Returns the sessions that timed out.
    pub fn tick(&mut self, now_ms: i64) -> Vec<SessionKey> {
        self.sessions
            .iter_mut()
            .filter_map(|(key, controller)| controller.tick(now_ms).then(|| key.clone()))
            .collect()
    }

    #[must_use]
    pub fn session(&self, key: &SessionKey) -> Option<&SessionController> {
        self.sessions.get(key)
    }

    pub fn session_mut(&mut self, key: &SessionKey) -> Option<&mut SessionController> {
        self.sessions.get_mut(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &SessionKey> {
        self.sessions.keys()
    }

    /// Close a session after its pending writes have landed.
    pub async fn dispose(&mut self, key: &SessionKey) -> bool {
        let Some(controller) = self.sessions.remove(key) else {
            return false;
        };
        self.writer.flush().await;
        tracing::info!(session = %key, status = %controller.status(), "session disposed");
        true
    }

    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
