//! Background persistence writer.
//!
//! Controllers hand finished envelopes to a [`PersistSink`] and never wait
//! on storage. [`StoreWriter`] drains an unbounded channel on a blocking
//! worker thread; a failed write is logged and dropped.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tokio::task;

use weft_context::FeedStore;
use weft_types::{PersistedEnvelope, SessionKey};

/// Store shared between the writer and hydration.
pub type SharedStore = Arc<Mutex<dyn FeedStore>>;

pub trait PersistSink: Send + Sync {
    fn persist(&self, session: &SessionKey, envelope: PersistedEnvelope);
}

enum WriteCmd {
    Upsert {
        session: SessionKey,
        envelope: PersistedEnvelope,
    },
    Flush {
        ack: oneshot::Sender<()>,
    },
}

#[derive(Clone)]
pub struct StoreWriter {
    tx: mpsc::UnboundedSender<WriteCmd>,
}

impl StoreWriter {
    /// Start the writer. Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(store: SharedStore) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        task::spawn_blocking(move || write_loop(&store, rx));
        Self { tx }
    }

    /// Wait until every write queued before this call has been attempted.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(WriteCmd::Flush { ack }).is_ok() {
            let _ = done.await;
        }
    }
}

impl PersistSink for StoreWriter {
    fn persist(&self, session: &SessionKey, envelope: PersistedEnvelope) {
        let feed_id = envelope.feed_id.clone();
        let cmd = WriteCmd::Upsert {
            session: session.clone(),
            envelope,
        };
        if self.tx.send(cmd).is_err() {
            tracing::warn!(session = %session, feed_id = %feed_id, "persistence writer stopped; record dropped");
        }
    }
}

fn write_loop(store: &SharedStore, mut rx: mpsc::UnboundedReceiver<WriteCmd>) {
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            WriteCmd::Upsert { session, envelope } => {
                let Ok(mut guard) = store.lock() else {
                    tracing::warn!(session = %session, "feed store lock poisoned; record dropped");
                    continue;
                };
                if let Err(err) = guard.upsert(&session, &envelope) {
                    tracing::warn!(
                        session = %session,
                        feed_id = %envelope.feed_id,
                        "failed to persist feed record: {err:#}"
                    );
                }
            }
            WriteCmd::Flush { ack } => {
                let _ = ack.send(());
            }
        }
    }
    tracing::debug!("persistence writer finished");
}
