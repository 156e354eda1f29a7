//! Keyed record storage for persisted feed envelopes.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};

use weft_types::{PersistedEnvelope, SessionKey};

use crate::sqlite_util::open_secure_db;

/// One stored record as read back from the store. The body is kept as raw
/// text so that a corrupt row can be reported and skipped individually.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub record_key: String,
    pub body: String,
    pub updated_at: i64,
}

/// The narrow persistence contract: upsert one keyed record, load all
/// records of a session.
pub trait FeedStore: Send {
    fn upsert(&mut self, session: &SessionKey, envelope: &PersistedEnvelope) -> Result<()>;

    /// Rows of `session`, oldest write first.
    fn load_session(&self, session: &SessionKey) -> Result<Vec<StoredRow>>;
}

/// Storage key of a feed item: `<session_key>:<feed_id>`.
#[must_use]
pub fn record_key(session: &SessionKey, envelope: &PersistedEnvelope) -> String {
    format!("{session}:{}", envelope.feed_id)
}

pub struct SqliteFeedStore {
    db: Connection,
}

impl SqliteFeedStore {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS feed_records (
            record_key TEXT PRIMARY KEY,
            session_key TEXT NOT NULL,
            body TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_feed_records_session
        ON feed_records(session_key, updated_at);
    ";

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = open_secure_db(path.as_ref())?;
        Self::initialize(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory feed store")?;
        Self::initialize(db)
    }

    fn initialize(db: Connection) -> Result<Self> {
        db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("Failed to set feed store pragmas")?;
        db.execute_batch(Self::SCHEMA)
            .context("Failed to create feed store schema")?;
        Ok(Self { db })
    }

    /// Write a raw body under `key`, bypassing envelope encoding. Used to
    /// import records produced elsewhere.
    pub fn upsert_raw(&mut self, session: &SessionKey, key: &str, body: &str) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        self.db
            .execute(
                "INSERT INTO feed_records (record_key, session_key, body, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(record_key) DO UPDATE SET
                     body = excluded.body,
                     updated_at = excluded.updated_at",
                params![key, session.as_str(), body, now],
            )
            .with_context(|| format!("Failed to upsert feed record {key}"))?;
        Ok(())
    }

    pub fn count(&self, session: &SessionKey) -> Result<usize> {
        let count: i64 = self
            .db
            .query_row(
                "SELECT COUNT(*) FROM feed_records WHERE session_key = ?1",
                params![session.as_str()],
                |row| row.get(0),
            )
            .context("Failed to count feed records")?;
        Ok(count as usize)
    }

    pub fn delete_session(&mut self, session: &SessionKey) -> Result<usize> {
        self.db
            .execute(
                "DELETE FROM feed_records WHERE session_key = ?1",
                params![session.as_str()],
            )
            .with_context(|| format!("Failed to delete feed records of {session}"))
    }
}

impl FeedStore for SqliteFeedStore {
    fn upsert(&mut self, session: &SessionKey, envelope: &PersistedEnvelope) -> Result<()> {
        let body = serde_json::to_string(&envelope.to_record())
            .context("Failed to serialize feed envelope")?;
        self.upsert_raw(session, &record_key(session, envelope), &body)
    }

    fn load_session(&self, session: &SessionKey) -> Result<Vec<StoredRow>> {
        let mut stmt = self
            .db
            .prepare(
                "SELECT record_key, body, updated_at FROM feed_records
                 WHERE session_key = ?1
                 ORDER BY updated_at ASC, rowid ASC",
            )
            .context("Failed to prepare feed record query")?;
        let rows = stmt
            .query_map(params![session.as_str()], |row| {
                Ok(StoredRow {
                    record_key: row.get(0)?,
                    body: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            })
            .context("Failed to query feed records")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to read feed records of {session}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_types::{ENVELOPE_VERSION, EnvelopeKind, FeedId};

    fn envelope(feed_id: &str, text: &str) -> PersistedEnvelope {
        PersistedEnvelope {
            version: ENVELOPE_VERSION,
            kind: EnvelopeKind::Message,
            feed_id: FeedId::new(feed_id),
            sequence: Some(1),
            created_at: 0,
            provider_id: None,
            session_id: None,
            item: json!({"text": text}),
        }
    }

    #[test]
    fn resave_overwrites_by_key() {
        let mut store = SqliteFeedStore::open_in_memory().unwrap();
        let session = SessionKey::new("task-1");
        store.upsert(&session, &envelope("msg-1", "first")).unwrap();
        store.upsert(&session, &envelope("msg-1", "second")).unwrap();

        let rows = store.load_session(&session).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record_key, "task-1:msg-1");
        assert!(rows[0].body.contains("second"));
    }

    #[test]
    fn sessions_are_isolated() {
        let mut store = SqliteFeedStore::open_in_memory().unwrap();
        let a = SessionKey::new("a");
        let b = SessionKey::new("b");
        store.upsert(&a, &envelope("msg-1", "x")).unwrap();
        store.upsert(&b, &envelope("msg-1", "y")).unwrap();
        store.upsert(&b, &envelope("msg-2", "z")).unwrap();

        assert_eq!(store.count(&a).unwrap(), 1);
        assert_eq!(store.count(&b).unwrap(), 2);
        assert_eq!(store.delete_session(&b).unwrap(), 2);
        assert!(store.load_session(&b).unwrap().is_empty());
        assert_eq!(store.load_session(&a).unwrap().len(), 1);
    }

    #[test]
    fn on_disk_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.db");
        let session = SessionKey::new("task");
        {
            let mut store = SqliteFeedStore::open(&path).unwrap();
            store.upsert(&session, &envelope("msg-1", "kept")).unwrap();
        }
        let store = SqliteFeedStore::open(&path).unwrap();
        let rows = store.load_session(&session).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].body.contains("kept"));
    }
}
