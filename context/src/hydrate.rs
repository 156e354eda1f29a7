//! Rebuilding a session feed from stored envelopes.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde_json::Value;

use weft_core::{FeedLimits, FeedReconciler, FeedRecord};
use weft_types::{FeedId, FeedItem, PersistedEnvelope, PlanEntry, TerminalId, ToolCall, ToolCallId};
use weft_utils::RollingLines;

use crate::store::StoredRow;

/// A feed reconstructed from storage, ready to resume live ingestion.
#[derive(Debug, Clone)]
pub struct HydratedFeed {
    feed: FeedReconciler,
    dropped_rows: usize,
}

impl HydratedFeed {
    #[must_use]
    pub fn feed(&self) -> &FeedReconciler {
        &self.feed
    }

    #[must_use]
    pub fn items(&self) -> &[FeedItem] {
        self.feed.items()
    }

    #[must_use]
    pub fn tool_calls(&self) -> &HashMap<ToolCallId, ToolCall> {
        self.feed.tool_calls()
    }

    #[must_use]
    pub fn terminal_buffers(&self) -> &HashMap<TerminalId, RollingLines> {
        self.feed.terminals()
    }

    #[must_use]
    pub fn latest_plan(&self) -> Option<&[PlanEntry]> {
        self.feed.latest_plan()
    }

    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.feed.next_sequence()
    }

    /// Rows skipped because they could not be parsed or were superseded.
    #[must_use]
    pub fn dropped_rows(&self) -> usize {
        self.dropped_rows
    }

    #[must_use]
    pub fn into_reconciler(self) -> FeedReconciler {
        self.feed
    }
}

struct Candidate {
    stored_sequence: Option<u64>,
    created_at: i64,
    updated_at: i64,
    position: usize,
    record: FeedRecord,
}

impl Candidate {
    fn newer_than(&self, other: &Self) -> bool {
        (self.updated_at, self.position) >= (other.updated_at, other.position)
    }
}

/// Parse, de-duplicate, order and replay stored rows.
///
/// Rows without a stored sequence predate sequencing; they are replayed
/// first, ordered by creation time. Sequenced rows follow in sequence order.
/// Sequences are bumped where needed so the replayed feed stays strictly
/// increasing.
#[must_use]
pub fn hydrate(rows: &[StoredRow], limits: FeedLimits) -> HydratedFeed {
    let mut dropped = 0;
    let mut by_id: HashMap<FeedId, Candidate> = HashMap::new();

    for (position, row) in rows.iter().enumerate() {
        let Some(candidate) = decode_row(row, position) else {
            dropped += 1;
            continue;
        };
        match by_id.entry(candidate.record.item.id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(candidate);
            }
            Entry::Occupied(mut slot) => {
                dropped += 1;
                if candidate.newer_than(slot.get()) {
                    slot.insert(candidate);
                }
            }
        }
    }

    let (mut legacy, mut sequenced): (Vec<Candidate>, Vec<Candidate>) = by_id
        .into_values()
        .partition(|candidate| candidate.stored_sequence.is_none());
    legacy.sort_by_key(|candidate| (candidate.created_at, candidate.position));
    sequenced.sort_by_key(|candidate| (candidate.stored_sequence, candidate.position));

    let mut feed = FeedReconciler::new(limits);
    let mut next = 1;
    for candidate in legacy.into_iter().chain(sequenced) {
        let mut record = candidate.record;
        let sequence = candidate.stored_sequence.map_or(next, |stored| stored.max(next));
        record.item.sequence = sequence;
        next = sequence + 1;
        feed.replay(record);
    }
    feed.finish_replay();

    if dropped > 0 {
        tracing::debug!(dropped, kept = feed.items().len(), "hydrated feed with skipped rows");
    }
    HydratedFeed {
        feed,
        dropped_rows: dropped,
    }
}

fn decode_row(row: &StoredRow, position: usize) -> Option<Candidate> {
    let value: Value = match serde_json::from_str(&row.body) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(key = %row.record_key, %err, "skipping unparsable feed record");
            return None;
        }
    };
    let envelope = match PersistedEnvelope::from_record(&value) {
        Ok(envelope) => envelope,
        Err(err) => {
            tracing::warn!(key = %row.record_key, %err, "skipping feed record");
            return None;
        }
    };
    let record = match decode_record(&envelope) {
        Ok(record) => record,
        Err(err) => {
            tracing::warn!(key = %row.record_key, %err, "skipping feed record with bad item");
            return None;
        }
    };
    Some(Candidate {
        stored_sequence: envelope.sequence,
        created_at: envelope.created_at,
        updated_at: row.updated_at,
        position,
        record,
    })
}

/// The envelope's own id, sequence and timestamp win over the body's copies;
/// older bodies may not carry them at all.
fn decode_record(envelope: &PersistedEnvelope) -> Result<FeedRecord, serde_json::Error> {
    let mut body = envelope.item.clone();
    if let Some(item) = body.get_mut("item").and_then(Value::as_object_mut) {
        item.insert("id".into(), Value::String(envelope.feed_id.to_string()));
        item.entry("sequence")
            .or_insert_with(|| Value::from(envelope.sequence.unwrap_or(0)));
        item.entry("createdAtMs")
            .or_insert_with(|| Value::from(envelope.created_at));
    }
    serde_json::from_value(body)
}
