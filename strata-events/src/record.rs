//! Persisted record layout
//!
//! These are the shapes exchanged with an event store: payloads are already
//! encoded, so a store never needs to know the domain types behind them.

use crate::id::AggregateId;
use serde::{Deserialize, Serialize};

/// Encoded event as written to the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Aggregate the event belongs to
    pub aggregate_id: AggregateId,

    /// Type tag of the encoded payload
    pub event_type: String,

    /// Version the event was recorded at (1-based, per aggregate)
    pub version: u64,

    /// Encoded payload
    pub data: Vec<u8>,
}

/// Encoded snapshot as written to the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    /// Type tag of the encoded snapshot payload
    pub state_type: String,

    /// Aggregate version when the snapshot was taken
    pub version: u64,

    /// Encoded payload
    pub data: Vec<u8>,
}

/// Result of loading one aggregate.
///
/// When `snapshot` is present, `events` only holds events recorded after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub events: Vec<StoredEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<StoredSnapshot>,
}

impl AggregateRecord {
    /// Whether the record carries anything to rebuild an aggregate from.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.snapshot.is_none()
    }
}

/// Everything one aggregate wants persisted in a single save call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub events: Vec<StoredEvent>,

    /// Version the store must currently hold for this aggregate (0 if new)
    pub expected_source_version: u64,

    /// Version the store holds once the changeset is applied
    pub expected_version: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<StoredSnapshot>,
}
