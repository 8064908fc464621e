//! Event Store implementation

use crate::config::EventSourcingConfig;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use strata_events::{
    AggregateId, AggregateRecord, ChangeSet, CommandContext, StoredEvent, StoredSnapshot,
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Event store trait
///
/// Implement this trait to provide custom event storage (e.g., PostgreSQL, EventStoreDB).
/// A `save` must behave as one check-and-set per aggregate id: of two callers
/// racing on the same id with the same expected version, exactly one wins.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Load the latest snapshot and the events recorded after it.
    ///
    /// Returns `Ok(None)` for an unknown id.
    async fn load_by(
        &self,
        aggregate_id: &AggregateId,
        context: &CommandContext,
    ) -> Result<Option<AggregateRecord>, EventStoreError>;

    /// Persist a batch of changesets under optimistic concurrency control.
    async fn save(
        &self,
        changes: Vec<ChangeSet>,
        context: &CommandContext,
    ) -> Result<(), EventStoreError>;
}

#[derive(Debug, Clone)]
struct Stream {
    aggregate_type: String,
    version: u64,
    events: Vec<StoredEvent>,
    snapshot: Option<StoredSnapshot>,
}

/// In-memory event store (for testing/development)
///
/// A batch is verified in full before any of it is applied, under a single
/// write lock, so a save either commits every changeset or none.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    /// Streams indexed by aggregate ID
    streams: Arc<RwLock<HashMap<AggregateId, Stream>>>,

    /// Drop events covered by a newly stored snapshot
    compact_on_snapshot: bool,
}

impl InMemoryEventStore {
    /// Create new in-memory event store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store from configuration
    pub fn with_config(config: &EventSourcingConfig) -> Self {
        Self {
            streams: Arc::default(),
            compact_on_snapshot: config.compact_on_snapshot,
        }
    }

    /// Get all stored events, ordered by aggregate then version (for testing)
    pub async fn all_events(&self) -> Vec<StoredEvent> {
        let streams = self.streams.read().await;
        let mut ids: Vec<&AggregateId> = streams.keys().collect();
        ids.sort();
        ids.into_iter()
            .flat_map(|id| streams[id].events.iter().cloned())
            .collect()
    }

    /// Version currently recorded for an aggregate, if it exists
    pub async fn stream_version(&self, aggregate_id: &AggregateId) -> Option<u64> {
        self.streams
            .read()
            .await
            .get(aggregate_id)
            .map(|stream| stream.version)
    }

    /// Latest snapshot stored for an aggregate
    pub async fn snapshot_of(&self, aggregate_id: &AggregateId) -> Option<StoredSnapshot> {
        self.streams
            .read()
            .await
            .get(aggregate_id)
            .and_then(|stream| stream.snapshot.clone())
    }

    /// Number of aggregates stored
    pub async fn len(&self) -> usize {
        self.streams.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.streams.read().await.is_empty()
    }

    /// Clear all data
    pub async fn clear(&self) {
        self.streams.write().await.clear();
    }
}

/// Check a whole batch against the current streams without touching them.
fn verify_batch(
    streams: &HashMap<AggregateId, Stream>,
    changes: &[ChangeSet],
) -> Result<(), EventStoreError> {
    let mut seen = HashSet::with_capacity(changes.len());

    for change in changes {
        let id = &change.aggregate_id;
        if !seen.insert(id) {
            return Err(EventStoreError::InvalidChangeSet(format!(
                "aggregate {id} appears more than once in the batch"
            )));
        }

        let (actual, stored_type) = streams
            .get(id)
            .map_or((0, None), |s| (s.version, Some(s.aggregate_type.as_str())));

        if actual != change.expected_source_version {
            return Err(EventStoreError::Concurrency {
                aggregate_id: id.clone(),
                expected: change.expected_source_version,
                actual,
            });
        }

        if let Some(stored_type) = stored_type
            && stored_type != change.aggregate_type
        {
            return Err(EventStoreError::InvalidChangeSet(format!(
                "aggregate {id} is a {stored_type}, not a {}",
                change.aggregate_type
            )));
        }

        verify_events(change)?;
    }

    Ok(())
}

fn verify_events(change: &ChangeSet) -> Result<(), EventStoreError> {
    let id = &change.aggregate_id;

    if change.events.is_empty() {
        return Err(EventStoreError::InvalidChangeSet(format!(
            "changeset for aggregate {id} carries no events"
        )));
    }

    for (offset, event) in (1u64..).zip(change.events.iter()) {
        if &event.aggregate_id != id {
            return Err(EventStoreError::InvalidChangeSet(format!(
                "event {} belongs to aggregate {}, not {id}",
                event.version, event.aggregate_id
            )));
        }
        let expected = change.expected_source_version + offset;
        if event.version != expected {
            return Err(EventStoreError::InvalidChangeSet(format!(
                "aggregate {id} expected event version {expected}, found {}",
                event.version
            )));
        }
    }

    let last = change.expected_source_version + change.events.len() as u64;
    if last != change.expected_version {
        return Err(EventStoreError::InvalidChangeSet(format!(
            "aggregate {id} events end at version {last}, changeset expects {}",
            change.expected_version
        )));
    }

    if let Some(snapshot) = &change.snapshot
        && snapshot.version != change.expected_version
    {
        return Err(EventStoreError::InvalidChangeSet(format!(
            "snapshot of aggregate {id} is at version {}, changeset expects {}",
            snapshot.version, change.expected_version
        )));
    }

    Ok(())
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    #[tracing::instrument(skip(self, context), fields(correlation_id = %context.correlation_id))]
    async fn load_by(
        &self,
        aggregate_id: &AggregateId,
        context: &CommandContext,
    ) -> Result<Option<AggregateRecord>, EventStoreError> {
        let streams = self.streams.read().await;
        let Some(stream) = streams.get(aggregate_id) else {
            debug!("aggregate not in store");
            return Ok(None);
        };

        let events = match &stream.snapshot {
            Some(snapshot) => stream
                .events
                .iter()
                .filter(|event| event.version > snapshot.version)
                .cloned()
                .collect(),
            None => stream.events.clone(),
        };

        Ok(Some(AggregateRecord {
            aggregate_id: aggregate_id.clone(),
            aggregate_type: stream.aggregate_type.clone(),
            events,
            snapshot: stream.snapshot.clone(),
        }))
    }

    #[tracing::instrument(
        skip_all,
        fields(batch_size = changes.len(), correlation_id = %context.correlation_id)
    )]
    async fn save(
        &self,
        changes: Vec<ChangeSet>,
        context: &CommandContext,
    ) -> Result<(), EventStoreError> {
        let mut streams = self.streams.write().await;

        if let Err(err) = verify_batch(&streams, &changes) {
            warn!(error = %err, "rejected batch");
            return Err(err);
        }

        for change in changes {
            let stream = streams
                .entry(change.aggregate_id.clone())
                .or_insert_with(|| Stream {
                    aggregate_type: change.aggregate_type.clone(),
                    version: 0,
                    events: Vec::new(),
                    snapshot: None,
                });

            stream.version = change.expected_version;
            stream.events.extend(change.events);
            if let Some(snapshot) = change.snapshot {
                if self.compact_on_snapshot {
                    stream.events.retain(|event| event.version > snapshot.version);
                }
                stream.snapshot = Some(snapshot);
            }

            debug!(
                aggregate_id = %change.aggregate_id,
                version = stream.version,
                "applied changeset"
            );
        }

        Ok(())
    }
}

/// Event store error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventStoreError {
    #[error(
        "Concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual} (reload and retry)"
    )]
    Concurrency {
        aggregate_id: AggregateId,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid changeset: {0}")]
    InvalidChangeSet(String),

    /// Backend failure reported by a custom store
    #[error("Storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(id: &AggregateId, version: u64) -> StoredEvent {
        StoredEvent {
            aggregate_id: id.clone(),
            event_type: "incremented".to_string(),
            version,
            data: br#"{"by":1}"#.to_vec(),
        }
    }

    fn change(id: &AggregateId, from: u64, to: u64) -> ChangeSet {
        ChangeSet {
            aggregate_id: id.clone(),
            aggregate_type: "Counter".to_string(),
            events: (from + 1..=to).map(|v| stored(id, v)).collect(),
            expected_source_version: from,
            expected_version: to,
            snapshot: None,
        }
    }

    fn snapshot_at(version: u64) -> StoredSnapshot {
        StoredSnapshot {
            state_type: "CounterState".to_string(),
            version,
            data: br#"{"total":3}"#.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryEventStore::new();
        let ctx = CommandContext::new();
        let id = AggregateId::from_raw("agg-1");

        store.save(vec![change(&id, 0, 2)], &ctx).await.unwrap();

        let record = store.load_by(&id, &ctx).await.unwrap().unwrap();
        assert_eq!(record.aggregate_type, "Counter");
        assert_eq!(record.events.len(), 2);
        assert_eq!(record.events[0].version, 1);
        assert_eq!(record.events[1].version, 2);
        assert!(record.snapshot.is_none());
        assert_eq!(store.stream_version(&id).await, Some(2));
    }

    #[tokio::test]
    async fn test_unknown_id_is_none() {
        let store = InMemoryEventStore::new();
        let loaded = store
            .load_by(&AggregateId::from_raw("missing"), &CommandContext::new())
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_version_conflict() {
        let store = InMemoryEventStore::new();
        let ctx = CommandContext::new();
        let id = AggregateId::from_raw("agg-1");

        store.save(vec![change(&id, 0, 1)], &ctx).await.unwrap();

        let result = store.save(vec![change(&id, 0, 1)], &ctx).await;
        assert_eq!(
            result,
            Err(EventStoreError::Concurrency {
                aggregate_id: id.clone(),
                expected: 0,
                actual: 1,
            })
        );
        assert_eq!(store.stream_version(&id).await, Some(1));
    }

    #[tokio::test]
    async fn test_failed_batch_applies_nothing() {
        let store = InMemoryEventStore::new();
        let ctx = CommandContext::new();
        let stale = AggregateId::from_raw("agg-stale");
        let fresh = AggregateId::from_raw("agg-fresh");

        store.save(vec![change(&stale, 0, 1)], &ctx).await.unwrap();

        let result = store
            .save(vec![change(&fresh, 0, 1), change(&stale, 0, 1)], &ctx)
            .await;
        assert!(matches!(result, Err(EventStoreError::Concurrency { ref aggregate_id, .. }) if aggregate_id == &stale));
        assert_eq!(store.stream_version(&fresh).await, None);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_snapshot_hides_older_events() {
        let store = InMemoryEventStore::new();
        let ctx = CommandContext::new();
        let id = AggregateId::from_raw("agg-1");

        let mut first = change(&id, 0, 3);
        first.snapshot = Some(snapshot_at(3));
        store.save(vec![first], &ctx).await.unwrap();

        let record = store.load_by(&id, &ctx).await.unwrap().unwrap();
        assert!(record.events.is_empty());
        assert_eq!(record.snapshot.as_ref().map(|s| s.version), Some(3));

        store.save(vec![change(&id, 3, 4)], &ctx).await.unwrap();
        let record = store.load_by(&id, &ctx).await.unwrap().unwrap();
        assert_eq!(record.events.len(), 1);
        assert_eq!(record.events[0].version, 4);

        // full log is kept unless compaction is on
        assert_eq!(store.all_events().await.len(), 4);
    }

    #[tokio::test]
    async fn test_compaction_drops_snapshotted_events() {
        let config = EventSourcingConfig {
            compact_on_snapshot: true,
            ..EventSourcingConfig::default()
        };
        let store = InMemoryEventStore::with_config(&config);
        let ctx = CommandContext::new();
        let id = AggregateId::from_raw("agg-1");

        let mut first = change(&id, 0, 3);
        first.snapshot = Some(snapshot_at(3));
        store.save(vec![first], &ctx).await.unwrap();

        assert!(store.all_events().await.is_empty());
        assert_eq!(store.snapshot_of(&id).await.map(|s| s.version), Some(3));
    }

    #[tokio::test]
    async fn test_rejects_malformed_changesets() {
        let store = InMemoryEventStore::new();
        let ctx = CommandContext::new();
        let id = AggregateId::from_raw("agg-1");

        let mut gap = change(&id, 0, 2);
        gap.events.remove(0);
        assert!(matches!(
            store.save(vec![gap], &ctx).await,
            Err(EventStoreError::InvalidChangeSet(_))
        ));

        let mut wrong_end = change(&id, 0, 2);
        wrong_end.expected_version = 5;
        assert!(matches!(
            store.save(vec![wrong_end], &ctx).await,
            Err(EventStoreError::InvalidChangeSet(_))
        ));

        let mut stale_snapshot = change(&id, 0, 2);
        stale_snapshot.snapshot = Some(snapshot_at(1));
        assert!(matches!(
            store.save(vec![stale_snapshot], &ctx).await,
            Err(EventStoreError::InvalidChangeSet(_))
        ));

        assert!(matches!(
            store.save(vec![change(&id, 0, 1), change(&id, 0, 1)], &ctx).await,
            Err(EventStoreError::InvalidChangeSet(_))
        ));

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_rejects_type_change() {
        let store = InMemoryEventStore::new();
        let ctx = CommandContext::new();
        let id = AggregateId::from_raw("agg-1");

        store.save(vec![change(&id, 0, 1)], &ctx).await.unwrap();

        let mut other = change(&id, 1, 2);
        other.aggregate_type = "Account".to_string();
        assert!(matches!(
            store.save(vec![other], &ctx).await,
            Err(EventStoreError::InvalidChangeSet(_))
        ));
    }

    #[tokio::test]
    async fn test_clear() {
        let store = InMemoryEventStore::new();
        let ctx = CommandContext::new();
        store
            .save(vec![change(&AggregateId::from_raw("agg-1"), 0, 1)], &ctx)
            .await
            .unwrap();

        store.clear().await;
        assert!(store.is_empty().await);
    }
}
