//! Event and snapshot definitions

use crate::id::AggregateId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::marker::PhantomData;

/// Domain event payload
///
/// Implemented by the closed event type of an aggregate, usually an enum with
/// one variant per fact the aggregate can record.
pub trait DomainEvent: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    /// Stable type tag written next to the encoded payload.
    fn event_type(&self) -> &'static str;
}

/// Immutable event envelope
///
/// Carries the aggregate it belongs to and the version it was recorded at.
/// Both are fixed at construction; build one with [`Event::builder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event<P> {
    aggregate_id: AggregateId,
    version: u64,
    payload: P,
}

impl<P> Event<P> {
    /// Start building an event for `aggregate_id`.
    pub fn builder(aggregate_id: &AggregateId) -> EventBuilder<'_, P> {
        EventBuilder {
            aggregate_id,
            version: 1,
            _payload: PhantomData,
        }
    }

    pub fn aggregate_id(&self) -> &AggregateId {
        &self.aggregate_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }
}

impl<P: DomainEvent> Event<P> {
    /// Type tag of the payload
    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}

/// Builder for [`Event`]
#[derive(Debug)]
pub struct EventBuilder<'a, P> {
    aggregate_id: &'a AggregateId,
    version: u64,
    _payload: PhantomData<fn() -> P>,
}

impl<P> EventBuilder<'_, P> {
    /// Set the version the event is recorded at.
    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Finish the event with its payload.
    pub fn build(self, payload: P) -> Event<P> {
        Event {
            aggregate_id: self.aggregate_id.clone(),
            version: self.version,
            payload,
        }
    }
}

/// Aggregate snapshot
///
/// Point-in-time compaction of an aggregate's state. `version` is the
/// aggregate version when the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot<S> {
    /// Type tag of the snapshot payload
    pub state_type: String,

    /// Version at snapshot
    pub version: u64,

    /// Snapshot payload
    pub payload: S,
}

impl<S> Snapshot<S> {
    /// Create new snapshot
    pub fn new(state_type: impl Into<String>, version: u64, payload: S) -> Self {
        Self {
            state_type: state_type.into(),
            version,
            payload,
        }
    }
}
