// Strata - an event-sourcing kernel for Rust
//
// Aggregates record typed domain events, a repository loads and saves them
// through a pluggable async event store, and snapshots keep replays short.

// Re-export the event model
pub use strata_events as events;
pub use strata_events::{
    AggregateId, AggregateRecord, ChangeSet, Codec, CodecError, CommandContext, DomainEvent,
    Event, IdGenerator, JsonCodec, Snapshot, StoredEvent, StoredSnapshot, UuidGenerator,
};

// Re-export the kernel, repository and store
pub use strata_eventsourcing as eventsourcing;
pub use strata_eventsourcing::{
    Aggregate, AggregateError, AggregateRepository, AggregateRoot, EventSourcingConfig,
    EventStore, EventStoreError, Handle, InMemoryEventStore, Persistable, SnapshotHooks,
};

// Re-export for implementing custom event stores
pub use async_trait::async_trait;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::async_trait;
    pub use strata_events::{
        AggregateId, AggregateRecord, ChangeSet, CommandContext, DomainEvent, Event, Snapshot,
    };
    pub use strata_eventsourcing::{
        Aggregate, AggregateError, AggregateRepository, AggregateRoot, EventSourcingConfig,
        EventStore, EventStoreError, Handle, InMemoryEventStore, Persistable, SnapshotHooks,
    };
}
