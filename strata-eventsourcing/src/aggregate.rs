//! Aggregate root for event sourcing

use crate::snapshot::{DEFAULT_SNAPSHOT_THRESHOLD, SnapshotCountdown};
use crate::store::EventStoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::{self, Debug};
use strata_events::{
    AggregateId, CodecError, DomainEvent, Event, IdError, IdGenerator, Snapshot, UuidGenerator,
};
use tracing::trace;

/// Aggregate trait
///
/// Implemented by the domain state of an aggregate. State only ever changes
/// through [`Aggregate::apply`], which the kernel calls for freshly raised
/// events and for events replayed from the store alike.
pub trait Aggregate: Default + Debug + Send + Sync + 'static {
    /// Aggregate type name written to the store
    const AGGREGATE_TYPE: &'static str;

    /// Number of events between two snapshots
    const SNAPSHOT_THRESHOLD: u32 = DEFAULT_SNAPSHOT_THRESHOLD;

    /// Closed set of events this aggregate records
    type Event: DomainEvent;

    /// Snapshot payload; use `()` for aggregates that never snapshot
    type Snapshot: Serialize + DeserializeOwned + Debug + Send + Sync + 'static;

    /// Apply an event to the aggregate
    fn apply(&mut self, event: &Self::Event);

    /// Snapshot capability. `None` means the aggregate is always rebuilt by
    /// full replay.
    fn snapshot_hooks() -> Option<SnapshotHooks<Self>> {
        None
    }
}

/// Command handling
///
/// Validates a command against the current state and returns the events it
/// produces, without mutating anything.
pub trait Handle<C>: Aggregate {
    type Error;

    fn handle(&self, command: &C) -> Result<Vec<Self::Event>, Self::Error>;
}

/// Snapshot hooks of a snapshotable aggregate
pub struct SnapshotHooks<A: Aggregate> {
    /// Type tag of the snapshot payload
    pub state_type: &'static str,

    /// Capture the current state
    pub take: fn(&A) -> A::Snapshot,

    /// Restore state from a snapshot payload
    pub restore: fn(&mut A, A::Snapshot),
}

impl<A: Aggregate> SnapshotHooks<A> {
    pub const fn new(
        state_type: &'static str,
        take: fn(&A) -> A::Snapshot,
        restore: fn(&mut A, A::Snapshot),
    ) -> Self {
        Self {
            state_type,
            take,
            restore,
        }
    }
}

impl<A: Aggregate> Clone for SnapshotHooks<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: Aggregate> Copy for SnapshotHooks<A> {}

impl<A: Aggregate> Debug for SnapshotHooks<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotHooks")
            .field("state_type", &self.state_type)
            .finish_non_exhaustive()
    }
}

/// Decoded history of one aggregate, as handed to [`AggregateRoot::load_from`].
#[derive(Debug, Clone)]
pub struct AggregateHistory<E, S> {
    pub aggregate_id: AggregateId,
    pub events: Vec<Event<E>>,
    pub snapshot: Option<Snapshot<S>>,
}

/// History type of aggregate `A`
pub type HistoryOf<A> = AggregateHistory<<A as Aggregate>::Event, <A as Aggregate>::Snapshot>;

/// Typed changes an aggregate wants persisted
#[derive(Debug, Clone)]
pub struct PendingChanges<E, S> {
    pub aggregate_id: AggregateId,
    pub aggregate_type: &'static str,
    pub events: Vec<Event<E>>,
    pub expected_source_version: u64,
    pub expected_version: u64,
    pub snapshot: Option<Snapshot<S>>,
}

/// Pending changes type of aggregate `A`
pub type ChangesOf<A> = PendingChanges<<A as Aggregate>::Event, <A as Aggregate>::Snapshot>;

/// Base aggregate implementation
///
/// Wraps the domain state with identity, version bookkeeping, the events
/// raised since the last commit and the snapshot countdown. At rest,
/// `version == source_version + pending_events().len()`.
pub struct AggregateRoot<A: Aggregate> {
    id: AggregateId,
    version: u64,
    source_version: u64,
    state: A,
    pending_events: Vec<Event<A::Event>>,
    hooks: Option<SnapshotHooks<A>>,
    countdown: SnapshotCountdown,
}

impl<A: Aggregate> AggregateRoot<A> {
    /// Create new aggregate with a generated UUID
    pub fn new() -> Self {
        Self::with_generator(&UuidGenerator)
    }

    /// Create new aggregate with an id from `generator`
    pub fn with_generator(generator: &dyn IdGenerator) -> Self {
        Self::with_id(generator.new_id())
    }

    /// Create new aggregate with a known id
    pub fn with_id(id: AggregateId) -> Self {
        Self {
            id,
            version: 0,
            source_version: 0,
            state: A::default(),
            pending_events: Vec::new(),
            hooks: A::snapshot_hooks(),
            countdown: SnapshotCountdown::new(A::SNAPSHOT_THRESHOLD),
        }
    }

    /// Rebuild an aggregate from its history
    pub fn from_history(history: HistoryOf<A>) -> Result<Self, AggregateError> {
        let mut aggregate = Self::with_id(history.aggregate_id.clone());
        aggregate.load_from(history)?;
        Ok(aggregate)
    }

    pub fn id(&self) -> &AggregateId {
        &self.id
    }

    /// Current version, including pending events
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Version last known to be persisted
    pub fn source_version(&self) -> u64 {
        self.source_version
    }

    /// Get state reference
    pub fn state(&self) -> &A {
        &self.state
    }

    /// Events raised since the last commit
    pub fn pending_events(&self) -> &[Event<A::Event>] {
        &self.pending_events
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.pending_events.is_empty()
    }

    pub fn is_snapshotable(&self) -> bool {
        self.hooks.is_some()
    }

    /// Whether the next set of changes will carry a snapshot
    pub fn snapshot_due(&self) -> bool {
        self.hooks.is_some() && self.countdown.is_due()
    }

    pub fn countdown(&self) -> &SnapshotCountdown {
        &self.countdown
    }

    /// Whether a client that last saw `client_version` is behind the store.
    pub fn is_version_conflicted(&self, client_version: u64) -> bool {
        client_version != self.source_version
    }

    /// Record a new event.
    ///
    /// The event is stamped with this aggregate's id and the next version,
    /// applied to the state, and queued until the next commit. Returns the
    /// version it was recorded at.
    pub fn raise_event(&mut self, payload: A::Event) -> u64 {
        let event = Event::builder(&self.id)
            .version(self.version + 1)
            .build(payload);

        self.state.apply(event.payload());
        self.version = event.version();
        if self.hooks.is_some() {
            self.countdown.tick();
        }

        trace!(
            aggregate_id = %self.id,
            event_type = event.event_type(),
            version = self.version,
            "raised event"
        );
        self.pending_events.push(event);
        self.version
    }

    /// Handle a command and raise the events it produces.
    ///
    /// Nothing is raised when the command is rejected. Returns the number of
    /// events raised.
    pub fn execute<C>(&mut self, command: &C) -> Result<usize, <A as Handle<C>>::Error>
    where
        A: Handle<C>,
    {
        let events = self.state.handle(command)?;
        let count = events.len();
        for event in events {
            self.raise_event(event);
        }
        Ok(count)
    }

    /// Replace this aggregate's state with the one described by `history`.
    ///
    /// The snapshot, if any, is restored first; events are then replayed in
    /// version order. Events must belong to `history.aggregate_id` and carry
    /// contiguous versions starting right after the snapshot. The aggregate is
    /// left untouched when validation fails. Pending events are discarded.
    pub fn load_from(&mut self, history: HistoryOf<A>) -> Result<(), AggregateError> {
        let AggregateHistory {
            aggregate_id,
            mut events,
            snapshot,
        } = history;

        let restore = match (&snapshot, self.hooks) {
            (None, _) => None,
            (Some(_), None) => {
                return Err(AggregateError::InvalidSnapshot(format!(
                    "aggregate type {} does not support snapshots",
                    A::AGGREGATE_TYPE
                )));
            }
            (Some(snapshot), Some(_)) if snapshot.version == 0 => {
                return Err(AggregateError::InvalidSnapshot(format!(
                    "snapshot of aggregate {aggregate_id} has version 0"
                )));
            }
            (Some(_), Some(hooks)) => Some(hooks.restore),
        };

        events.sort_by_key(Event::version);
        let base = snapshot.as_ref().map_or(0, |s| s.version);

        for (offset, event) in (1u64..).zip(events.iter()) {
            if event.aggregate_id() != &aggregate_id {
                return Err(AggregateError::InvalidEvent(format!(
                    "event {} belongs to aggregate {}, not {aggregate_id}",
                    event.version(),
                    event.aggregate_id()
                )));
            }
            if event.version() != base + offset {
                return Err(AggregateError::InvalidEvent(format!(
                    "aggregate {aggregate_id} expected event version {}, found {}",
                    base + offset,
                    event.version()
                )));
            }
        }

        let mut state = A::default();
        if let (Some(restore), Some(snapshot)) = (restore, snapshot) {
            restore(&mut state, snapshot.payload);
        }
        for event in &events {
            state.apply(event.payload());
        }

        let replayed = events.len();
        self.id = aggregate_id;
        self.state = state;
        self.version = base + replayed as u64;
        self.source_version = self.version;
        self.pending_events.clear();
        self.countdown.reseed(replayed);

        trace!(
            aggregate_id = %self.id,
            version = self.version,
            replayed,
            from_snapshot = base > 0,
            "loaded aggregate"
        );
        Ok(())
    }

    /// Collect what must be persisted.
    ///
    /// Returns `None` when there are no pending events. A snapshot of the
    /// current state is included when the countdown says one is due.
    pub fn get_changes(&mut self) -> Result<Option<ChangesOf<A>>, AggregateError> {
        if self.pending_events.is_empty() {
            return Ok(None);
        }

        let expected_version = self
            .pending_events
            .iter()
            .map(Event::version)
            .max()
            .unwrap_or(self.version);

        let snapshot = match self.hooks {
            Some(hooks) if self.countdown.is_due() => {
                if hooks.state_type.is_empty() {
                    return Err(AggregateError::InvalidSnapshot(format!(
                        "aggregate type {} declares an empty snapshot state type",
                        A::AGGREGATE_TYPE
                    )));
                }
                Some(Snapshot::new(
                    hooks.state_type,
                    self.version,
                    (hooks.take)(&self.state),
                ))
            }
            _ => None,
        };
        self.countdown.set_snapshot_taken(snapshot.is_some());

        Ok(Some(PendingChanges {
            aggregate_id: self.id.clone(),
            aggregate_type: A::AGGREGATE_TYPE,
            events: self.pending_events.clone(),
            expected_source_version: self.source_version,
            expected_version,
            snapshot,
        }))
    }

    /// Mark all pending events as persisted
    pub fn commit(&mut self) {
        self.pending_events.clear();
        self.source_version = self.version;
        self.countdown.on_commit();
    }
}

impl<A: Aggregate> Default for AggregateRoot<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Aggregate + Clone> Clone for AggregateRoot<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            version: self.version,
            source_version: self.source_version,
            state: self.state.clone(),
            pending_events: self.pending_events.clone(),
            hooks: self.hooks,
            countdown: self.countdown,
        }
    }
}

impl<A: Aggregate> Debug for AggregateRoot<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateRoot")
            .field("aggregate_type", &A::AGGREGATE_TYPE)
            .field("id", &self.id)
            .field("version", &self.version)
            .field("source_version", &self.source_version)
            .field("state", &self.state)
            .field("pending_events", &self.pending_events.len())
            .field("countdown", &self.countdown)
            .finish()
    }
}

/// Aggregate error
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Aggregate not found: {0}")]
    NotFound(String),

    #[error("Aggregate {0} appears more than once in the same save")]
    DuplicateAggregate(AggregateId),

    #[error("Aggregate type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] EventStoreError),
}

impl AggregateError {
    /// Whether the error is an optimistic concurrency conflict, i.e. the
    /// caller should reload, reapply its command and save again.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(
            self,
            AggregateError::Store(EventStoreError::Concurrency { .. })
        )
    }
}

impl From<IdError> for AggregateError {
    fn from(err: IdError) -> Self {
        AggregateError::InvalidArgument(err.to_string())
    }
}
