//! Aggregate repository

use crate::aggregate::{Aggregate, AggregateError, AggregateHistory, AggregateRoot};
use crate::config::EventSourcingConfig;
use crate::store::EventStore;
use std::collections::HashSet;
use std::sync::Arc;
use strata_events::{
    AggregateId, AggregateRecord, ChangeSet, Codec, CodecError, CommandContext, DomainEvent,
    Event, IdGenerator, JsonCodec, Snapshot, StoredEvent, StoredSnapshot, UuidGenerator,
    decode_payload, encode_payload,
};
use tracing::{debug, info};

/// Object-safe view of an aggregate the repository can persist.
///
/// Lets a single save call cover aggregates of different types.
pub trait Persistable: Send {
    fn aggregate_id(&self) -> &AggregateId;

    fn aggregate_type(&self) -> &'static str;

    /// Encode pending changes, or `None` when there is nothing to persist.
    fn prepare_change_set(&mut self, codec: &dyn Codec) -> Result<Option<ChangeSet>, AggregateError>;

    /// Mark prepared changes as persisted
    fn commit(&mut self);
}

impl<A: Aggregate> Persistable for AggregateRoot<A> {
    fn aggregate_id(&self) -> &AggregateId {
        self.id()
    }

    fn aggregate_type(&self) -> &'static str {
        A::AGGREGATE_TYPE
    }

    fn prepare_change_set(&mut self, codec: &dyn Codec) -> Result<Option<ChangeSet>, AggregateError> {
        let Some(changes) = self.get_changes()? else {
            return Ok(None);
        };

        let events = changes
            .events
            .iter()
            .map(|event| encode_event(codec, event))
            .collect::<Result<Vec<_>, _>>()?;

        let snapshot = changes
            .snapshot
            .map(|snapshot| {
                encode_payload(codec, &snapshot.state_type, &snapshot.payload).map(|data| {
                    StoredSnapshot {
                        state_type: snapshot.state_type,
                        version: snapshot.version,
                        data,
                    }
                })
            })
            .transpose()?;

        Ok(Some(ChangeSet {
            aggregate_id: changes.aggregate_id,
            aggregate_type: changes.aggregate_type.to_string(),
            events,
            expected_source_version: changes.expected_source_version,
            expected_version: changes.expected_version,
            snapshot,
        }))
    }

    fn commit(&mut self) {
        AggregateRoot::commit(self);
    }
}

fn encode_event<E: DomainEvent>(codec: &dyn Codec, event: &Event<E>) -> Result<StoredEvent, CodecError> {
    let event_type = event.event_type();
    Ok(StoredEvent {
        aggregate_id: event.aggregate_id().clone(),
        event_type: event_type.to_string(),
        version: event.version(),
        data: encode_payload(codec, event_type, event.payload())?,
    })
}

fn decode_event<E: DomainEvent>(codec: &dyn Codec, stored: StoredEvent) -> Result<Event<E>, CodecError> {
    let payload: E = decode_payload(codec, &stored.event_type, &stored.data)?;
    if payload.event_type() != stored.event_type {
        return Err(CodecError::not_decodable(
            &stored.event_type,
            format!("payload decodes as '{}'", payload.event_type()),
        ));
    }
    Ok(Event::builder(&stored.aggregate_id)
        .version(stored.version)
        .build(payload))
}

/// Aggregate repository
///
/// Provides load/save operations for aggregates with event sourcing. This is
/// the only component application code needs to call.
pub struct AggregateRepository<S>
where
    S: EventStore,
{
    store: Arc<S>,
    codec: Arc<dyn Codec>,
    ids: Arc<dyn IdGenerator>,
    context: CommandContext,
    config: EventSourcingConfig,
}

impl<S> AggregateRepository<S>
where
    S: EventStore,
{
    /// Create new repository
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, EventSourcingConfig::default())
    }

    /// Create repository with configuration
    pub fn with_config(store: Arc<S>, config: EventSourcingConfig) -> Self {
        Self {
            store,
            codec: Arc::new(JsonCodec::new()),
            ids: Arc::new(UuidGenerator),
            context: CommandContext::new(),
            config,
        }
    }

    /// Use a different payload codec
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Use a different id generator for validation
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Run subsequent calls under `context`
    pub fn with_context(mut self, context: CommandContext) -> Self {
        self.context = context;
        self
    }

    pub fn context(&self) -> &CommandContext {
        &self.context
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Create a fresh aggregate with an id from this repository's generator
    pub fn create<A: Aggregate>(&self) -> AggregateRoot<A> {
        AggregateRoot::with_generator(self.ids.as_ref())
    }

    fn parse_id(&self, raw: &str) -> Result<AggregateId, AggregateError> {
        if raw.is_empty() {
            return Err(AggregateError::InvalidArgument(
                "aggregate id must not be empty".to_string(),
            ));
        }
        if self.config.validate_ids && !self.ids.is_valid(raw) {
            return Err(AggregateError::InvalidArgument(format!(
                "malformed aggregate id: {}",
                raw
            )));
        }
        Ok(AggregateId::from_raw(raw))
    }

    /// Load aggregate by ID
    #[tracing::instrument(
        skip(self),
        fields(aggregate_type = A::AGGREGATE_TYPE, correlation_id = %self.context.correlation_id)
    )]
    pub async fn find_by<A: Aggregate>(&self, id: &str) -> Result<AggregateRoot<A>, AggregateError> {
        let id = self.parse_id(id)?;

        let record = self
            .store
            .load_by(&id, &self.context)
            .await?
            .ok_or_else(|| AggregateError::NotFound(id.to_string()))?;

        if record.aggregate_type.is_empty() || record.is_empty() {
            return Err(AggregateError::NotFound(id.to_string()));
        }
        if record.aggregate_type != A::AGGREGATE_TYPE {
            return Err(AggregateError::TypeMismatch {
                expected: A::AGGREGATE_TYPE.to_string(),
                found: record.aggregate_type,
            });
        }

        let history = self.decode_record::<A>(record)?;
        let aggregate = AggregateRoot::from_history(history)?;

        if self.config.enable_logging {
            info!(
                aggregate_id = %aggregate.id(),
                version = aggregate.version(),
                "loaded aggregate"
            );
        }
        Ok(aggregate)
    }

    fn decode_record<A: Aggregate>(
        &self,
        record: AggregateRecord,
    ) -> Result<AggregateHistory<A::Event, A::Snapshot>, AggregateError> {
        let codec = self.codec.as_ref();

        let snapshot = match record.snapshot {
            Some(stored) => {
                let hooks = A::snapshot_hooks().ok_or_else(|| {
                    AggregateError::InvalidSnapshot(format!(
                        "aggregate type {} does not support snapshots",
                        A::AGGREGATE_TYPE
                    ))
                })?;
                if stored.state_type != hooks.state_type {
                    return Err(CodecError::not_decodable(
                        &stored.state_type,
                        format!("expected snapshot state type '{}'", hooks.state_type),
                    )
                    .into());
                }
                let payload = decode_payload(codec, &stored.state_type, &stored.data)?;
                Some(Snapshot::new(stored.state_type, stored.version, payload))
            }
            None => None,
        };

        let events = record
            .events
            .into_iter()
            .map(|stored| decode_event(codec, stored))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AggregateHistory {
            aggregate_id: record.aggregate_id,
            events,
            snapshot,
        })
    }

    /// Save aggregate
    pub async fn save<A: Aggregate>(&self, aggregate: &mut AggregateRoot<A>) -> Result<(), AggregateError> {
        self.save_all(&mut [aggregate as &mut dyn Persistable]).await
    }

    /// Save several aggregates in one store call.
    ///
    /// Either every aggregate with pending changes is persisted and committed,
    /// or the error is returned and none of them is committed, so the call can
    /// be retried after reloading.
    #[tracing::instrument(
        skip_all,
        fields(batch_size = aggregates.len(), correlation_id = %self.context.correlation_id)
    )]
    pub async fn save_all(&self, aggregates: &mut [&mut dyn Persistable]) -> Result<(), AggregateError> {
        if aggregates.is_empty() {
            return Err(AggregateError::InvalidArgument(
                "nothing to save".to_string(),
            ));
        }

        {
            let mut seen = HashSet::with_capacity(aggregates.len());
            for aggregate in aggregates.iter() {
                if !seen.insert(aggregate.aggregate_id()) {
                    return Err(AggregateError::DuplicateAggregate(
                        aggregate.aggregate_id().clone(),
                    ));
                }
            }
        }

        let mut changes = Vec::new();
        let mut contributors = Vec::new();
        for (index, aggregate) in aggregates.iter_mut().enumerate() {
            if let Some(change) = aggregate.prepare_change_set(self.codec.as_ref())? {
                debug!(
                    aggregate_id = %aggregate.aggregate_id(),
                    aggregate_type = aggregate.aggregate_type(),
                    events = change.events.len(),
                    "prepared changeset"
                );
                changes.push(change);
                contributors.push(index);
            }
        }

        if changes.is_empty() {
            debug!("no pending changes");
            return Ok(());
        }

        let event_count: usize = changes.iter().map(|c| c.events.len()).sum();
        let snapshot_count = changes.iter().filter(|c| c.snapshot.is_some()).count();

        self.store.save(changes, &self.context).await?;

        for index in contributors {
            aggregates[index].commit();
        }

        if self.config.enable_logging {
            info!(event_count, snapshot_count, "saved aggregates");
        }
        Ok(())
    }
}

impl<S> Clone for AggregateRepository<S>
where
    S: EventStore,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            codec: self.codec.clone(),
            ids: self.ids.clone(),
            context: self.context.clone(),
            config: self.config.clone(),
        }
    }
}
