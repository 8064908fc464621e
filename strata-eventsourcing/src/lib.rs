//! Event Sourcing for Strata
//!
//! This crate provides the aggregate kernel, the repository and the event
//! store port with an in-memory store.
//!
//! ## Features
//!
//! - **Aggregates** - Event-sourced aggregate roots with typed events
//! - **Event Store** - Async storage port plus an in-memory implementation
//! - **Snapshots** - Periodic snapshots, opt-in per aggregate type
//! - **Repository** - Load/save aggregates, several per atomic save
//! - **Optimistic Concurrency** - Version-based conflict detection
//!
//! ## Quick Start
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//! use strata_events::DomainEvent;
//! use strata_eventsourcing::*;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! enum UserEvent {
//!     Registered { email: String },
//!     Deactivated,
//! }
//!
//! impl DomainEvent for UserEvent {
//!     fn event_type(&self) -> &'static str {
//!         match self {
//!             UserEvent::Registered { .. } => "user_registered",
//!             UserEvent::Deactivated => "user_deactivated",
//!         }
//!     }
//! }
//!
//! #[derive(Debug, Default)]
//! struct User {
//!     email: String,
//!     active: bool,
//! }
//!
//! impl Aggregate for User {
//!     const AGGREGATE_TYPE: &'static str = "User";
//!     type Event = UserEvent;
//!     type Snapshot = ();
//!
//!     fn apply(&mut self, event: &UserEvent) {
//!         match event {
//!             UserEvent::Registered { email } => {
//!                 self.email = email.clone();
//!                 self.active = true;
//!             }
//!             UserEvent::Deactivated => self.active = false,
//!         }
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let repo = AggregateRepository::new(Arc::new(InMemoryEventStore::new()));
//!
//! let mut user = repo.create::<User>();
//! user.raise_event(UserEvent::Registered {
//!     email: "alice@example.com".to_string(),
//! });
//! repo.save(&mut user).await?;
//!
//! let loaded = repo.find_by::<User>(user.id()).await?;
//! assert!(loaded.state().active);
//! assert_eq!(loaded.version(), 1);
//! # Ok::<(), AggregateError>(())
//! # }).unwrap();
//! ```
//!
//! ## Snapshots
//!
//! ```rust,ignore
//! impl Aggregate for User {
//!     // Snapshot every 10 events instead of the default 30
//!     const SNAPSHOT_THRESHOLD: u32 = 10;
//!     type Snapshot = UserState;
//!
//!     fn snapshot_hooks() -> Option<SnapshotHooks<Self>> {
//!         Some(SnapshotHooks::new("UserState", User::to_state, User::restore))
//!     }
//!     // ...
//! }
//! ```

pub mod aggregate;
pub mod config;
pub mod repository;
pub mod snapshot;
pub mod store;

pub use aggregate::{
    Aggregate, AggregateError, AggregateHistory, AggregateRoot, ChangesOf, Handle, HistoryOf,
    PendingChanges, SnapshotHooks,
};
pub use config::{ConfigError, DEFAULT_ENV_PREFIX, EventSourcingConfig};
pub use repository::{AggregateRepository, Persistable};
pub use snapshot::{DEFAULT_SNAPSHOT_THRESHOLD, SnapshotCountdown};
pub use store::{EventStore, EventStoreError, InMemoryEventStore};
