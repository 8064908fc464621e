//! Event primitives for Strata
//!
//! This crate holds the types shared between aggregates and event stores.
//!
//! ## Features
//!
//! - **Identifiers** - `AggregateId` plus a pluggable `IdGenerator`
//! - **Events** - Immutable `Event<P>` envelopes built with their final id and version
//! - **Snapshots** - `Snapshot<S>` compactions of aggregate state
//! - **Records** - The encoded layout stores read and write
//! - **Codec** - Byte encoding of payloads (`JsonCodec` by default)
//!
//! ## Quick Start
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use strata_events::*;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! enum CounterEvent {
//!     Incremented { by: u32 },
//! }
//!
//! impl DomainEvent for CounterEvent {
//!     fn event_type(&self) -> &'static str {
//!         "incremented"
//!     }
//! }
//!
//! let id = UuidGenerator.new_id();
//! let event = Event::builder(&id).version(1).build(CounterEvent::Incremented { by: 2 });
//!
//! let bytes = encode_payload(&JsonCodec::new(), event.event_type(), event.payload()).unwrap();
//! let decoded: CounterEvent = decode_payload(&JsonCodec::new(), "incremented", &bytes).unwrap();
//! assert!(matches!(decoded, CounterEvent::Incremented { by: 2 }));
//! ```

pub mod codec;
pub mod context;
pub mod event;
pub mod id;
pub mod record;

pub use codec::{Codec, CodecError, JsonCodec, decode_payload, encode_payload};
pub use context::CommandContext;
pub use event::{DomainEvent, Event, EventBuilder, Snapshot};
pub use id::{AggregateId, IdError, IdGenerator, UuidGenerator};
pub use record::{AggregateRecord, ChangeSet, StoredEvent, StoredSnapshot};
