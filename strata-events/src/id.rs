//! Aggregate identifiers and their generators

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use uuid::Uuid;

/// Opaque aggregate identifier.
///
/// Generated once when an aggregate is created and never changed afterwards.
/// The default generator produces hyphenated UUID strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(String);

impl AggregateId {
    /// Parse and validate a UUID-shaped identifier.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        if raw.is_empty() {
            return Err(IdError::Empty);
        }
        Uuid::parse_str(raw)
            .map(|_| Self(raw.to_string()))
            .map_err(|e| IdError::Malformed {
                value: raw.to_string(),
                reason: e.to_string(),
            })
    }

    /// Wrap a raw string without validation.
    ///
    /// Used by custom [`IdGenerator`] implementations whose identifiers are not
    /// UUIDs, and by stores rehydrating identifiers they wrote themselves.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for AggregateId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for AggregateId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Uuid> for AggregateId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.hyphenated().to_string())
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("Aggregate id must not be empty")]
    Empty,

    #[error("Malformed aggregate id '{value}': {reason}")]
    Malformed { value: String, reason: String },
}

/// Source of fresh aggregate identifiers.
pub trait IdGenerator: Send + Sync {
    /// Produce a new, unique identifier.
    fn new_id(&self) -> AggregateId;

    /// Whether `raw` is an identifier this generator could have produced.
    fn is_valid(&self, raw: &str) -> bool;
}

/// UUID v4 generator (the default).
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn new_id(&self) -> AggregateId {
        AggregateId::from(Uuid::new_v4())
    }

    fn is_valid(&self, raw: &str) -> bool {
        AggregateId::parse(raw).is_ok()
    }
}
