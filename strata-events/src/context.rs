//! Command context passed through to the event store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Context of the command a repository call is serving.
///
/// Stores receive it on every call, so a durable backend can record who or
/// what caused a write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandContext {
    /// Correlation ID for tracing
    pub correlation_id: Uuid,

    /// When the command was issued
    pub issued_at: DateTime<Utc>,

    /// Custom metadata
    pub metadata: serde_json::Value,
}

impl CommandContext {
    /// Create a context with a fresh correlation ID
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            issued_at: Utc::now(),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Set correlation ID
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = id;
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = &mut self.metadata {
            map.insert(key.into(), value);
        }
        self
    }
}

impl Default for CommandContext {
    fn default() -> Self {
        Self::new()
    }
}
