//! Domain Ports (Port/Adapter Pattern)
//!
//! Abstractions for every collaborator the cache subsystem talks to.
//! Adapters in [`crate::adapters`] implement them; tests substitute
//! in-memory versions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Cache Subsystem                         │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │  BackingStore │ OriginMap/Mirror │ EventPublisher   │    │
//! │  │               │ DeadLetterSink                      │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Adapters                              │
//! │  InMemoryBackingStore │ PgBackingStore │ InMemoryOriginMap  │
//! │  LoggingEventPublisher │ InMemoryDeadLetters                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::events::CacheEvent;
use super::record::PlayerRecord;
use crate::error::{Error, Result};
use crate::write_behind::{PendingUpdate, UpdateKind};

// =============================================================================
// Query Value Objects
// =============================================================================

/// A bound query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Int(value)
    }
}

impl From<bool> for SqlParam {
    fn from(value: bool) -> Self {
        SqlParam::Bool(value)
    }
}

impl From<f64> for SqlParam {
    fn from(value: f64) -> Self {
        SqlParam::Float(value)
    }
}

/// One result row, column name to value.
pub type Row = Map<String, Value>;

/// Result of a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub rows: Vec<Row>,
}

impl RowSet {
    /// Create a row set from rows.
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the set has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// =============================================================================
// Backing Store Port
// =============================================================================

/// Durable store consulted on cache miss and written by the write-behind queue.
///
/// Implementations are expected to enforce their own per-call timeouts; the
/// facade additionally wraps `load` in a deadline.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Load a full player record. `Ok(None)` means the player does not exist.
    async fn load(&self, key: &str) -> Result<Option<PlayerRecord>>;

    /// Upsert a batch of rows of one kind, matched by identifier.
    ///
    /// The batch is applied atomically: either every row lands or none does.
    async fn bulk_upsert(&self, kind: UpdateKind, rows: &[PendingUpdate]) -> Result<()>;

    /// Run a query and return its rows.
    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<RowSet>;
}

// =============================================================================
// Origin Map Ports
// =============================================================================

/// Write capability onto the legacy direct-access player map.
pub trait Mirror: Send + Sync {
    /// Store a record under `key`.
    fn set(&self, key: &str, record: &PlayerRecord);
}

/// Legacy in-process map of players: readable synchronously and mirrored on
/// every cache write.
pub trait OriginMap: Mirror {
    /// Look up a record without suspending.
    fn get(&self, key: &str) -> Option<PlayerRecord>;
}

// =============================================================================
// Event Publisher Port
// =============================================================================

/// Observability channel for cache events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a single event.
    async fn publish(&self, event: CacheEvent) -> Result<()>;

    /// Publish multiple events.
    async fn publish_all(&self, events: Vec<CacheEvent>) -> Result<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    async fn publish(&self, event: CacheEvent) -> Result<()> {
        (**self).publish(event).await
    }

    async fn publish_all(&self, events: Vec<CacheEvent>) -> Result<()> {
        (**self).publish_all(events).await
    }
}

// =============================================================================
// Dead Letter Port
// =============================================================================

/// Destination for updates that will never be retried.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Accept updates that exhausted their retries or failed permanently.
    async fn accept(&self, kind: UpdateKind, updates: Vec<PendingUpdate>, error: &Error);
}

// =============================================================================
// Tests
// =============================================================================
