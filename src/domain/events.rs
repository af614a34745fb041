//! Cache Events
//!
//! Immutable records of significant occurrences inside the cache subsystem.
//! They flow through the [`EventPublisher`](super::ports::EventPublisher)
//! port, which is the observability channel for write-behind failures.
//!
//! # Example
//!
//! ```ignore
//! let event = CacheEvent::flush_failed(UpdateKind::Stats, 50, 50, "connection refused");
//! publisher.publish(event).await?;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::write_behind::UpdateKind;

/// Event emitted by the cache subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CacheEvent {
    // =========================================================================
    // Write-Behind Events
    // =========================================================================
    /// A batch was persisted.
    FlushSucceeded {
        kind: UpdateKind,
        records: usize,
        rows: usize,
        timestamp: DateTime<Utc>,
    },

    /// A batch failed and was put back at the front of its buffer.
    FlushFailed {
        kind: UpdateKind,
        records: usize,
        requeued: usize,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Updates were handed to the dead-letter sink.
    BatchDeadLettered {
        kind: UpdateKind,
        records: usize,
        error: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Read Path Events
    // =========================================================================
    /// A read-through load failed and was reported to the caller as a miss.
    LoadFailed {
        key: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Maintenance Events
    // =========================================================================
    /// A TTL sweep finished.
    SweepCompleted {
        hot: usize,
        warm: usize,
        cold: usize,
        queries: usize,
        timestamp: DateTime<Utc>,
    },
}

impl CacheEvent {
    /// Event type name, as used in the serialized `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::FlushSucceeded { .. } => "FlushSucceeded",
            CacheEvent::FlushFailed { .. } => "FlushFailed",
            CacheEvent::BatchDeadLettered { .. } => "BatchDeadLettered",
            CacheEvent::LoadFailed { .. } => "LoadFailed",
            CacheEvent::SweepCompleted { .. } => "SweepCompleted",
        }
    }

    /// Timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CacheEvent::FlushSucceeded { timestamp, .. }
            | CacheEvent::FlushFailed { timestamp, .. }
            | CacheEvent::BatchDeadLettered { timestamp, .. }
            | CacheEvent::LoadFailed { timestamp, .. }
            | CacheEvent::SweepCompleted { timestamp, .. } => *timestamp,
        }
    }

    pub fn flush_succeeded(kind: UpdateKind, records: usize, rows: usize) -> Self {
        CacheEvent::FlushSucceeded {
            kind,
            records,
            rows,
            timestamp: Utc::now(),
        }
    }

    pub fn flush_failed(
        kind: UpdateKind,
        records: usize,
        requeued: usize,
        error: impl Into<String>,
    ) -> Self {
        CacheEvent::FlushFailed {
            kind,
            records,
            requeued,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn batch_dead_lettered(kind: UpdateKind, records: usize, error: impl Into<String>) -> Self {
        CacheEvent::BatchDeadLettered {
            kind,
            records,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn load_failed(key: impl Into<String>, error: impl Into<String>) -> Self {
        CacheEvent::LoadFailed {
            key: key.into(),
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn sweep_completed(hot: usize, warm: usize, cold: usize, queries: usize) -> Self {
        CacheEvent::SweepCompleted {
            hot,
            warm,
            cold,
            queries,
            timestamp: Utc::now(),
        }
    }

    /// Whether the event reports a failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CacheEvent::FlushFailed { .. }
                | CacheEvent::BatchDeadLettered { .. }
                | CacheEvent::LoadFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_matches_serde_tag() {
        let event = CacheEvent::flush_failed(UpdateKind::Stats, 10, 10, "connection refused");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["kind"], "stats");
        assert_eq!(json["requeued"], 10);
    }

    #[test]
    fn test_failure_classification() {
        assert!(CacheEvent::load_failed("u1", "timeout").is_failure());
        assert!(CacheEvent::batch_dead_lettered(UpdateKind::Inventory, 3, "bad column").is_failure());
        assert!(!CacheEvent::flush_succeeded(UpdateKind::Stats, 5, 4).is_failure());
        assert!(!CacheEvent::sweep_completed(1, 0, 0, 2).is_failure());
    }

    #[test]
    fn test_event_roundtrip() {
        let event = CacheEvent::sweep_completed(1, 2, 3, 4);
        let json = serde_json::to_string(&event).unwrap();
        let parsed: CacheEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.event_type(), "SweepCompleted");
        assert_eq!(parsed.timestamp(), event.timestamp());
    }
}
