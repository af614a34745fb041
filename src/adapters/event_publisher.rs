//! Event Publisher Adapter
//!
//! Implements the `EventPublisher` port with various backends.

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::domain::events::CacheEvent;
use crate::domain::ports::EventPublisher;
use crate::error::Result;

/// Logging-based event publisher.
///
/// Failure events are always logged at error level; everything else at
/// info or debug.
#[derive(Debug, Clone, Default)]
pub struct LoggingEventPublisher {
    /// Whether to log routine events at info level (true) or debug level (false)
    info_level: bool,
}

impl LoggingEventPublisher {
    /// Create a new logging event publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a publisher that logs routine events at info level.
    pub fn info_level() -> Self {
        Self { info_level: true }
    }

    /// Create a publisher that logs routine events at debug level.
    pub fn debug_level() -> Self {
        Self { info_level: false }
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: CacheEvent) -> Result<()> {
        let event_type = event.event_type();
        let json = serde_json::to_string(&event).unwrap_or_else(|_| format!("{:?}", event));

        if event.is_failure() {
            error!(event_type = %event_type, event = %json, "Cache event");
        } else if self.info_level {
            info!(event_type = %event_type, event = %json, "Cache event");
        } else {
            debug!(event_type = %event_type, event = %json, "Cache event");
        }

        Ok(())
    }
}

/// In-memory event collector for testing.
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    events: parking_lot::RwLock<Vec<CacheEvent>>,
}

impl InMemoryEventCollector {
    /// Create a new in-memory event collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events.
    pub fn events(&self) -> Vec<CacheEvent> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Get events of a specific type.
    pub fn events_of_type(&self, event_type: &str) -> Vec<CacheEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }

    /// Get every failure event.
    pub fn failures(&self) -> Vec<CacheEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.is_failure())
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventCollector {
    async fn publish(&self, event: CacheEvent) -> Result<()> {
        self.events.write().push(event);
        Ok(())
    }

    async fn publish_all(&self, events: Vec<CacheEvent>) -> Result<()> {
        self.events.write().extend(events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write_behind::UpdateKind;

    #[tokio::test]
    async fn test_logging_publisher() {
        let publisher = LoggingEventPublisher::info_level();
        publisher
            .publish(CacheEvent::flush_succeeded(UpdateKind::Stats, 10, 8))
            .await
            .unwrap();
        publisher
            .publish(CacheEvent::load_failed("u1", "timed out"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_in_memory_collector() {
        let collector = InMemoryEventCollector::new();
        assert!(collector.is_empty());

        collector
            .publish_all(vec![
                CacheEvent::flush_succeeded(UpdateKind::Stats, 10, 8),
                CacheEvent::flush_failed(UpdateKind::Telemetry, 4, 4, "connection refused"),
                CacheEvent::sweep_completed(1, 0, 0, 2),
            ])
            .await
            .unwrap();

        assert_eq!(collector.len(), 3);
        assert_eq!(collector.events_of_type("FlushFailed").len(), 1);
        assert_eq!(collector.failures().len(), 1);

        collector.clear();
        assert!(collector.is_empty());
    }
}
