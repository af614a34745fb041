//! Domain Layer
//!
//! Core types shared by every part of the cache subsystem.
//!
//! - **Record** (`record.rs`) - The player record and its class table
//! - **Ports** (`ports.rs`) - Trait abstractions for external collaborators
//! - **Events** (`events.rs`) - Cache events for the observability channel
//!
//! # Usage
//!
//! ```ignore
//! use strata::domain::ports::BackingStore;
//! use strata::domain::PlayerRecord;
//!
//! async fn warm_up<S: BackingStore>(store: &S, ids: &[&str]) -> Vec<PlayerRecord> {
//!     let mut records = Vec::new();
//!     for id in ids {
//!         if let Ok(Some(record)) = store.load(id).await {
//!             records.push(record);
//!         }
//!     }
//!     records
//! }
//! ```

pub mod events;
pub mod ports;
pub mod record;

pub use events::CacheEvent;
pub use ports::{
    BackingStore, DeadLetterSink, EventPublisher, Mirror, OriginMap, Row, RowSet, SqlParam,
};
pub use record::{class_code, class_name, PlayerRecord, FALLBACK_CLASS_CODE};
