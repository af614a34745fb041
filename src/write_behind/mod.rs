//! Write-Behind Persistence
//!
//! Mutations reach the backing store asynchronously and in batches:
//!
//! - **Update** (`update.rs`) - Closed set of update kinds and their typed fields
//! - **Queue** (`queue.rs`) - Per-kind buffers, batch trigger, retry-by-requeue
//! - **Dead letter** (`dead_letter.rs`) - Sinks for updates that stopped retrying

mod dead_letter;
mod queue;
mod update;

pub use dead_letter::{DeadLetter, InMemoryDeadLetters, LoggingDeadLetters};
pub use queue::{FlushReport, WriteBehindCounters, WriteBehindQueue, WriteBehindStats};
pub use update::{
    AchievementUpdate, InventoryUpdate, PendingUpdate, StatUpdate, TelemetryUpdate, UpdateKind,
};
