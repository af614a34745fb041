//! Strata - Multi-Tier Adaptive Player Cache
//!
//! An in-process cache for player records that sits between a game's
//! command handlers and a relational backing store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         CacheFacade                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐   ┌──────────────┐    │
//! │  │   Hot    │─▶│   Warm   │─▶│   Cold   │   │ Query Cache  │    │
//! │  │  (full)  │  │  (full)  │  │(compact) │   │  (TTL rows)  │    │
//! │  └──────────┘  └──────────┘  └──────────┘   └──────────────┘    │
//! │        │                                                         │
//! │        ▼                                                         │
//! │  ┌────────────────────┐        ┌────────────────────────┐       │
//! │  │ Write-Behind Queue │───────▶│     Backing Store      │       │
//! │  │  (per-kind batches)│        │ (memory or Postgres)   │       │
//! │  └────────────────────┘        └────────────────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads fall through hot, warm and cold before loading from the backing
//! store; a hit in a lower tier promotes the record one level. Writes land in
//! the hot tier immediately and are persisted in batches by the write-behind
//! queue, which a [`Ticker`] flushes on an interval.
//!
//! # Modules
//!
//! - [`adapters`] - Backing store, origin map and event publisher adapters
//! - [`cache`] - Tiered store, compression codec and query cache
//! - [`config`] - Configuration and YAML loading
//! - [`domain`] - Player records, ports and events
//! - [`error`] - Error types
//! - [`service`] - Facade, single-flight loads and the background ticker
//! - [`write_behind`] - Pending updates and the batching queue

pub mod adapters;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod write_behind;

// Re-export commonly used types
pub use cache::{CacheTier, EvictionOrder, TieredStore};
pub use config::StrataConfig;
pub use domain::{CacheEvent, PlayerRecord, RowSet, SqlParam};
pub use error::{Error, Result};
pub use service::{CacheFacade, HealthSnapshot, Ticker};
pub use write_behind::{PendingUpdate, UpdateKind, WriteBehindQueue};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
