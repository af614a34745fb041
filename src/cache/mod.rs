//! Three-Tiered Player Cache
//!
//! Capacity- and TTL-bounded tiers of player records with promotion on read,
//! cascading demotion on capacity pressure, and a lossy codec for the cold
//! tier. The query result cache lives alongside and is independent.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                           TieredStore                                     │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  Hot                  │ Warm                 │ Cold                      │
//! │  ┌────────────────┐   │ ┌────────────────┐   │ ┌────────────────────┐    │
//! │  │ PlayerRecord   │   │ │ PlayerRecord   │   │ │ CompactRecord      │    │
//! │  │ cap 500, 1h    │   │ │ cap 2000, 24h  │   │ │ cap 10000, 7d      │    │
//! │  └────────────────┘   │ └────────────────┘   │ └────────────────────┘    │
//! │         │             │         │            │           │               │
//! │         └─────────────┴─────────┴────────────┴───────────┘               │
//! │                              │                                           │
//! │                    Promotion/Demotion (EvictionOrder)                    │
//! └──────────────────────────────────────────────────────────────────────────┘
//!
//! ┌──────────────────────────────┐
//! │ QueryCache (read-only SQL)   │  TTL + batch eviction of the oldest 10%
//! └──────────────────────────────┘
//! ```
//!
//! # Invariants
//!
//! - A key lives in at most one tier
//! - No tier exceeds its capacity; overflow demotes before inserting
//! - TTL sweeps delete, they never demote
//! - Records read back from cold are `partial`

pub mod compact;
mod entry;
mod metrics;
mod policy;
pub mod query;
mod tiered;

pub use compact::{compress, decompress, CompactRecord};
pub use entry::{CacheEntry, EntryMetadata};
pub use metrics::{CacheCounters, CacheMetrics};
pub use policy::{EvictionOrder, TierLimits};
pub use query::{is_read_only, QueryCache, QueryCacheStats, QueryKey};
pub use tiered::{CacheTier, Lookup, TierCounts, TieredStore};
