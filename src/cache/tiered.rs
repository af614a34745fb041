//! Tiered Cache Store
//!
//! Three capacity-bounded maps of player entries:
//!
//! ```text
//!   put ──▶ ┌──────────┐  evict   ┌──────────┐  evict + compress  ┌──────────┐  evict
//!           │   HOT    │ ───────▶ │   WARM   │ ─────────────────▶ │   COLD   │ ──────▶ gone
//!           │  full    │          │  full    │                    │ compact  │
//!           └──────────┘ ◀─────── └──────────┘ ◀───────────────── └──────────┘
//!                         warm hit              cold hit + decompress
//! ```
//!
//! A key lives in at most one tier. Every operation here is synchronous;
//! callers sharing a store serialize access through a lock that is never
//! held across a suspension point.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use tracing::trace;

use super::compact::{compress, decompress, CompactRecord};
use super::entry::CacheEntry;
use super::metrics::CacheMetrics;
use crate::config::TierSettings;
use crate::domain::PlayerRecord;

/// Cache tier enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    /// Full records, shortest TTL
    Hot,
    /// Full records, medium TTL
    Warm,
    /// Compact records, longest TTL
    Cold,
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheTier::Hot => write!(f, "hot"),
            CacheTier::Warm => write!(f, "warm"),
            CacheTier::Cold => write!(f, "cold"),
        }
    }
}

/// Result of a successful lookup
#[derive(Debug, Clone)]
pub struct Lookup {
    /// The record (partial if it came from the cold tier)
    pub record: PlayerRecord,
    /// Tier the record was found in, before any promotion
    pub tier: CacheTier,
    /// Access count after this read
    pub access_count: u64,
}

/// Entry counts per tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub hot: usize,
    pub warm: usize,
    pub cold: usize,
}

impl TierCounts {
    pub fn total(&self) -> usize {
        self.hot + self.warm + self.cold
    }
}

/// Three-tier player cache
pub struct TieredStore {
    hot: HashMap<String, CacheEntry<PlayerRecord>>,
    warm: HashMap<String, CacheEntry<PlayerRecord>>,
    cold: HashMap<String, CacheEntry<CompactRecord>>,
    settings: TierSettings,
    metrics: Arc<CacheMetrics>,
}

impl TieredStore {
    /// Create a store with default settings
    pub fn new() -> Self {
        Self::with_settings(TierSettings::default(), Arc::new(CacheMetrics::new()))
    }

    /// Create a store with custom settings and a shared metrics collector
    pub fn with_settings(settings: TierSettings, metrics: Arc<CacheMetrics>) -> Self {
        Self {
            hot: HashMap::with_capacity(settings.hot.capacity),
            warm: HashMap::with_capacity(settings.warm.capacity),
            cold: HashMap::new(),
            settings,
            metrics,
        }
    }

    /// Look up `key` in hot, then warm, then cold.
    ///
    /// A warm hit moves the entry to hot. A cold hit decompresses the entry
    /// into warm and returns the partial record.
    pub fn get(&mut self, key: &str) -> Option<Lookup> {
        if let Some(lookup) = self.get_hot(key) {
            return Some(lookup);
        }

        if let Some(mut entry) = self.warm.remove(key) {
            let access_count = entry.metadata.record_access();
            self.metrics.record_warm_hit();

            let record = entry.value().clone();
            self.insert_hot(key.to_string(), entry.transfer(|r| r));
            self.metrics.record_promotion_warm_to_hot();
            trace!(key, "promoted warm -> hot");

            return Some(Lookup {
                record,
                tier: CacheTier::Warm,
                access_count,
            });
        }

        if let Some(mut entry) = self.cold.remove(key) {
            let access_count = entry.metadata.record_access();
            self.metrics.record_cold_hit();

            let promoted = entry.transfer(|compact| decompress(&compact));
            self.metrics.record_decompression();
            let record = promoted.value().clone();
            self.insert_warm(key.to_string(), promoted);
            self.metrics.record_promotion_cold_to_warm();
            trace!(key, "promoted cold -> warm");

            return Some(Lookup {
                record,
                tier: CacheTier::Cold,
                access_count,
            });
        }

        self.metrics.record_miss();
        None
    }

    /// Look up `key` in the hot tier only.
    pub fn get_hot(&mut self, key: &str) -> Option<Lookup> {
        let entry = self.hot.get_mut(key)?;
        let access_count = entry.metadata.record_access();
        self.metrics.record_hot_hit();

        Some(Lookup {
            record: entry.value().clone(),
            tier: CacheTier::Hot,
            access_count,
        })
    }

    /// Insert or replace `key` in the hot tier, removing it from warm and cold.
    ///
    /// An existing entry keeps its access history; its insertion clock restarts.
    pub fn put(&mut self, key: impl Into<String>, record: PlayerRecord) {
        let key = key.into();

        let previous = self
            .hot
            .remove(&key)
            .map(|e| e.metadata)
            .or_else(|| self.warm.remove(&key).map(|e| e.metadata))
            .or_else(|| self.cold.remove(&key).map(|e| e.metadata));

        let entry = match previous {
            Some(mut metadata) => {
                metadata.reset_insertion();
                CacheEntry::with_metadata(record, metadata)
            }
            None => CacheEntry::new(record),
        };

        self.insert_hot(key, entry);
    }

    /// Cache a record just loaded from the backing store.
    ///
    /// A full copy already cached is newer than the load (it was written
    /// while the load was in flight) and is kept. A partial copy is replaced.
    /// Returns the record the cache now serves.
    pub fn put_loaded(&mut self, key: &str, record: PlayerRecord) -> PlayerRecord {
        let cached = self
            .hot
            .get(key)
            .or_else(|| self.warm.get(key))
            .map(|entry| entry.value())
            .filter(|cached| cached.is_authoritative());
        if let Some(cached) = cached {
            return cached.clone();
        }

        self.put(key, record.clone());
        record
    }

    /// Remove `key` from every tier. Returns the tier it was found in.
    pub fn remove(&mut self, key: &str) -> Option<CacheTier> {
        if self.hot.remove(key).is_some() {
            return Some(CacheTier::Hot);
        }
        if self.warm.remove(key).is_some() {
            return Some(CacheTier::Warm);
        }
        if self.cold.remove(key).is_some() {
            return Some(CacheTier::Cold);
        }
        None
    }

    /// Evict the oldest entry of `tier`, cascading it to the next colder tier.
    ///
    /// Hot entries move to warm unchanged, warm entries are compressed into
    /// cold, cold entries are dropped. Returns the evicted key.
    pub fn evict_oldest(&mut self, tier: CacheTier) -> Option<String> {
        let order = self.settings.eviction_order;

        match tier {
            CacheTier::Hot => {
                let key = oldest_key(&self.hot, |e| order.rank(&e.metadata))?;
                let entry = self.hot.remove(&key)?;
                self.metrics.record_demotion_hot_to_warm();
                trace!(key = %key, "demoted hot -> warm");
                self.insert_warm(key.clone(), entry.transfer(|r| r));
                Some(key)
            }
            CacheTier::Warm => {
                let key = oldest_key(&self.warm, |e| order.rank(&e.metadata))?;
                let entry = self.warm.remove(&key)?;
                let compacted = entry.transfer(|record| compress(&record));
                self.metrics.record_compression();
                self.metrics.record_demotion_warm_to_cold();
                trace!(key = %key, "demoted warm -> cold");
                self.insert_cold(key.clone(), compacted);
                Some(key)
            }
            CacheTier::Cold => {
                let key = oldest_key(&self.cold, |e| order.rank(&e.metadata))?;
                self.cold.remove(&key)?;
                self.metrics.record_cold_drop();
                trace!(key = %key, "dropped from cold");
                Some(key)
            }
        }
    }

    /// Delete every entry older than its tier's TTL. No demotion happens.
    pub fn sweep_expired(&mut self) -> TierCounts {
        let now = Instant::now();
        let (hot_limits, warm_limits, cold_limits) =
            (self.settings.hot, self.settings.warm, self.settings.cold);

        let swept = TierCounts {
            hot: retain_fresh(&mut self.hot, |e| {
                !hot_limits.is_expired(e.metadata.inserted_at(), now)
            }),
            warm: retain_fresh(&mut self.warm, |e| {
                !warm_limits.is_expired(e.metadata.inserted_at(), now)
            }),
            cold: retain_fresh(&mut self.cold, |e| {
                !cold_limits.is_expired(e.metadata.inserted_at(), now)
            }),
        };

        self.metrics.record_expirations(swept.total() as u64);
        swept
    }

    /// Tier currently holding `key`, without touching access metadata.
    pub fn tier_of(&self, key: &str) -> Option<CacheTier> {
        if self.hot.contains_key(key) {
            Some(CacheTier::Hot)
        } else if self.warm.contains_key(key) {
            Some(CacheTier::Warm)
        } else if self.cold.contains_key(key) {
            Some(CacheTier::Cold)
        } else {
            None
        }
    }

    /// Whether any tier holds `key`
    pub fn contains(&self, key: &str) -> bool {
        self.tier_of(key).is_some()
    }

    /// Entry counts per tier
    pub fn counts(&self) -> TierCounts {
        TierCounts {
            hot: self.hot.len(),
            warm: self.warm.len(),
            cold: self.cold.len(),
        }
    }

    /// Configured capacities per tier
    pub fn capacities(&self) -> TierCounts {
        TierCounts {
            hot: self.settings.hot.capacity,
            warm: self.settings.warm.capacity,
            cold: self.settings.cold.capacity,
        }
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.counts().total()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tier settings
    pub fn settings(&self) -> &TierSettings {
        &self.settings
    }

    /// Shared metrics collector
    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    /// Clear every tier
    pub fn clear(&mut self) {
        self.hot.clear();
        self.warm.clear();
        self.cold.clear();
    }

    fn insert_hot(&mut self, key: String, entry: CacheEntry<PlayerRecord>) {
        if !self.hot.contains_key(&key) && self.hot.len() >= self.settings.hot.capacity {
            self.evict_oldest(CacheTier::Hot);
        }
        self.hot.insert(key, entry);
    }

    fn insert_warm(&mut self, key: String, entry: CacheEntry<PlayerRecord>) {
        if !self.warm.contains_key(&key) && self.warm.len() >= self.settings.warm.capacity {
            self.evict_oldest(CacheTier::Warm);
        }
        self.warm.insert(key, entry);
    }

    fn insert_cold(&mut self, key: String, entry: CacheEntry<CompactRecord>) {
        if !self.cold.contains_key(&key) && self.cold.len() >= self.settings.cold.capacity {
            self.evict_oldest(CacheTier::Cold);
        }
        self.cold.insert(key, entry);
    }
}

impl Default for TieredStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TieredStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredStore")
            .field("counts", &self.counts())
            .field("capacities", &self.capacities())
            .field("eviction_order", &self.settings.eviction_order)
            .finish()
    }
}

/// Linear scan for the entry with the smallest rank.
fn oldest_key<T, R: Ord>(
    map: &HashMap<String, CacheEntry<T>>,
    rank: impl Fn(&CacheEntry<T>) -> R,
) -> Option<String> {
    map.iter()
        .min_by_key(|(_, entry)| rank(entry))
        .map(|(key, _)| key.clone())
}

/// Retain fresh entries and return how many were removed.
fn retain_fresh<T>(
    map: &mut HashMap<String, CacheEntry<T>>,
    keep: impl Fn(&CacheEntry<T>) -> bool,
) -> usize {
    let before = map.len();
    map.retain(|_, entry| keep(entry));
    before - map.len()
}

// =============================================================================
// Tests
// =============================================================================
