//! Query Result Cache
//!
//! Capacity-bounded, TTL-expiring cache of read-only query results. It is
//! independent of the tiered player cache and has no write invalidation:
//! staleness is bounded only by the TTL.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::time::Instant;

use crate::config::QueryCacheConfig;
use crate::domain::{RowSet, SqlParam};
use crate::error::Result;

/// Leading keywords of statements whose results may be cached.
const READ_ONLY_KEYWORDS: [&str; 2] = ["select", "show"];

/// Whether `sql` is a read-only statement, judged by its leading keyword.
///
/// Leading whitespace and an opening parenthesis are skipped.
pub fn is_read_only(sql: &str) -> bool {
    let trimmed = sql.trim_start().trim_start_matches('(').trim_start();
    let keyword: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase();

    READ_ONLY_KEYWORDS.contains(&keyword.as_str())
}

/// Deterministic cache key built from query text and parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn new(sql: &str, params: &[SqlParam]) -> Result<Self> {
        Ok(Self(serde_json::to_string(&(sql.trim(), params))?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
struct CachedResult {
    rows: RowSet,
    created_at: Instant,
    expires_at: Instant,
}

/// Query cache counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryCacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

/// TTL cache of read-only query results
#[derive(Debug)]
pub struct QueryCache {
    entries: HashMap<QueryKey, CachedResult>,
    config: QueryCacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl QueryCache {
    pub fn new(config: QueryCacheConfig) -> Self {
        Self {
            entries: HashMap::with_capacity(config.capacity),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Return the cached rows for `key` if present and not yet expired.
    ///
    /// An expired entry is removed on the way out.
    pub fn lookup(&mut self, key: &QueryKey) -> Option<RowSet> {
        let now = Instant::now();

        match self.entries.get(key) {
            Some(cached) if now < cached.expires_at => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(cached.rows.clone())
            }
            Some(_) => {
                self.entries.remove(key);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Cache `rows` under `key` for the configured TTL.
    ///
    /// When full, the oldest fraction of entries by creation time is evicted
    /// in one batch first.
    pub fn store(&mut self, key: QueryKey, rows: RowSet) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.config.capacity {
            self.evict_oldest_batch();
        }

        let now = Instant::now();
        self.entries.insert(
            key,
            CachedResult {
                rows,
                created_at: now,
                expires_at: now + self.config.ttl,
            },
        );
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, cached| now < cached.expires_at);

        let purged = before - self.entries.len();
        self.expirations.fetch_add(purged as u64, Ordering::Relaxed);
        purged
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn config(&self) -> &QueryCacheConfig {
        &self.config
    }

    pub fn stats(&self) -> QueryCacheStats {
        QueryCacheStats {
            size: self.entries.len(),
            capacity: self.config.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    /// Number of entries one batch eviction removes; never zero.
    fn batch_size(&self) -> usize {
        ((self.config.capacity as f64 * self.config.eviction_fraction).ceil() as usize).max(1)
    }

    fn evict_oldest_batch(&mut self) {
        let mut by_age: Vec<(Instant, QueryKey)> = self
            .entries
            .iter()
            .map(|(key, cached)| (cached.created_at, key.clone()))
            .collect();
        by_age.sort_by(|a, b| a.0.cmp(&b.0));

        let count = self.batch_size().min(by_age.len());
        for (_, key) in by_age.into_iter().take(count) {
            self.entries.remove(&key);
        }
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }
}

// =============================================================================
// Tests
// =============================================================================
