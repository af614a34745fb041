//! Cache Metrics Collection
//!
//! Lock-free counters for monitoring tier health.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    // Lookups
    hot_hits: AtomicU64,
    warm_hits: AtomicU64,
    cold_hits: AtomicU64,
    misses: AtomicU64,

    // Tier movement
    promotions_warm_to_hot: AtomicU64,
    promotions_cold_to_warm: AtomicU64,
    demotions_hot_to_warm: AtomicU64,
    demotions_warm_to_cold: AtomicU64,

    // Removal
    evictions: AtomicU64,
    cold_drops: AtomicU64,
    expirations: AtomicU64,

    // Codec
    compressions: AtomicU64,
    decompressions: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hot_hit(&self) {
        self.hot_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_warm_hit(&self) {
        self.warm_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cold_hit(&self) {
        self.cold_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_promotion_warm_to_hot(&self) {
        self.promotions_warm_to_hot.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_promotion_cold_to_warm(&self) {
        self.promotions_cold_to_warm.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_demotion_hot_to_warm(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        self.demotions_hot_to_warm.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_demotion_warm_to_cold(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        self.demotions_warm_to_cold.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cold_drop(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        self.cold_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_compression(&self) {
        self.compressions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decompression(&self) {
        self.decompressions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hot_hits(&self) -> u64 {
        self.hot_hits.load(Ordering::Relaxed)
    }

    pub fn warm_hits(&self) -> u64 {
        self.warm_hits.load(Ordering::Relaxed)
    }

    pub fn cold_hits(&self) -> u64 {
        self.cold_hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn compressions(&self) -> u64 {
        self.compressions.load(Ordering::Relaxed)
    }

    /// Overall hit ratio across all tiers
    pub fn hit_ratio(&self) -> f64 {
        let hits = (self.hot_hits() + self.warm_hits() + self.cold_hits()) as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> CacheCounters {
        CacheCounters {
            hot_hits: self.hot_hits(),
            warm_hits: self.warm_hits(),
            cold_hits: self.cold_hits(),
            misses: self.misses(),
            hit_ratio: self.hit_ratio(),
            promotions_warm_to_hot: self.promotions_warm_to_hot.load(Ordering::Relaxed),
            promotions_cold_to_warm: self.promotions_cold_to_warm.load(Ordering::Relaxed),
            demotions_hot_to_warm: self.demotions_hot_to_warm.load(Ordering::Relaxed),
            demotions_warm_to_cold: self.demotions_warm_to_cold.load(Ordering::Relaxed),
            evictions: self.evictions(),
            cold_drops: self.cold_drops.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            compressions: self.compressions(),
            decompressions: self.decompressions.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        for counter in [
            &self.hot_hits,
            &self.warm_hits,
            &self.cold_hits,
            &self.misses,
            &self.promotions_warm_to_hot,
            &self.promotions_cold_to_warm,
            &self.demotions_hot_to_warm,
            &self.demotions_warm_to_cold,
            &self.evictions,
            &self.cold_drops,
            &self.expirations,
            &self.compressions,
            &self.decompressions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Point-in-time copy of the cache counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheCounters {
    pub hot_hits: u64,
    pub warm_hits: u64,
    pub cold_hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,

    pub promotions_warm_to_hot: u64,
    pub promotions_cold_to_warm: u64,
    pub demotions_hot_to_warm: u64,
    pub demotions_warm_to_cold: u64,

    /// Capacity evictions of any kind (demotions plus cold drops)
    pub evictions: u64,
    pub cold_drops: u64,
    pub expirations: u64,

    pub compressions: u64,
    pub decompressions: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = CacheMetrics::new();
        assert_eq!(metrics.hot_hits(), 0);
        assert_eq!(metrics.misses(), 0);
        assert_eq!(metrics.hit_ratio(), 0.0);
    }

    #[test]
    fn test_hit_ratio() {
        let metrics = CacheMetrics::new();

        metrics.record_hot_hit();
        metrics.record_warm_hit();
        metrics.record_cold_hit();
        metrics.record_miss();

        assert!((metrics.hit_ratio() - 0.75).abs() < 0.001);
    }

    #[test]
    fn test_every_demotion_counts_as_eviction() {
        let metrics = CacheMetrics::new();

        metrics.record_demotion_hot_to_warm();
        metrics.record_demotion_warm_to_cold();
        metrics.record_cold_drop();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.evictions, 3);
        assert_eq!(snapshot.demotions_hot_to_warm, 1);
        assert_eq!(snapshot.demotions_warm_to_cold, 1);
        assert_eq!(snapshot.cold_drops, 1);
    }

    #[test]
    fn test_expirations_are_not_evictions() {
        let metrics = CacheMetrics::new();
        metrics.record_expirations(4);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.expirations, 4);
        assert_eq!(snapshot.evictions, 0);
    }

    #[test]
    fn test_reset() {
        let metrics = CacheMetrics::new();

        metrics.record_hot_hit();
        metrics.record_compression();
        metrics.record_expirations(2);

        metrics.reset();
        assert_eq!(metrics.snapshot(), CacheCounters::default());
    }
}
