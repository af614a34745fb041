//! Tier Limits and Eviction Order
//!
//! Capacity/TTL bounds for each tier and the rule used to choose the
//! capacity-eviction victim.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::entry::EntryMetadata;

/// Which timestamp picks the capacity-eviction victim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionOrder {
    /// Oldest `inserted_at` goes first, even if it was just read.
    #[default]
    InsertionTime,
    /// Oldest `last_accessed_at` goes first (true LRU).
    LastAccess,
}

impl EvictionOrder {
    /// Key that ranks an entry for eviction; smaller is evicted first.
    #[inline]
    pub fn rank(&self, metadata: &EntryMetadata) -> (Instant, u64) {
        match self {
            EvictionOrder::InsertionTime => metadata.insertion_rank(),
            EvictionOrder::LastAccess => metadata.access_rank(),
        }
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            EvictionOrder::InsertionTime => "insertion-time",
            EvictionOrder::LastAccess => "last-access",
        }
    }
}

impl std::fmt::Display for EvictionOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Capacity and TTL for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    /// Maximum number of entries
    pub capacity: usize,
    /// Maximum age since insertion into the tier
    pub ttl: Duration,
}

impl TierLimits {
    pub const fn new(capacity: usize, ttl: Duration) -> Self {
        Self { capacity, ttl }
    }

    /// Hot tier defaults: 500 entries, 1 hour.
    pub const fn hot() -> Self {
        Self::new(500, Duration::from_secs(60 * 60))
    }

    /// Warm tier defaults: 2000 entries, 24 hours.
    pub const fn warm() -> Self {
        Self::new(2_000, Duration::from_secs(24 * 60 * 60))
    }

    /// Cold tier defaults: 10000 entries, 7 days.
    pub const fn cold() -> Self {
        Self::new(10_000, Duration::from_secs(7 * 24 * 60 * 60))
    }

    /// Whether an entry inserted at `inserted_at` has outlived the TTL at `now`.
    #[inline]
    pub fn is_expired(&self, inserted_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(inserted_at) > self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits_are_ordered() {
        let (hot, warm, cold) = (TierLimits::hot(), TierLimits::warm(), TierLimits::cold());
        assert!(hot.capacity < warm.capacity && warm.capacity < cold.capacity);
        assert!(hot.ttl < warm.ttl && warm.ttl < cold.ttl);
        assert_eq!(hot.ttl, Duration::from_secs(3600));
        assert_eq!(cold.ttl, Duration::from_secs(604_800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_is_strictly_after_ttl() {
        let limits = TierLimits::new(10, Duration::from_secs(5));
        let inserted = Instant::now();

        assert!(!limits.is_expired(inserted, inserted + Duration::from_secs(5)));
        assert!(limits.is_expired(inserted, inserted + Duration::from_secs(6)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rank_by_order() {
        let mut meta = EntryMetadata::new();
        tokio::time::advance(Duration::from_secs(10)).await;
        meta.record_access();

        assert_eq!(EvictionOrder::InsertionTime.rank(&meta).0, meta.inserted_at());
        assert_eq!(EvictionOrder::LastAccess.rank(&meta).0, meta.last_accessed_at());
        assert!(
            EvictionOrder::LastAccess.rank(&meta) > EvictionOrder::InsertionTime.rank(&meta)
        );
    }

    #[test]
    fn test_eviction_order_serde_names() {
        let order: EvictionOrder = serde_json::from_str("\"last_access\"").unwrap();
        assert_eq!(order, EvictionOrder::LastAccess);
        assert_eq!(EvictionOrder::default(), EvictionOrder::InsertionTime);
        assert_eq!(EvictionOrder::InsertionTime.to_string(), "insertion-time");
    }
}
