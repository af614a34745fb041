//! Cache Entry Types
//!
//! An entry wraps a payload (a full record in hot/warm, a compact record in
//! cold) with the access metadata used for eviction and expiry.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::Instant;

/// Process-wide event counter; orders events that share an `Instant`.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[inline]
fn next_sequence() -> u64 {
    SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// Access metadata for a cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    /// When the entry was placed into its current tier
    inserted_at: Instant,
    inserted_seq: u64,
    /// Last read
    last_accessed_at: Instant,
    accessed_seq: u64,
    /// Number of reads plus the initial population
    access_count: u64,
}

impl EntryMetadata {
    /// Create metadata for an entry populated now.
    pub fn new() -> Self {
        let now = Instant::now();
        let seq = next_sequence();
        Self {
            inserted_at: now,
            inserted_seq: seq,
            last_accessed_at: now,
            accessed_seq: seq,
            access_count: 1,
        }
    }

    /// Record a read and return the new access count.
    #[inline]
    pub fn record_access(&mut self) -> u64 {
        self.last_accessed_at = Instant::now();
        self.accessed_seq = next_sequence();
        self.access_count = self.access_count.saturating_add(1);
        self.access_count
    }

    /// Restart the insertion clock; called when the entry changes tier.
    #[inline]
    pub fn reset_insertion(&mut self) {
        self.inserted_at = Instant::now();
        self.inserted_seq = next_sequence();
    }

    /// Insertion time with a tie-breaker for equal instants.
    #[inline]
    pub fn insertion_rank(&self) -> (Instant, u64) {
        (self.inserted_at, self.inserted_seq)
    }

    /// Last access time with a tie-breaker for equal instants.
    #[inline]
    pub fn access_rank(&self) -> (Instant, u64) {
        (self.last_accessed_at, self.accessed_seq)
    }

    #[inline]
    pub fn inserted_at(&self) -> Instant {
        self.inserted_at
    }

    #[inline]
    pub fn last_accessed_at(&self) -> Instant {
        self.last_accessed_at
    }

    #[inline]
    pub fn access_count(&self) -> u64 {
        self.access_count
    }
}

impl Default for EntryMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache entry: payload plus metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub metadata: EntryMetadata,
    value: T,
}

impl<T> CacheEntry<T> {
    /// Create a new entry populated now.
    pub fn new(value: T) -> Self {
        Self {
            metadata: EntryMetadata::new(),
            value,
        }
    }

    /// Create with existing metadata (for tier transfers).
    pub fn with_metadata(value: T, metadata: EntryMetadata) -> Self {
        Self { metadata, value }
    }

    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Split into payload and metadata.
    pub fn into_parts(self) -> (T, EntryMetadata) {
        (self.value, self.metadata)
    }

    /// Move into another tier with a transformed payload, keeping access
    /// history but restarting the insertion clock.
    pub fn transfer<U>(self, f: impl FnOnce(T) -> U) -> CacheEntry<U> {
        let (value, mut metadata) = self.into_parts();
        metadata.reset_insertion();
        CacheEntry::with_metadata(f(value), metadata)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_metadata_creation() {
        let meta = EntryMetadata::new();
        assert_eq!(meta.access_count(), 1);
        assert_eq!(meta.inserted_at(), meta.last_accessed_at());
    }

    #[tokio::test(start_paused = true)]
    async fn test_access_does_not_touch_insertion_time() {
        let mut meta = EntryMetadata::new();
        let inserted = meta.inserted_at();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(meta.record_access(), 2);

        assert_eq!(meta.inserted_at(), inserted);
        assert_eq!(meta.last_accessed_at(), inserted + Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rank_breaks_ties_within_same_instant() {
        let first = EntryMetadata::new();
        let second = EntryMetadata::new();

        assert_eq!(first.inserted_at(), second.inserted_at());
        assert!(first.insertion_rank() < second.insertion_rank());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transfer_keeps_history_and_resets_clock() {
        let mut entry = CacheEntry::new(41u32);
        entry.metadata.record_access();
        let last_access = entry.metadata.last_accessed_at();

        tokio::time::advance(Duration::from_secs(60)).await;
        let moved = entry.transfer(|v| v + 1);

        assert_eq!(*moved.value(), 42);
        assert_eq!(moved.metadata.access_count(), 2);
        assert_eq!(moved.metadata.last_accessed_at(), last_access);
        assert_eq!(moved.metadata.inserted_at(), Instant::now());
    }
}
