//! Cache Facade
//!
//! Public entry point of the cache subsystem. Reads go hot → warm → cold →
//! backing store; writes go to the hot tier, the origin-map mirror, and the
//! write-behind queue.
//!
//! Tier and query-cache state sit behind short synchronous locks that are
//! never held across an `.await`, so every in-memory operation runs to
//! completion without interleaving. Suspension happens only at the backing
//! store and in the background ticker.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use super::single_flight::{Flight, LoadOutcome, SingleFlight};
use crate::adapters::{InMemoryOriginMap, LoggingEventPublisher};
use crate::cache::{
    is_read_only, CacheCounters, CacheMetrics, CacheTier, EvictionOrder, QueryCache,
    QueryCacheStats, QueryKey, TierCounts, TieredStore,
};
use crate::config::StrataConfig;
use crate::domain::ports::{BackingStore, DeadLetterSink, EventPublisher, OriginMap};
use crate::domain::{CacheEvent, PlayerRecord, RowSet, SqlParam};
use crate::error::{Error, Result};
use crate::write_behind::{
    FlushReport, LoggingDeadLetters, PendingUpdate, UpdateKind, WriteBehindCounters,
    WriteBehindQueue,
};

// =============================================================================
// Health Snapshot
// =============================================================================

/// Read-only diagnostic snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub tier_sizes: TierCounts,
    pub capacities: TierCounts,
    pub eviction_order: EvictionOrder,
    pub counters: CacheCounters,
    pub query_cache: QueryCacheStats,
    pub pending_updates: BTreeMap<UpdateKind, usize>,
    pub write_behind: WriteBehindCounters,
    pub backing_loads: u64,
    pub load_failures: u64,
    pub coalesced_loads: u64,
}

/// Entries removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub tiers: TierCounts,
    pub queries: usize,
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`CacheFacade`].
pub struct CacheFacadeBuilder {
    config: StrataConfig,
    backing: Arc<dyn BackingStore>,
    origin: Option<Arc<dyn OriginMap>>,
    publisher: Option<Arc<dyn EventPublisher>>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
}

impl CacheFacadeBuilder {
    /// Legacy origin map used for fallback reads and mirrored on writes.
    pub fn origin(mut self, origin: Arc<dyn OriginMap>) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn dead_letters(mut self, dead_letters: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(dead_letters);
        self
    }

    /// Validate the configuration and assemble the facade.
    pub fn build(self) -> Result<CacheFacade> {
        self.config.validate()?;

        let metrics = Arc::new(CacheMetrics::new());
        let publisher = self
            .publisher
            .unwrap_or_else(|| Arc::new(LoggingEventPublisher::new()));
        let dead_letters = self
            .dead_letters
            .unwrap_or_else(|| Arc::new(LoggingDeadLetters));

        let write_behind = WriteBehindQueue::new(self.config.write_behind.clone(), self.backing.clone())
            .with_publisher(publisher.clone())
            .with_dead_letters(dead_letters);

        Ok(CacheFacade {
            tiers: Mutex::new(TieredStore::with_settings(
                self.config.tiers.clone(),
                metrics.clone(),
            )),
            queries: Mutex::new(QueryCache::new(self.config.query_cache.clone())),
            backing: self.backing,
            origin: self
                .origin
                .unwrap_or_else(|| Arc::new(InMemoryOriginMap::new())),
            publisher,
            write_behind: Arc::new(write_behind),
            flights: SingleFlight::new(),
            metrics,
            backing_loads: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
            config: self.config,
        })
    }
}

// =============================================================================
// Facade
// =============================================================================

/// Read-through, write-behind cache in front of a backing store.
pub struct CacheFacade {
    tiers: Mutex<TieredStore>,
    queries: Mutex<QueryCache>,
    backing: Arc<dyn BackingStore>,
    origin: Arc<dyn OriginMap>,
    publisher: Arc<dyn EventPublisher>,
    write_behind: Arc<WriteBehindQueue>,
    flights: SingleFlight,
    metrics: Arc<CacheMetrics>,
    backing_loads: AtomicU64,
    load_failures: AtomicU64,
    config: StrataConfig,
}

impl CacheFacade {
    pub fn builder(config: StrataConfig, backing: Arc<dyn BackingStore>) -> CacheFacadeBuilder {
        CacheFacadeBuilder {
            config,
            backing,
            origin: None,
            publisher: None,
            dead_letters: None,
        }
    }

    /// Facade with a fresh in-memory origin map and logging sinks.
    pub fn new(config: StrataConfig, backing: Arc<dyn BackingStore>) -> Result<Self> {
        Self::builder(config, backing).build()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Look up a player, loading it from the backing store on a full miss.
    ///
    /// Backing-store failures and timeouts are logged and reported as
    /// absence. A record served from the cold tier is `partial`.
    #[instrument(skip(self))]
    pub async fn get_user(&self, key: &str) -> Option<PlayerRecord> {
        let hit = self.tiers.lock().get(key);
        if let Some(lookup) = hit {
            return Some(lookup.record);
        }

        self.read_through(key).await
    }

    /// Like [`get_user`](Self::get_user), but a partial record is replaced by
    /// a fresh load. If that load fails the partial record is returned.
    #[instrument(skip(self))]
    pub async fn get_user_full(&self, key: &str) -> Option<PlayerRecord> {
        let hit = self.tiers.lock().get(key);
        match hit {
            Some(lookup) if lookup.record.is_authoritative() => Some(lookup.record),
            Some(lookup) => {
                debug!(key, tier = %lookup.tier, "Reloading partial record");
                self.read_through(key).await.or(Some(lookup.record))
            }
            None => self.read_through(key).await,
        }
    }

    /// Hot-tier lookup with a synchronous fallback to the origin map.
    ///
    /// Never suspends and never touches the backing store. A record found in
    /// the origin map is placed in the hot tier.
    pub fn get_user_or_fallback(&self, key: &str) -> Option<PlayerRecord> {
        let hit = self.tiers.lock().get_hot(key);
        if let Some(lookup) = hit {
            return Some(lookup.record);
        }

        let record = self.origin.get(key)?;
        self.tiers.lock().put(key, record.clone());
        Some(record)
    }

    async fn read_through(&self, key: &str) -> Option<PlayerRecord> {
        if !self.config.facade.single_flight {
            return self.load_and_populate(key).await.into_record();
        }

        match self.flights.join(key) {
            Flight::Leader(guard) => {
                let outcome = self.load_and_populate(key).await;
                guard.complete(outcome.clone());
                outcome.into_record()
            }
            Flight::Follower(waiter) => match waiter.wait().await {
                Some(outcome) => outcome.into_record(),
                None => self.load_and_populate(key).await.into_record(),
            },
        }
    }

    async fn load_and_populate(&self, key: &str) -> LoadOutcome {
        self.backing_loads.fetch_add(1, Ordering::Relaxed);
        let timeout = self.config.facade.load_timeout;

        let result = match tokio::time::timeout(timeout, self.backing.load(key)).await {
            Ok(result) => result,
            Err(_) => Err(Error::BackingStoreTimeout {
                operation: "load",
                timeout,
            }),
        };

        match result {
            Ok(Some(record)) => {
                let served = self.tiers.lock().put_loaded(key, record);
                LoadOutcome::Loaded(Some(served))
            }
            Ok(None) => LoadOutcome::Loaded(None),
            Err(err) => {
                self.load_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %err, "Backing store load failed; treating as miss");
                self.publish(CacheEvent::load_failed(key, err.to_string()))
                    .await;
                LoadOutcome::Failed(err.to_string())
            }
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write a player through the cache.
    ///
    /// The record is stored under `key`: it replaces any cached copy in the
    /// hot tier, is mirrored into the origin map, and is queued for
    /// persistence as a full row. Never waits on the backing store.
    ///
    /// A partial record only carries the summary fields. They are written
    /// onto the full copy held by the origin map; when there is none the
    /// write fails with [`Error::PartialRecord`] and nothing changes.
    pub fn update_user(&self, key: &str, record: PlayerRecord) -> Result<()> {
        let mut record = if record.partial {
            self.complete_partial(key, &record)?
        } else {
            record
        };
        record.id = key.to_string();
        let row = PendingUpdate::from_record(&record)?;

        self.origin.set(key, &record);
        self.tiers.lock().put(key, record);
        self.write_behind.enqueue(row);
        Ok(())
    }

    fn complete_partial(&self, key: &str, summary: &PlayerRecord) -> Result<PlayerRecord> {
        let full = self
            .origin
            .get(key)
            .filter(PlayerRecord::is_authoritative)
            .ok_or_else(|| Error::PartialRecord {
                id: key.to_string(),
                field: "attributes".into(),
            })?;

        debug!(key, "Merging partial record onto origin copy");
        Ok(full.with_summary_of(summary))
    }

    /// Queue a persistence-only update from raw fields; the cache is untouched.
    pub fn enqueue_stat_update(
        &self,
        kind: UpdateKind,
        id: &Value,
        fields: &Map<String, Value>,
    ) -> Result<()> {
        let update = PendingUpdate::normalize(kind, id, fields)?;
        self.write_behind.enqueue(update);
        Ok(())
    }

    /// Queue an already typed update.
    pub fn enqueue_update(&self, update: PendingUpdate) {
        self.write_behind.enqueue(update);
    }

    /// Drop `key` from every tier. Returns the tier it was in.
    pub fn invalidate(&self, key: &str) -> Option<CacheTier> {
        self.tiers.lock().remove(key)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Run a query, serving read-only statements from the query cache.
    ///
    /// Failed queries are not cached and their error is returned as is.
    #[instrument(skip(self, params))]
    pub async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<RowSet> {
        if !self.config.query_cache.enabled || !is_read_only(sql) {
            return self.backing.query(sql, params).await;
        }

        let key = QueryKey::new(sql, params)?;
        let cached = self.queries.lock().lookup(&key);
        if let Some(rows) = cached {
            return Ok(rows);
        }

        let rows = self.backing.query(sql, params).await?;
        self.queries.lock().store(key, rows.clone());
        Ok(rows)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Delete expired tier entries and query results.
    pub async fn sweep(&self) -> SweepReport {
        let tiers = self.tiers.lock().sweep_expired();
        let queries = self.queries.lock().purge_expired();

        debug!(
            hot = tiers.hot,
            warm = tiers.warm,
            cold = tiers.cold,
            queries,
            "Swept expired entries"
        );
        self.publish(CacheEvent::sweep_completed(
            tiers.hot, tiers.warm, tiers.cold, queries,
        ))
        .await;

        SweepReport { tiers, queries }
    }

    /// Flush one batch of every update kind.
    pub async fn flush_all(&self) -> Vec<(UpdateKind, Result<FlushReport>)> {
        self.write_behind.flush_all().await
    }

    /// Diagnostic snapshot.
    pub fn health_status(&self) -> HealthSnapshot {
        let (tier_sizes, capacities, eviction_order) = {
            let tiers = self.tiers.lock();
            (tiers.counts(), tiers.capacities(), tiers.settings().eviction_order)
        };
        let query_cache = self.queries.lock().stats();

        HealthSnapshot {
            tier_sizes,
            capacities,
            eviction_order,
            counters: self.metrics.snapshot(),
            query_cache,
            pending_updates: self.write_behind.pending_counts(),
            write_behind: self.write_behind.stats().snapshot(),
            backing_loads: self.backing_loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            coalesced_loads: self.flights.coalesced(),
        }
    }

    /// Tier currently holding `key`.
    pub fn tier_of(&self, key: &str) -> Option<CacheTier> {
        self.tiers.lock().tier_of(key)
    }

    pub fn write_behind(&self) -> &Arc<WriteBehindQueue> {
        &self.write_behind
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    async fn publish(&self, event: CacheEvent) {
        if let Err(e) = self.publisher.publish(event).await {
            warn!(error = %e, "Failed to publish cache event");
        }
    }
}

impl std::fmt::Debug for CacheFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheFacade")
            .field("tiers", &*self.tiers.lock())
            .field("write_behind", &self.write_behind)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryBackingStore, InMemoryEventCollector};
    use crate::cache::TierLimits;
    use crate::domain::ports::Mirror;
    use serde_json::json;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn small_config() -> StrataConfig {
        let mut config = StrataConfig::default();
        config.tiers.hot = TierLimits::new(2, Duration::from_secs(3600));
        config.tiers.warm = TierLimits::new(2, Duration::from_secs(86_400));
        config.tiers.cold = TierLimits::new(4, Duration::from_secs(604_800));
        config
    }

    struct Harness {
        backing: Arc<InMemoryBackingStore>,
        origin: Arc<InMemoryOriginMap>,
        events: Arc<InMemoryEventCollector>,
        facade: CacheFacade,
    }

    fn harness(config: StrataConfig) -> Harness {
        let backing = Arc::new(InMemoryBackingStore::new());
        let origin = Arc::new(InMemoryOriginMap::new());
        let events = Arc::new(InMemoryEventCollector::new());
        let facade = CacheFacade::builder(config, backing.clone())
            .origin(origin.clone())
            .publisher(events.clone())
            .build()
            .unwrap();
        Harness {
            backing,
            origin,
            events,
            facade,
        }
    }

    fn player(id: &str, level: u32) -> PlayerRecord {
        let mut record =
            PlayerRecord::new(id, "ranger").with_attribute("inventory", json!(["bow"]));
        record.level = level;
        record
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_loads_and_populates_hot() {
        let h = harness(small_config());
        h.backing.insert(player("u1", 4));

        let record = h.facade.get_user("u1").await.unwrap();
        assert_eq!(record.level, 4);
        assert_eq!(h.facade.tier_of("u1"), Some(CacheTier::Hot));

        h.facade.get_user("u1").await.unwrap();
        assert_eq!(h.backing.load_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_player_is_absent() {
        let h = harness(small_config());
        assert!(h.facade.get_user("ghost").await.is_none());
        assert!(h.facade.tier_of("ghost").is_none());
        assert_eq!(h.facade.health_status().load_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_is_swallowed_and_published() {
        let h = harness(small_config());
        h.backing.insert(player("u1", 4));
        h.backing.fail_loads(true);

        assert!(h.facade.get_user("u1").await.is_none());
        assert_eq!(h.facade.health_status().load_failures, 1);
        assert_eq!(h.events.events_of_type("LoadFailed").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_load_times_out_as_miss() {
        let mut config = small_config();
        config.facade.load_timeout = Duration::from_millis(100);
        let h = harness(config);
        h.backing.insert(player("u1", 4));
        h.backing.set_latency(Duration::from_secs(5));

        assert!(h.facade.get_user("u1").await.is_none());
        assert_eq!(h.facade.health_status().load_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_user_writes_cache_mirror_and_queue() {
        let h = harness(small_config());
        h.facade.update_user("u9", player("u9", 7)).unwrap();

        assert_eq!(h.facade.tier_of("u9"), Some(CacheTier::Hot));
        assert_eq!(h.origin.get("u9").unwrap().level, 7);
        assert_eq!(h.facade.write_behind().pending_len(UpdateKind::Player), 1);
        assert_eq!(h.backing.upsert_calls(), 0);

        assert_eq!(h.facade.get_user("u9").await.unwrap().level, 7);
        assert_eq!(h.backing.load_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_write_back_merges_onto_origin_copy() {
        let h = harness(small_config());
        for id in ["a", "b", "c", "d", "e"] {
            h.facade.update_user(id, player(id, 2)).unwrap();
        }
        assert_eq!(h.facade.tier_of("a"), Some(CacheTier::Cold));

        let mut record = h.facade.get_user("a").await.unwrap();
        assert!(record.partial);
        record.level += 1;
        h.facade.update_user("a", record).unwrap();

        let mirrored = h.origin.get("a").unwrap();
        assert!(mirrored.is_authoritative());
        assert_eq!(mirrored.level, 3);
        assert_eq!(assert_ok!(mirrored.attribute("inventory")), Some(&json!(["bow"])));

        let cached = h.facade.get_user("a").await.unwrap();
        assert!(cached.is_authoritative());
        assert_eq!(cached.level, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_write_without_full_copy_is_refused() {
        let h = harness(small_config());
        let mut record = player("u1", 4);
        record.partial = true;

        let err = h.facade.update_user("u1", record).unwrap_err();
        assert!(matches!(err, Error::PartialRecord { .. }));
        assert!(h.origin.get("u1").is_none());
        assert!(h.facade.tier_of("u1").is_none());
        assert_eq!(h.facade.write_behind().total_pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_load_does_not_overwrite_newer_write() {
        let h = harness(small_config());
        h.backing.insert(player("u1", 1));
        h.backing.set_latency(Duration::from_millis(200));

        let (loaded, ()) = tokio::join!(h.facade.get_user("u1"), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            h.facade.update_user("u1", player("u1", 9)).unwrap();
        });

        assert_eq!(loaded.unwrap().level, 9);
        assert_eq!(h.facade.get_user("u1").await.unwrap().level, 9);
        assert_eq!(h.backing.load_calls(), 1);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = small_config();
        config.tiers.hot.capacity = 0;

        let result = CacheFacade::builder(config, Arc::new(InMemoryBackingStore::new())).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_uses_origin_without_backing_store() {
        let h = harness(small_config());
        h.origin.set("u5", &player("u5", 3));
        h.backing.insert(player("u5", 99));

        let record = h.facade.get_user_or_fallback("u5").unwrap();
        assert_eq!(record.level, 3);
        assert_eq!(h.backing.load_calls(), 0);
        assert_eq!(h.facade.tier_of("u5"), Some(CacheTier::Hot));

        assert!(h.facade.get_user_or_fallback("nobody").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_ignores_colder_tiers() {
        let h = harness(small_config());
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            h.facade.update_user(id, player(id, i as u32 + 1)).unwrap();
        }
        assert_eq!(h.facade.tier_of("a"), Some(CacheTier::Warm));

        h.origin.set("a", &player("a", 50));
        assert_eq!(h.facade.get_user_or_fallback("a").unwrap().level, 50);
        assert_eq!(h.facade.tier_of("a"), Some(CacheTier::Hot));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_user_full_reloads_partial_record() {
        let h = harness(small_config());
        for id in ["a", "b", "c", "d", "e"] {
            h.facade.update_user(id, player(id, 2)).unwrap();
        }
        assert_eq!(h.facade.tier_of("a"), Some(CacheTier::Cold));
        h.backing.insert(player("a", 2));

        let full = h.facade.get_user_full("a").await.unwrap();
        assert!(!full.partial);
        assert_eq!(assert_ok!(full.attribute("inventory")), Some(&json!(["bow"])));
        assert_eq!(h.backing.load_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_user_full_keeps_partial_when_reload_fails() {
        let h = harness(small_config());
        for id in ["a", "b", "c", "d", "e"] {
            h.facade.update_user(id, player(id, 2)).unwrap();
        }
        h.backing.fail_loads(true);

        let record = h.facade.get_user_full("a").await.unwrap();
        assert!(record.partial);
        assert_err!(record.attribute("inventory"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_stat_update_validates() {
        let h = harness(small_config());
        let fields = json!({ "sessions": 3 }).as_object().cloned().unwrap();

        assert_ok!(h.facade.enqueue_stat_update(UpdateKind::Telemetry, &json!("u1"), &fields));
        assert_eq!(h.facade.write_behind().pending_len(UpdateKind::Telemetry), 1);
        assert!(h.facade.tier_of("u1").is_none());

        let bad = json!({ "sessions": "lots" }).as_object().cloned().unwrap();
        let err = h
            .facade
            .enqueue_stat_update(UpdateKind::Telemetry, &json!("u1"), &bad)
            .unwrap_err();
        assert!(matches!(err, Error::ValidationFailure { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_caches_read_only_statements() {
        let h = harness(small_config());
        h.backing.insert(player("u1", 4));

        let sql = "SELECT id, level FROM players WHERE id = $1";
        let first = h.facade.query(sql, &["u1".into()]).await.unwrap();
        let second = h.facade.query(sql, &["u1".into()]).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(h.backing.query_calls(), 1);
        assert_eq!(h.facade.health_status().query_cache.hits, 1);

        h.facade
            .query("UPDATE players SET level = 5", &[])
            .await
            .unwrap();
        h.facade
            .query("UPDATE players SET level = 5", &[])
            .await
            .unwrap();
        assert_eq!(h.backing.query_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_query_is_not_cached() {
        let h = harness(small_config());
        h.backing.fail_queries(true);
        assert!(h.facade.query("SELECT 1", &[]).await.is_err());

        h.backing.fail_queries(false);
        assert!(h.facade.query("SELECT 1", &[]).await.is_ok());
        assert_eq!(h.backing.query_calls(), 2);
        assert_eq!(h.facade.health_status().query_cache.size, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate() {
        let h = harness(small_config());
        h.facade.update_user("u1", player("u1", 1)).unwrap();
        assert_eq!(h.facade.invalidate("u1"), Some(CacheTier::Hot));
        assert_eq!(h.facade.invalidate("u1"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_publishes_event() {
        let h = harness(small_config());
        h.facade.update_user("u1", player("u1", 1)).unwrap();

        tokio::time::advance(Duration::from_secs(3601)).await;
        let report = h.facade.sweep().await;

        assert_eq!(report.tiers.hot, 1);
        assert!(h.facade.tier_of("u1").is_none());
        assert_eq!(h.events.events_of_type("SweepCompleted").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_snapshot_serializes() {
        let h = harness(small_config());
        h.facade.update_user("u1", player("u1", 1)).unwrap();
        h.facade.get_user("u1").await;

        let health = h.facade.health_status();
        assert_eq!(health.tier_sizes.hot, 1);
        assert_eq!(health.capacities.hot, 2);
        assert_eq!(health.counters.hot_hits, 1);
        assert_eq!(health.pending_updates[&UpdateKind::Player], 1);

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["pending_updates"]["player"], 1);
        assert_eq!(json["eviction_order"], "insertion_time");
    }
}
