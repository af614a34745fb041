//! In-Memory Backing Store
//!
//! Implements the `BackingStore` port over concurrent maps. Used by tests and
//! the soak driver; supports latency and failure injection.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::cache::is_read_only;
use crate::domain::ports::{BackingStore, Row, RowSet, SqlParam};
use crate::domain::PlayerRecord;
use crate::error::{Error, Result};
use crate::write_behind::{PendingUpdate, UpdateKind};

/// In-memory backing store.
///
/// Players live in one map that `load` reads: full player rows replace an
/// entry and raw stat updates are written onto it. Every kind also keeps its
/// own table keyed by id, merged the way a relational upsert would.
/// `query` answers read-only statements with the stored players (filtered by
/// any text parameters) and mutating statements with an empty set.
#[derive(Debug, Default)]
pub struct InMemoryBackingStore {
    players: DashMap<String, PlayerRecord>,
    tables: DashMap<(UpdateKind, String), PendingUpdate>,
    batches: Mutex<Vec<(UpdateKind, Vec<PendingUpdate>)>>,

    // Statistics
    load_calls: AtomicU64,
    upsert_calls: AtomicU64,
    query_calls: AtomicU64,

    // Failure injection
    latency_ms: AtomicU64,
    failing_upserts: AtomicU32,
    schema_rejects: Mutex<HashSet<UpdateKind>>,
    fail_loads: AtomicBool,
    fail_queries: AtomicBool,
}

impl InMemoryBackingStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a player record
    pub fn insert(&self, record: PlayerRecord) {
        self.players.insert(record.id.clone(), record);
    }

    /// Player record as currently persisted
    pub fn player(&self, id: &str) -> Option<PlayerRecord> {
        self.players.get(id).map(|r| r.value().clone())
    }

    /// Persisted row of `kind` for `id`
    pub fn stored(&self, kind: UpdateKind, id: &str) -> Option<PendingUpdate> {
        self.tables
            .get(&(kind, id.to_string()))
            .map(|r| r.value().clone())
    }

    /// Number of persisted rows of `kind`
    pub fn stored_rows(&self, kind: UpdateKind) -> usize {
        self.tables.iter().filter(|r| r.key().0 == kind).count()
    }

    /// Every successful `bulk_upsert` batch, in call order
    pub fn upserted_batches(&self) -> Vec<(UpdateKind, Vec<PendingUpdate>)> {
        self.batches.lock().clone()
    }

    pub fn load_calls(&self) -> u64 {
        self.load_calls.load(Ordering::Relaxed)
    }

    /// Number of `bulk_upsert` calls, failed ones included
    pub fn upsert_calls(&self) -> u64 {
        self.upsert_calls.load(Ordering::Relaxed)
    }

    pub fn query_calls(&self) -> u64 {
        self.query_calls.load(Ordering::Relaxed)
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Fail the next `count` upserts with `BackingStoreUnavailable`
    pub fn fail_next_upserts(&self, count: u32) {
        self.failing_upserts.store(count, Ordering::Relaxed);
    }

    /// Reject every upsert of `kind` with `SchemaMismatch`
    pub fn reject_kind_with_schema_mismatch(&self, kind: UpdateKind) {
        self.schema_rejects.lock().insert(kind);
    }

    /// Stop rejecting upserts of `kind`
    pub fn accept_kind(&self, kind: UpdateKind) {
        self.schema_rejects.lock().remove(&kind);
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::Relaxed);
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::Relaxed);
    }

    async fn simulate_latency(&self) {
        let ms = self.latency_ms.load(Ordering::Relaxed);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn take_injected_upsert_failure(&self) -> bool {
        self.failing_upserts
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Write a row onto the player map. A stats update for an unknown
    /// player creates a default row, as the table defaults would.
    fn apply_to_players(&self, update: &PendingUpdate) {
        match update {
            PendingUpdate::Player(record) => {
                self.players.insert(record.id.clone(), record.clone());
            }
            PendingUpdate::Stats(stats) => {
                let mut player = self
                    .players
                    .entry(stats.id.clone())
                    .or_insert_with(|| PlayerRecord::new(stats.id.as_str(), "novice"));
                stats.apply_to(&mut player);
            }
            _ => {}
        }
    }

    fn store_row(&self, kind: UpdateKind, update: &PendingUpdate) {
        self.tables
            .entry((kind, update.id().to_string()))
            .and_modify(|stored| stored.merge(update.clone()))
            .or_insert_with(|| update.clone());
    }

    fn player_rows(&self, params: &[SqlParam]) -> Result<Vec<Row>> {
        let ids: Vec<&str> = params
            .iter()
            .filter_map(|p| match p {
                SqlParam::Text(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();

        let mut players: Vec<PlayerRecord> = self
            .players
            .iter()
            .filter(|r| ids.is_empty() || ids.contains(&r.key().as_str()))
            .map(|r| r.value().clone())
            .collect();
        players.sort_by(|a, b| a.id.cmp(&b.id));

        players
            .into_iter()
            .map(|player| match serde_json::to_value(player)? {
                Value::Object(row) => Ok(row),
                other => Err(Error::Internal(format!("player row is not an object: {}", other))),
            })
            .collect()
    }
}

#[async_trait]
impl BackingStore for InMemoryBackingStore {
    async fn load(&self, key: &str) -> Result<Option<PlayerRecord>> {
        self.load_calls.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;

        if self.fail_loads.load(Ordering::Relaxed) {
            return Err(Error::BackingStoreUnavailable("injected load failure".into()));
        }

        Ok(self.player(key))
    }

    async fn bulk_upsert(&self, kind: UpdateKind, rows: &[PendingUpdate]) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;

        if self.schema_rejects.lock().contains(&kind) {
            return Err(Error::SchemaMismatch {
                kind: kind.to_string(),
                reason: format!("relation \"{}\" does not exist", kind.table()),
            });
        }
        if self.take_injected_upsert_failure() {
            return Err(Error::BackingStoreUnavailable("injected upsert failure".into()));
        }

        if let Some(row) = rows.iter().find(|row| row.kind() != kind) {
            return Err(Error::SchemaMismatch {
                kind: kind.to_string(),
                reason: format!("row for {} has kind {}", row.id(), row.kind()),
            });
        }

        for row in rows {
            self.apply_to_players(row);
            self.store_row(kind, row);
        }
        self.batches.lock().push((kind, rows.to_vec()));

        Ok(())
    }

    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<RowSet> {
        self.query_calls.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;

        if self.fail_queries.load(Ordering::Relaxed) {
            return Err(Error::BackingStoreUnavailable("injected query failure".into()));
        }

        if !is_read_only(sql) {
            return Ok(RowSet::default());
        }

        Ok(RowSet::new(self.player_rows(params)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::{json, Map};

    fn stat(id: &str, level: u32) -> PendingUpdate {
        PendingUpdate::normalize(
            UpdateKind::Stats,
            &json!(id),
            json!({ "level": level }).as_object().unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_load_returns_inserted_player() {
        let store = InMemoryBackingStore::new();
        store.insert(PlayerRecord::new("u1", "mage"));

        assert!(store.load("u1").await.unwrap().is_some());
        assert!(store.load("u2").await.unwrap().is_none());
        assert_eq!(store.load_calls(), 2);
    }

    #[tokio::test]
    async fn test_upsert_persists_rows_and_stats() {
        let store = InMemoryBackingStore::new();
        store.insert(PlayerRecord::new("u1", "mage"));

        store
            .bulk_upsert(UpdateKind::Stats, &[stat("u1", 8), stat("u2", 3)])
            .await
            .unwrap();

        assert_eq!(store.stored_rows(UpdateKind::Stats), 2);
        assert_eq!(store.player("u1").unwrap().level, 8);
        assert_eq!(store.player("u1").unwrap().class, "mage");
        assert_eq!(store.player("u2").unwrap().class, "novice");
        assert_eq!(store.stored(UpdateKind::Stats, "u2"), Some(stat("u2", 3)));
    }

    #[tokio::test]
    async fn test_player_rows_replace_the_loaded_record() {
        let store = InMemoryBackingStore::new();
        let record = PlayerRecord::new("u1", "mage").with_attribute("guild", json!("ash"));

        store
            .bulk_upsert(
                UpdateKind::Player,
                &[PendingUpdate::from_record(&record).unwrap()],
            )
            .await
            .unwrap();

        assert_eq!(store.load("u1").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_partial_stats_keep_other_columns() {
        let store = InMemoryBackingStore::new();
        let mut record = PlayerRecord::new("u1", "mage");
        record.experience = 700;
        store.insert(record);

        store
            .bulk_upsert(UpdateKind::Stats, &[stat("u1", 8)])
            .await
            .unwrap();
        let credits = PendingUpdate::normalize(
            UpdateKind::Stats,
            &json!("u1"),
            json!({ "credits": 5 }).as_object().unwrap(),
        )
        .unwrap();
        store
            .bulk_upsert(UpdateKind::Stats, &[credits])
            .await
            .unwrap();

        let player = store.player("u1").unwrap();
        assert_eq!((player.level, player.experience, player.credits), (8, 700, 5));
        assert_eq!(
            store.stored(UpdateKind::Stats, "u1").unwrap().values(),
            vec![Some(8), None, None, None, Some(5)]
        );
    }

    #[tokio::test]
    async fn test_injected_failures_are_counted_down() {
        let store = InMemoryBackingStore::new();
        store.fail_next_upserts(1);

        assert_matches!(
            store.bulk_upsert(UpdateKind::Stats, &[stat("u1", 1)]).await,
            Err(Error::BackingStoreUnavailable(_))
        );
        assert!(store
            .bulk_upsert(UpdateKind::Stats, &[stat("u1", 1)])
            .await
            .is_ok());
        assert_eq!(store.upsert_calls(), 2);
        assert_eq!(store.upserted_batches().len(), 1);
    }

    #[tokio::test]
    async fn test_schema_rejection() {
        let store = InMemoryBackingStore::new();
        store.reject_kind_with_schema_mismatch(UpdateKind::Inventory);

        let update =
            PendingUpdate::normalize(UpdateKind::Inventory, &json!("u1"), &Map::new()).unwrap();
        assert_matches!(
            store.bulk_upsert(UpdateKind::Inventory, &[update.clone()]).await,
            Err(Error::SchemaMismatch { .. })
        );

        store.accept_kind(UpdateKind::Inventory);
        assert!(store.bulk_upsert(UpdateKind::Inventory, &[update]).await.is_ok());
    }

    #[tokio::test]
    async fn test_query_filters_by_text_params() {
        let store = InMemoryBackingStore::new();
        store.insert(PlayerRecord::new("u1", "mage"));
        store.insert(PlayerRecord::new("u2", "rogue"));

        let all = store.query("SELECT * FROM players", &[]).await.unwrap();
        assert_eq!(all.len(), 2);

        let one = store
            .query("SELECT * FROM players WHERE id = $1", &["u2".into()])
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one.rows[0]["class"], "rogue");

        let write = store.query("DELETE FROM players", &[]).await.unwrap();
        assert!(write.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_applied() {
        let store = InMemoryBackingStore::new();
        store.set_latency(Duration::from_millis(250));

        let started = tokio::time::Instant::now();
        store.load("u1").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(250));
    }
}
