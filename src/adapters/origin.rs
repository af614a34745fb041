//! In-Memory Origin Map
//!
//! Legacy direct-access player map. Readers outside the cache subsystem may
//! still use it; the facade mirrors every write into it.

use dashmap::DashMap;

use crate::domain::ports::{Mirror, OriginMap};
use crate::domain::PlayerRecord;

#[derive(Debug, Default)]
pub struct InMemoryOriginMap {
    players: DashMap<String, PlayerRecord>,
}

impl InMemoryOriginMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&self, key: &str) -> Option<PlayerRecord> {
        self.players.remove(key).map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

impl Mirror for InMemoryOriginMap {
    fn set(&self, key: &str, record: &PlayerRecord) {
        self.players.insert(key.to_string(), record.clone());
    }
}

impl OriginMap for InMemoryOriginMap {
    fn get(&self, key: &str) -> Option<PlayerRecord> {
        self.players.get(key).map(|r| r.value().clone())
    }
}
