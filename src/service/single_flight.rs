//! In-Flight Load Registry
//!
//! Coalesces concurrent cache misses for the same key into one backing-store
//! load. The first caller becomes the leader and performs the load; callers
//! arriving while it runs subscribe to the leader's outcome.
//!
//! If a leader is dropped before completing (its future was cancelled), the
//! key is released and waiting followers fall back to loading on their own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::domain::PlayerRecord;

/// Result of a load shared with followers.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The store answered; `None` means the player does not exist.
    Loaded(Option<PlayerRecord>),
    /// The load failed or timed out.
    Failed(String),
}

impl LoadOutcome {
    /// The record, treating failure as absence.
    pub fn into_record(self) -> Option<PlayerRecord> {
        match self {
            LoadOutcome::Loaded(record) => record,
            LoadOutcome::Failed(_) => None,
        }
    }
}

type Slot = watch::Sender<Option<LoadOutcome>>;

/// Per-key registry of loads in progress.
#[derive(Debug, Default)]
pub struct SingleFlight {
    in_flight: Mutex<HashMap<String, Slot>>,
    coalesced: AtomicU64,
}

/// Role assigned by [`SingleFlight::join`].
#[derive(Debug)]
pub enum Flight<'a> {
    /// Perform the load and report it through the guard.
    Leader(FlightGuard<'a>),
    /// Wait for the leader.
    Follower(Waiter),
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in loading `key`.
    pub fn join(&self, key: &str) -> Flight<'_> {
        let mut in_flight = self.in_flight.lock();

        if let Some(slot) = in_flight.get(key) {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            return Flight::Follower(Waiter {
                receiver: slot.subscribe(),
            });
        }

        let (slot, _) = watch::channel(None);
        in_flight.insert(key.to_string(), slot.clone());

        Flight::Leader(FlightGuard {
            registry: self,
            key: key.to_string(),
            slot,
        })
    }

    /// Number of keys currently being loaded.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Number of callers that waited on another caller's load.
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }
}

/// Held by the leader; releases the key when dropped.
#[derive(Debug)]
pub struct FlightGuard<'a> {
    registry: &'a SingleFlight,
    key: String,
    slot: Slot,
}

impl FlightGuard<'_> {
    /// Publish the outcome to every follower and release the key.
    pub fn complete(self, outcome: LoadOutcome) {
        self.slot.send_replace(Some(outcome));
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.in_flight.lock().remove(&self.key);
    }
}

/// Held by a follower.
#[derive(Debug)]
pub struct Waiter {
    receiver: watch::Receiver<Option<LoadOutcome>>,
}

impl Waiter {
    /// Wait for the leader's outcome. `None` if the leader went away first.
    pub async fn wait(mut self) -> Option<LoadOutcome> {
        let outcome = match self.receiver.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome
    }
}
