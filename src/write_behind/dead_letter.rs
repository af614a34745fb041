//! Dead Letter Sinks
//!
//! Destinations for updates the write-behind queue has given up on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

use super::update::{PendingUpdate, UpdateKind};
use crate::domain::ports::DeadLetterSink;
use crate::error::Error;

/// An update that will never be retried, with the error that retired it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetter {
    pub kind: UpdateKind,
    pub update: PendingUpdate,
    pub error: String,
    pub retired_at: DateTime<Utc>,
}

/// Logs every dead-lettered update at error level and discards it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDeadLetters;

#[async_trait]
impl DeadLetterSink for LoggingDeadLetters {
    async fn accept(&self, kind: UpdateKind, updates: Vec<PendingUpdate>, err: &Error) {
        for update in &updates {
            let payload =
                serde_json::to_string(update).unwrap_or_else(|_| format!("{:?}", update));
            error!(kind = %kind, id = %update.id(), update = %payload, error = %err, "Update dead-lettered");
        }
    }
}

/// Keeps dead-lettered updates in memory for inspection or replay.
#[derive(Debug, Default)]
pub struct InMemoryDeadLetters {
    letters: parking_lot::RwLock<Vec<DeadLetter>>,
}

impl InMemoryDeadLetters {
    pub fn new() -> Self {
        Self::default()
    }

    /// All retired updates, oldest first.
    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters.read().clone()
    }

    pub fn len(&self) -> usize {
        self.letters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.read().is_empty()
    }

    /// Remove and return every retired update of `kind`.
    pub fn drain_kind(&self, kind: UpdateKind) -> Vec<PendingUpdate> {
        let mut letters = self.letters.write();
        let (drained, kept): (Vec<_>, Vec<_>) =
            letters.drain(..).partition(|letter| letter.kind == kind);
        *letters = kept;
        drained.into_iter().map(|letter| letter.update).collect()
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetters {
    async fn accept(&self, kind: UpdateKind, updates: Vec<PendingUpdate>, err: &Error) {
        let retired_at = Utc::now();
        let error = err.to_string();

        self.letters
            .write()
            .extend(updates.into_iter().map(|update| DeadLetter {
                kind,
                update,
                error: error.clone(),
                retired_at,
            }));
    }
}
