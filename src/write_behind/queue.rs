//! Write-Behind Queue
//!
//! One append-only buffer per [`UpdateKind`]. Updates are flushed to the
//! backing store as a single bulk upsert, either by the background ticker or
//! as soon as a buffer reaches the batch size.
//!
//! # Flush cycle
//!
//! ```text
//!  enqueue ──▶ [ u1 u2 u3 ... uN | uN+1 ... ]     buffer (per kind)
//!                └──── take ────┘
//!                       │ merge by id (newer fields win)
//!                       ▼
//!                 bulk_upsert(kind, rows)
//!                   │             │
//!                  Ok            Err ──▶ attempts += 1
//!                   │                     ├─ below cap: re-prepend in order
//!                 discard                 └─ at cap / permanent: dead letter
//! ```
//!
//! At most one flush per kind runs at a time. A flush in progress runs to
//! completion; there is no partial-batch rollback.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use super::dead_letter::LoggingDeadLetters;
use super::update::{PendingUpdate, UpdateKind};
use crate::adapters::LoggingEventPublisher;
use crate::config::WriteBehindConfig;
use crate::domain::ports::{BackingStore, DeadLetterSink, EventPublisher};
use crate::domain::CacheEvent;
use crate::error::{Error, Result};

// =============================================================================
// Buffer
// =============================================================================

/// An update plus the number of failed flushes it has been part of.
#[derive(Debug, Clone)]
struct QueuedUpdate {
    update: PendingUpdate,
    attempts: u32,
}

#[derive(Debug, Default)]
struct KindBuffer {
    pending: Mutex<VecDeque<QueuedUpdate>>,
    /// Serializes flushes of this kind.
    flush_lock: tokio::sync::Mutex<()>,
    /// Set while a batch-size flush is spawned but not finished.
    flush_scheduled: AtomicBool,
}

impl KindBuffer {
    fn len(&self) -> usize {
        self.pending.lock().len()
    }

    fn take_front(&self, max: usize) -> Vec<QueuedUpdate> {
        let mut pending = self.pending.lock();
        let count = max.min(pending.len());
        pending.drain(..count).collect()
    }

    fn prepend(&self, batch: Vec<QueuedUpdate>) {
        let mut pending = self.pending.lock();
        for queued in batch.into_iter().rev() {
            pending.push_front(queued);
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Write-behind statistics.
#[derive(Debug, Default)]
pub struct WriteBehindStats {
    pub enqueued: AtomicU64,
    pub triggered_flushes: AtomicU64,
    pub flushes: AtomicU64,
    pub flushed_records: AtomicU64,
    pub flushed_rows: AtomicU64,
    pub failed_flushes: AtomicU64,
    pub requeued: AtomicU64,
    pub dead_lettered: AtomicU64,
}

impl WriteBehindStats {
    fn record_success(&self, records: usize, rows: usize) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.flushed_records.fetch_add(records as u64, Ordering::Relaxed);
        self.flushed_rows.fetch_add(rows as u64, Ordering::Relaxed);
    }

    fn record_failure(&self, requeued: usize, dead_lettered: usize) {
        self.failed_flushes.fetch_add(1, Ordering::Relaxed);
        self.requeued.fetch_add(requeued as u64, Ordering::Relaxed);
        self.dead_lettered
            .fetch_add(dead_lettered as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WriteBehindCounters {
        WriteBehindCounters {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            triggered_flushes: self.triggered_flushes.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            flushed_records: self.flushed_records.load(Ordering::Relaxed),
            flushed_rows: self.flushed_rows.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the write-behind counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteBehindCounters {
    pub enqueued: u64,
    pub triggered_flushes: u64,
    pub flushes: u64,
    pub flushed_records: u64,
    pub flushed_rows: u64,
    pub failed_flushes: u64,
    pub requeued: u64,
    pub dead_lettered: u64,
}

/// Outcome of a successful flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub kind: UpdateKind,
    /// Queued records taken from the buffer
    pub records: usize,
    /// Rows sent after coalescing by id
    pub rows: usize,
}

impl FlushReport {
    fn empty(kind: UpdateKind) -> Self {
        Self {
            kind,
            records: 0,
            rows: 0,
        }
    }
}

// =============================================================================
// Queue
// =============================================================================

/// Per-kind write-behind buffers in front of a backing store.
pub struct WriteBehindQueue {
    buffers: [KindBuffer; UpdateKind::ALL.len()],
    store: Arc<dyn BackingStore>,
    publisher: Arc<dyn EventPublisher>,
    dead_letters: Arc<dyn DeadLetterSink>,
    config: WriteBehindConfig,
    stats: WriteBehindStats,
}

impl WriteBehindQueue {
    /// Create a queue that logs events and dead letters.
    pub fn new(config: WriteBehindConfig, store: Arc<dyn BackingStore>) -> Self {
        Self {
            buffers: Default::default(),
            store,
            publisher: Arc::new(LoggingEventPublisher::new()),
            dead_letters: Arc::new(LoggingDeadLetters),
            config,
            stats: WriteBehindStats::default(),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_dead_letters(mut self, dead_letters: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = dead_letters;
        self
    }

    fn buffer(&self, kind: UpdateKind) -> &KindBuffer {
        &self.buffers[kind.index()]
    }

    /// Append an update to its kind's buffer.
    ///
    /// When the buffer reaches the batch size, one out-of-band flush is
    /// spawned for that kind; further enqueues do not spawn another until it
    /// finishes. Returns `true` if this call spawned the flush.
    pub fn enqueue(self: &Arc<Self>, update: PendingUpdate) -> bool {
        let kind = update.kind();
        let buffer = self.buffer(kind);

        let len = {
            let mut pending = buffer.pending.lock();
            pending.push_back(QueuedUpdate {
                update,
                attempts: 0,
            });
            pending.len()
        };
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);

        if len < self.config.max_batch_size {
            return false;
        }

        if buffer
            .flush_scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            buffer.flush_scheduled.store(false, Ordering::Release);
            warn!(kind = %kind, pending = len, "No runtime for batch flush; waiting for ticker");
            return false;
        };

        debug!(kind = %kind, pending = len, "Batch size reached, scheduling flush");
        self.stats.triggered_flushes.fetch_add(1, Ordering::Relaxed);

        let queue = Arc::clone(self);
        handle.spawn(async move {
            // Failures are re-queued and published inside flush.
            let _ = queue.flush(kind).await;
            queue
                .buffer(kind)
                .flush_scheduled
                .store(false, Ordering::Release);
        });

        true
    }

    /// Flush up to one batch of `kind` to the backing store.
    ///
    /// On failure the taken records are back at the front of the buffer in
    /// their original order (minus any that were dead-lettered) and the
    /// error is returned.
    #[instrument(skip_all, fields(kind = %kind))]
    pub async fn flush(&self, kind: UpdateKind) -> Result<FlushReport> {
        let buffer = self.buffer(kind);
        let _serialized = buffer.flush_lock.lock().await;

        let batch = buffer.take_front(self.config.max_batch_size);
        if batch.is_empty() {
            return Ok(FlushReport::empty(kind));
        }

        let rows = coalesce(&batch);
        let records = batch.len();

        match self.store.bulk_upsert(kind, &rows).await {
            Ok(()) => {
                self.stats.record_success(records, rows.len());
                info!(records, rows = rows.len(), "Flushed write-behind batch");
                self.publish(CacheEvent::flush_succeeded(kind, records, rows.len()))
                    .await;

                Ok(FlushReport {
                    kind,
                    records,
                    rows: rows.len(),
                })
            }
            Err(err) => {
                self.handle_failure(kind, batch, &err).await;
                Err(err)
            }
        }
    }

    /// Flush one batch of every kind.
    pub async fn flush_all(&self) -> Vec<(UpdateKind, Result<FlushReport>)> {
        let mut results = Vec::with_capacity(UpdateKind::ALL.len());
        for kind in UpdateKind::ALL {
            results.push((kind, self.flush(kind).await));
        }
        results
    }

    /// Flush every kind until the buffers are empty or a flush fails.
    pub async fn drain(&self) -> Result<usize> {
        let mut flushed = 0;
        for kind in UpdateKind::ALL {
            while self.pending_len(kind) > 0 {
                flushed += self.flush(kind).await?.records;
            }
        }
        Ok(flushed)
    }

    async fn handle_failure(&self, kind: UpdateKind, batch: Vec<QueuedUpdate>, err: &Error) {
        let records = batch.len();
        let permanent = !err.is_retryable();
        let max_attempts = self.config.max_attempts;

        let (retry, retired): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .map(|mut queued| {
                queued.attempts += 1;
                queued
            })
            .partition(|queued| !permanent && queued.attempts < max_attempts);

        let requeued = retry.len();
        let dead_lettered = retired.len();

        self.buffer(kind).prepend(retry);
        self.stats.record_failure(requeued, dead_lettered);

        error!(
            records,
            requeued,
            dead_lettered,
            permanent,
            error = %err,
            "Write-behind flush failed"
        );
        self.publish(CacheEvent::flush_failed(
            kind,
            records,
            requeued,
            err.to_string(),
        ))
        .await;

        if !retired.is_empty() {
            error!(records = dead_lettered, error = %err, "Dead-lettering write-behind records");
            self.dead_letters
                .accept(kind, retired.into_iter().map(|q| q.update).collect(), err)
                .await;
            self.publish(CacheEvent::batch_dead_lettered(
                kind,
                dead_lettered,
                err.to_string(),
            ))
            .await;
        }
    }

    async fn publish(&self, event: CacheEvent) {
        if let Err(e) = self.publisher.publish(event).await {
            warn!(error = %e, "Failed to publish cache event");
        }
    }

    /// Number of pending updates of `kind`.
    pub fn pending_len(&self, kind: UpdateKind) -> usize {
        self.buffer(kind).len()
    }

    /// Pending counts for every kind.
    pub fn pending_counts(&self) -> BTreeMap<UpdateKind, usize> {
        UpdateKind::ALL
            .into_iter()
            .map(|kind| (kind, self.pending_len(kind)))
            .collect()
    }

    /// Total pending updates across kinds.
    pub fn total_pending(&self) -> usize {
        UpdateKind::ALL
            .into_iter()
            .map(|kind| self.pending_len(kind))
            .sum()
    }

    /// Copy of the pending updates of `kind`, front first.
    pub fn pending(&self, kind: UpdateKind) -> Vec<PendingUpdate> {
        self.buffer(kind)
            .pending
            .lock()
            .iter()
            .map(|queued| queued.update.clone())
            .collect()
    }

    pub fn config(&self) -> &WriteBehindConfig {
        &self.config
    }

    pub fn stats(&self) -> &WriteBehindStats {
        &self.stats
    }
}

impl std::fmt::Debug for WriteBehindQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBehindQueue")
            .field("pending", &self.pending_counts())
            .field("config", &self.config)
            .finish()
    }
}

/// One row per id in order of first appearance; later updates are merged
/// into earlier ones with [`PendingUpdate::merge`].
fn coalesce(batch: &[QueuedUpdate]) -> Vec<PendingUpdate> {
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(batch.len());
    let mut rows: Vec<PendingUpdate> = Vec::with_capacity(batch.len());

    for queued in batch {
        match positions.get(queued.update.id()) {
            Some(&index) => rows[index].merge(queued.update.clone()),
            None => {
                positions.insert(queued.update.id(), rows.len());
                rows.push(queued.update.clone());
            }
        }
    }

    rows
}

// =============================================================================
// Tests
// =============================================================================
