//! Background Ticker
//!
//! Periodically flushes the write-behind queue and sweeps expired entries.
//! Stops on a [`CancellationToken`] and drains the queue once before exiting.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::facade::CacheFacade;

/// Flush and sweep loop for one facade.
#[derive(Debug)]
pub struct Ticker {
    facade: Arc<CacheFacade>,
    flush_interval: Duration,
    sweep_interval: Duration,
    shutdown: CancellationToken,
}

impl Ticker {
    /// Ticker using the facade's configured intervals.
    pub fn new(facade: Arc<CacheFacade>) -> Self {
        let flush_interval = facade.config().write_behind.flush_interval;
        let sweep_interval = facade.config().sweep_interval;

        Self {
            facade,
            flush_interval,
            sweep_interval,
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop the ticker when `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Token that stops this ticker when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run on a new task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until cancelled. The first flush and sweep happen one interval in.
    #[instrument(skip(self))]
    pub async fn run(self) {
        info!(
            flush_interval = ?self.flush_interval,
            sweep_interval = ?self.sweep_interval,
            "Starting cache ticker"
        );

        let start = Instant::now();
        let mut flush_tick = interval_at(start + self.flush_interval, self.flush_interval);
        let mut sweep_tick = interval_at(start + self.sweep_interval, self.sweep_interval);
        flush_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("Cache ticker shutting down");
                    break;
                }

                _ = flush_tick.tick() => {
                    self.flush_cycle().await;
                }

                _ = sweep_tick.tick() => {
                    self.facade.sweep().await;
                }
            }
        }

        match self.facade.write_behind().drain().await {
            Ok(records) => info!(records, "Drained write-behind queue"),
            Err(e) => warn!(
                error = %e,
                pending = self.facade.write_behind().total_pending(),
                "Final write-behind drain failed"
            ),
        }
    }

    async fn flush_cycle(&self) {
        let mut records = 0;
        let mut failures = 0;

        for (_, result) in self.facade.flush_all().await {
            match result {
                Ok(report) => records += report.records,
                Err(_) => failures += 1,
            }
        }

        if records > 0 || failures > 0 {
            debug!(records, failures, "Flush cycle complete");
        }
    }
}
