//! Dispatch pipeline.
//!
//! Two mutually exclusive modes, chosen once from the rate limit:
//! - [`SnapshotReporter`] (rate limit 0): every report interval the whole
//!   accumulator goes out as one batch
//! - [`WorkerPool`] (rate limit N): producers feed a bounded queue, N workers
//!   send one metric per request

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use vigil_core::Backoff;

use crate::error::DispatchError;
use crate::sampler::Accumulator;
use crate::transport::Transport;

mod pool;

pub use pool::{WindowStats, WorkerPool, QUEUE_CAPACITY};

/// Sends full accumulator snapshots on the report interval.
pub struct SnapshotReporter {
    accumulator: Arc<Accumulator>,
    transport: Arc<dyn Transport>,
    backoff: Backoff,
}

impl SnapshotReporter {
    pub fn new(accumulator: Arc<Accumulator>, transport: Arc<dyn Transport>, backoff: Backoff) -> Self {
        Self { accumulator, transport, backoff }
    }

    /// Send the current snapshot, retrying refused connections.
    ///
    /// Counter deltas taken by the snapshot are gone either way: a batch that
    /// fails after the last retry is dropped.
    #[instrument(skip(self))]
    pub async fn report_once(&self) -> Result<usize, DispatchError> {
        let batch = self.accumulator.snapshot();
        if batch.is_empty() {
            return Ok(0);
        }

        let transport = &self.transport;
        let batch_ref = &batch;
        self.backoff
            .retry(
                "send batch",
                |_| {
                    metrics::counter!("vigil_dispatch_attempts_total", "mode" => "snapshot")
                        .increment(1);
                    transport.send_batch(batch_ref)
                },
                DispatchError::is_retryable,
            )
            .await
            .inspect_err(|e| {
                metrics::counter!(
                    "vigil_dispatch_failures_total",
                    "mode" => "snapshot",
                    "reason" => e.reason()
                )
                .increment(1);
                metrics::counter!("vigil_dispatch_dropped_total").increment(batch.len() as u64);
            })?;
        Ok(batch.len())
    }

    /// Report every `report_interval` until cancelled. The first report
    /// goes out one interval after start.
    pub async fn run(self, report_interval: Duration, cancel: CancellationToken) {
        info!(report_interval_secs = report_interval.as_secs(), "Snapshot reporter started");
        let mut ticker = tokio::time::interval(report_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.report_once().await {
                        warn!(error = %e, "Dropping batch");
                    }
                }
            }
        }
        info!("Snapshot reporter stopped");
    }
}
