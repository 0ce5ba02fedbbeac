//! Periodic snapshotter for the in-memory backend.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use vigil_core::observability::metrics::record_flush;
use vigil_core::MetricStore;

/// Flush `store` and record the outcome. Failures are logged, not returned:
/// a missed snapshot must not take the collector down.
pub async fn flush_store(store: &dyn MetricStore, trigger: &'static str) -> bool {
    let started = Instant::now();
    match store.flush().await {
        Ok(()) => {
            record_flush(trigger, started.elapsed().as_secs_f64());
            true
        }
        Err(e) => {
            error!(trigger, backend = store.backend(), error = %e, "Snapshot flush failed");
            false
        }
    }
}

/// Flush every `interval` until `cancel` fires.
pub fn spawn(
    store: Arc<dyn MetricStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Snapshotter started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    flush_store(store.as_ref(), "interval").await;
                }
            }
        }
        info!("Snapshotter stopped");
    })
}
