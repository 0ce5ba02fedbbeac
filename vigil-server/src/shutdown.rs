//! Graceful shutdown for the collector.
//!
//! On cancellation the listener stops accepting, in-flight requests get
//! [`GRACE_PERIOD`] to finish, then the store is flushed one last time.
//! Requests still running after the grace period are abandoned; whatever
//! they already committed stays committed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vigil_core::MetricStore;

use crate::snapshot::flush_store;

/// How long in-flight requests may run after shutdown begins.
pub const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Drive `server` until it exits or `cancel` fires, then flush.
///
/// `server` must itself stop accepting once `cancel` fires and resolve when
/// its in-flight requests are done.
pub async fn run_until_shutdown<F>(
    server: F,
    store: Arc<dyn MetricStore>,
    cancel: CancellationToken,
    grace: Duration,
) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let mut server = tokio::spawn(server);

    let outcome = tokio::select! {
        joined = &mut server => {
            // The server stopped without being asked; shut everything else down too.
            cancel.cancel();
            joined.map_err(anyhow::Error::from).and_then(|r| r)
        }
        _ = cancel.cancelled() => {
            info!(grace_ms = grace.as_millis() as u64, "Shutting down, draining in-flight requests");
            match tokio::time::timeout(grace, &mut server).await {
                Ok(joined) => joined.map_err(anyhow::Error::from).and_then(|r| r),
                Err(_) => {
                    warn!("Grace period elapsed, abandoning in-flight requests");
                    server.abort();
                    Ok(())
                }
            }
        }
    };

    if flush_store(store.as_ref(), "shutdown").await {
        info!(backend = store.backend(), "Final flush complete");
    }
    outcome
}
