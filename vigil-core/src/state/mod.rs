//! Storage engine.
//!
//! One contract, [`MetricStore`], with two backends:
//! - [`MemoryStore`]: both maps behind a single lock, persisted by snapshot
//! - [`SqliteStore`]: every write goes straight to the database
//!
//! The backend is chosen once at startup by [`open`] and passed down as an
//! `Arc<dyn MetricStore>`.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::types::Metric;

mod memory;
pub mod migrations;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[cfg(test)]
mod tests;

/// Update/read/persist contract over metric state.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Backend name for logs.
    fn backend(&self) -> &'static str;

    /// Overwrite a gauge; the last write applied wins. Non-finite values are
    /// rejected.
    async fn update_gauge(&self, id: &str, value: f64) -> Result<()>;

    /// Add `delta` to a counter, creating it at `delta` if absent, and return
    /// the total this update produced. An add that would overflow `i64` is
    /// rejected and leaves the counter unchanged.
    async fn update_counter(&self, id: &str, delta: i64) -> Result<i64>;

    async fn get_gauge(&self, id: &str) -> Result<f64>;

    async fn get_counter(&self, id: &str) -> Result<i64>;

    async fn list_gauges(&self) -> Result<BTreeMap<String, f64>>;

    async fn list_counters(&self) -> Result<BTreeMap<String, i64>>;

    /// Apply every metric or none of them, including when a counter in the
    /// batch would overflow or the write-through fails.
    async fn update_batch(&self, metrics: &[Metric]) -> Result<()>;

    /// Load prior state before serving traffic.
    async fn restore(&self) -> Result<()>;

    /// Persist current state.
    async fn flush(&self) -> Result<()>;

    /// Liveness probe.
    async fn ping(&self) -> Result<()>;
}

/// Backend selection, resolved from configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreBackend {
    Memory {
        /// Snapshot file; `None` disables persistence.
        snapshot_path: Option<PathBuf>,
        restore: bool,
        /// Flush after every mutation instead of on a timer.
        sync_flush: bool,
    },
    Relational {
        dsn: String,
    },
}

/// Construct the configured backend and restore prior state.
pub async fn open(backend: &StoreBackend) -> Result<Arc<dyn MetricStore>> {
    let store: Arc<dyn MetricStore> = match backend {
        StoreBackend::Memory { snapshot_path, restore, sync_flush } => {
            let store = MemoryStore::new(snapshot_path.clone()).with_sync_flush(*sync_flush);
            if *restore {
                store.restore().await?;
            }
            Arc::new(store)
        }
        StoreBackend::Relational { dsn } => Arc::new(SqliteStore::connect(dsn).await?),
    };

    info!(backend = store.backend(), "Metric store ready");
    Ok(store)
}
