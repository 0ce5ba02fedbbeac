//! In-memory backend with JSON snapshot persistence.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::MetricStore;
use crate::error::{Result, VigilError};
use crate::types::{finite_gauge, Metric, MetricKind, MetricUpdate};

#[derive(Debug, Default, Clone)]
struct Maps {
    gauges: BTreeMap<String, f64>,
    counters: BTreeMap<String, i64>,
}

fn checked_total(id: &str, current: i64, delta: i64) -> Result<i64> {
    current.checked_add(delta).ok_or_else(|| VigilError::CounterOverflow { id: id.to_string() })
}

impl Maps {
    /// Add `delta` and return the new total; an overflowing add changes nothing.
    fn add_counter(&mut self, id: &str, delta: i64) -> Result<i64> {
        let current = self.counters.get(id).copied().unwrap_or(0);
        let total = checked_total(id, current, delta)?;
        self.counters.insert(id.to_string(), total);
        Ok(total)
    }

    /// Apply every update or, if any counter would overflow, none of them.
    fn apply_all(&mut self, updates: &[MetricUpdate]) -> Result<()> {
        let mut totals: BTreeMap<&str, i64> = BTreeMap::new();
        for update in updates {
            if let MetricUpdate::Counter { id, delta } = update {
                let current = match totals.get(id.as_str()) {
                    Some(total) => *total,
                    None => self.counters.get(id).copied().unwrap_or(0),
                };
                totals.insert(id, checked_total(id, current, *delta)?);
            }
        }

        for update in updates {
            if let MetricUpdate::Gauge { id, value } = update {
                self.gauges.insert(id.clone(), *value);
            }
        }
        for (id, total) in totals {
            self.counters.insert(id.to_string(), total);
        }
        Ok(())
    }

    fn to_metrics(&self) -> Vec<Metric> {
        let gauges = self.gauges.iter().map(|(id, value)| Metric::gauge(id.clone(), *value));
        let counters = self.counters.iter().map(|(id, total)| Metric::counter(id.clone(), *total));
        gauges.chain(counters).collect()
    }
}

/// Both maps behind one exclusive lock.
///
/// Every mutation and every listing takes the same lock, so operations are
/// linearizable. Persistence is a wholesale rewrite of the snapshot file.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Maps>,
    /// Serializes snapshot writers so temp files never interleave.
    flush_lock: Mutex<()>,
    snapshot_path: Option<PathBuf>,
    sync_flush: bool,
}

impl MemoryStore {
    /// Create an empty store. `None` disables snapshot persistence.
    pub fn new(snapshot_path: Option<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(Maps::default()),
            flush_lock: Mutex::new(()),
            snapshot_path,
            sync_flush: false,
        }
    }

    /// Flush after every successful mutation.
    pub fn with_sync_flush(mut self, sync_flush: bool) -> Self {
        self.sync_flush = sync_flush;
        self
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Run `mutate` against the maps.
    ///
    /// In sync-flush mode the mutation is staged on a copy, the copy is
    /// written to the snapshot, and only then does it replace the live maps.
    /// A failed write leaves the store untouched.
    async fn commit<T>(&self, mutate: impl FnOnce(&mut Maps) -> Result<T>) -> Result<T> {
        let path = match &self.snapshot_path {
            Some(path) if self.sync_flush => path,
            _ => return mutate(&mut *self.inner.lock().await),
        };

        let _writer = self.flush_lock.lock().await;
        let mut maps = self.inner.lock().await;
        let mut staged = maps.clone();
        let result = mutate(&mut staged)?;
        Self::persist(path, &staged.to_metrics()).await?;
        *maps = staged;
        Ok(result)
    }

    async fn persist(path: &Path, metrics: &[Metric]) -> Result<()> {
        Self::write_snapshot(path, metrics).await.inspect_err(|_| {
            metrics::counter!("vigil_snapshot_errors_total").increment(1);
        })?;
        debug!(path = %path.display(), count = metrics.len(), "Snapshot written");
        Ok(())
    }

    async fn write_snapshot(path: &Path, metrics: &[Metric]) -> Result<()> {
        let io_err = |source| VigilError::SnapshotIo { path: path.to_path_buf(), source };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let body = serde_json::to_vec_pretty(metrics)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &body).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl MetricStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn update_gauge(&self, id: &str, value: f64) -> Result<()> {
        let value = finite_gauge(value)?;
        self.commit(|maps| {
            maps.gauges.insert(id.to_string(), value);
            Ok(())
        })
        .await
    }

    async fn update_counter(&self, id: &str, delta: i64) -> Result<i64> {
        self.commit(|maps| maps.add_counter(id, delta)).await
    }

    async fn get_gauge(&self, id: &str) -> Result<f64> {
        self.inner.lock().await.gauges.get(id).copied().ok_or_else(|| {
            VigilError::MetricNotFound { kind: MetricKind::Gauge.as_str(), id: id.to_string() }
        })
    }

    async fn get_counter(&self, id: &str) -> Result<i64> {
        self.inner.lock().await.counters.get(id).copied().ok_or_else(|| {
            VigilError::MetricNotFound { kind: MetricKind::Counter.as_str(), id: id.to_string() }
        })
    }

    async fn list_gauges(&self) -> Result<BTreeMap<String, f64>> {
        Ok(self.inner.lock().await.gauges.clone())
    }

    async fn list_counters(&self) -> Result<BTreeMap<String, i64>> {
        Ok(self.inner.lock().await.counters.clone())
    }

    #[instrument(skip(self, metrics), fields(count = metrics.len()))]
    async fn update_batch(&self, metrics: &[Metric]) -> Result<()> {
        let updates = MetricUpdate::validate_batch(metrics)?;
        self.commit(|maps| maps.apply_all(&updates)).await
    }

    #[instrument(skip(self))]
    async fn restore(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let body = match tokio::fs::read(path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No snapshot found, starting empty");
                return Ok(());
            }
            Err(source) => return Err(VigilError::SnapshotIo { path: path.clone(), source }),
        };

        if body.iter().all(u8::is_ascii_whitespace) {
            warn!(path = %path.display(), "Snapshot file is empty, starting empty");
            return Ok(());
        }

        let metrics: Vec<Metric> = serde_json::from_slice(&body)?;
        let updates = MetricUpdate::validate_batch(&metrics)?;

        let mut maps = self.inner.lock().await;
        maps.apply_all(&updates)?;
        info!(
            path = %path.display(),
            gauges = maps.gauges.len(),
            counters = maps.counters.len(),
            "Restored metrics from snapshot"
        );
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let _writer = self.flush_lock.lock().await;
        let metrics = self.inner.lock().await.to_metrics();
        Self::persist(path, &metrics).await
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
