//! Rate-limited worker pool.
//!
//! Each report window opens a bounded queue, starts `workers` senders and
//! one producer per probe. When the window ends the producers stop, the
//! queue closes, and the window returns once workers have drained it. A
//! full queue blocks producers until a worker frees a slot.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil_core::{Backoff, Metric};

use crate::error::DispatchError;
use crate::sampler::{Probe, POLL_COUNT};
use crate::transport::Transport;

/// Job queue capacity.
pub const QUEUE_CAPACITY: usize = 100;

/// Outcome of one window.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WindowStats {
    pub delivered: usize,
    pub dropped: usize,
}

type SharedProbe = Arc<Mutex<Box<dyn Probe>>>;
type Queue = Arc<tokio::sync::Mutex<mpsc::Receiver<Metric>>>;

pub struct WorkerPool {
    workers: usize,
    transport: Arc<dyn Transport>,
    backoff: Backoff,
    probes: Vec<SharedProbe>,
}

impl WorkerPool {
    pub fn new(
        workers: usize,
        transport: Arc<dyn Transport>,
        backoff: Backoff,
        probes: Vec<Box<dyn Probe>>,
    ) -> Self {
        let probes = probes.into_iter().map(|p| Arc::new(Mutex::new(p))).collect();
        Self { workers: workers.max(1), transport, backoff, probes }
    }

    /// Run windows back to back until cancelled. A window already under way
    /// when cancellation arrives still drains its queue.
    pub async fn run(&self, report_interval: Duration, poll_interval: Duration, cancel: CancellationToken) {
        info!(workers = self.workers, "Worker pool started");
        while !cancel.is_cancelled() {
            let stats = self.run_window(report_interval, poll_interval, &cancel).await;
            debug!(delivered = stats.delivered, dropped = stats.dropped, "Window complete");
        }
        info!("Worker pool stopped");
    }

    /// One report window.
    pub async fn run_window(
        &self,
        window: Duration,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> WindowStats {
        let (tx, rx) = mpsc::channel::<Metric>(QUEUE_CAPACITY);
        let queue: Queue = Arc::new(tokio::sync::Mutex::new(rx));

        let mut workers = JoinSet::new();
        for worker_id in 0..self.workers {
            workers.spawn(worker(worker_id, queue.clone(), self.transport.clone(), self.backoff));
        }

        let deadline = Instant::now() + window;
        let mut producers = JoinSet::new();
        for probe in &self.probes {
            producers.spawn(produce(probe.clone(), tx.clone(), poll_interval, deadline, cancel.clone()));
        }
        // Producers hold the only senders left; the queue closes when they finish.
        drop(tx);

        while producers.join_next().await.is_some() {}

        let mut stats = WindowStats::default();
        while let Some(joined) = workers.join_next().await {
            if let Ok(worker_stats) = joined {
                stats.delivered += worker_stats.delivered;
                stats.dropped += worker_stats.dropped;
            }
        }
        stats
    }
}

async fn produce(
    probe: SharedProbe,
    tx: mpsc::Sender<Metric>,
    poll_interval: Duration,
    deadline: Instant,
    cancel: CancellationToken,
) {
    loop {
        let mut jobs = {
            let mut probe = probe.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let mut jobs = probe.sample();
            jobs.retain(|job| job.value.map_or(true, f64::is_finite));
            metrics::counter!("vigil_samples_total", "source" => probe.name()).increment(1);
            jobs
        };
        jobs.push(Metric::counter(POLL_COUNT, 1));

        for job in jobs {
            tokio::select! {
                biased;
                _ = tokio::time::sleep_until(deadline) => return,
                sent = tx.send(job) => if sent.is_err() { return },
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep_until(deadline) => return,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}

async fn worker(
    worker_id: usize,
    queue: Queue,
    transport: Arc<dyn Transport>,
    backoff: Backoff,
) -> WindowStats {
    let mut stats = WindowStats::default();
    loop {
        // Only one idle worker waits on the queue at a time; the lock is
        // released before sending.
        let job = queue.lock().await.recv().await;
        let Some(metric) = job else { break };

        metrics::counter!("vigil_dispatch_attempts_total", "mode" => "pool").increment(1);
        let result = backoff
            .retry("send metric", |_| transport.send_one(&metric), DispatchError::is_retryable)
            .await;

        match result {
            Ok(()) => stats.delivered += 1,
            Err(e) => {
                stats.dropped += 1;
                metrics::counter!("vigil_dispatch_failures_total", "mode" => "pool", "reason" => e.reason())
                    .increment(1);
                metrics::counter!("vigil_dispatch_dropped_total").increment(1);
                warn!(worker_id, metric_id = %metric.id, error = %e, "Dropping metric");
            }
        }
    }
    stats
}
