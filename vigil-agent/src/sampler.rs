//! Metric sampling and the agent-side accumulator.
//!
//! A [`Probe`] produces a fresh set of readings on demand. The [`Sampler`]
//! runs probes on the poll interval and merges their readings into the
//! shared [`Accumulator`], which the snapshot reporter drains.

use rand::Rng;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use sysinfo::{Pid, System};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil_core::Metric;

/// Counter incremented once per poll.
pub const POLL_COUNT: &str = "PollCount";

/// Gauge carrying a fresh random value each poll.
pub const RANDOM_VALUE: &str = "RandomValue";

/// Source of metric readings.
pub trait Probe: Send {
    /// Short name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Take a reading.
    fn sample(&mut self) -> Vec<Metric>;
}

/// Agent process statistics plus `RandomValue`.
pub struct RuntimeProbe {
    system: System,
    pid: Option<Pid>,
}

impl RuntimeProbe {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| warn!("Cannot resolve own pid, process metrics disabled: {}", e))
            .ok();
        Self { system: System::new(), pid }
    }
}

impl Default for RuntimeProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for RuntimeProbe {
    fn name(&self) -> &'static str {
        "runtime"
    }

    fn sample(&mut self) -> Vec<Metric> {
        let mut metrics = Vec::with_capacity(8);

        if let Some(pid) = self.pid {
            self.system.refresh_process(pid);
            if let Some(process) = self.system.process(pid) {
                let disk = process.disk_usage();
                metrics.push(Metric::gauge("ProcessResidentMemory", process.memory() as f64));
                metrics.push(Metric::gauge("ProcessVirtualMemory", process.virtual_memory() as f64));
                metrics.push(Metric::gauge("ProcessCPUUsage", process.cpu_usage() as f64));
                metrics.push(Metric::gauge("ProcessDiskRead", disk.total_read_bytes as f64));
                metrics.push(Metric::gauge("ProcessDiskWritten", disk.total_written_bytes as f64));
            }
        }

        metrics.push(Metric::gauge(RANDOM_VALUE, rand::thread_rng().gen::<f64>()));
        metrics
    }
}

/// Host memory and per-core CPU utilization.
pub struct HostProbe {
    system: System,
}

impl HostProbe {
    pub fn new() -> Self {
        Self { system: System::new() }
    }
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for HostProbe {
    fn name(&self) -> &'static str {
        "host"
    }

    fn sample(&mut self) -> Vec<Metric> {
        self.system.refresh_memory();
        self.system.refresh_cpu();

        let mut metrics = vec![
            Metric::gauge("TotalMemory", self.system.total_memory() as f64),
            Metric::gauge("FreeMemory", self.system.free_memory() as f64),
            Metric::gauge("UsedMemory", self.system.used_memory() as f64),
        ];
        // Cores are numbered from 1.
        for (index, cpu) in self.system.cpus().iter().enumerate() {
            metrics.push(Metric::gauge(format!("CPUutilization{}", index + 1), cpu.cpu_usage() as f64));
        }
        metrics
    }
}

/// Both probes the agent ships with.
pub fn default_probes() -> Vec<Box<dyn Probe>> {
    vec![Box::new(RuntimeProbe::new()), Box::new(HostProbe::new())]
}

#[derive(Debug, Default)]
struct Readings {
    gauges: BTreeMap<String, f64>,
    counters: BTreeMap<String, i64>,
}

/// Latest gauges and pending counter deltas, behind one lock.
#[derive(Debug, Default)]
pub struct Accumulator {
    inner: Mutex<Readings>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Readings> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Overwrite gauges and add counter deltas. Entries without a payload
    /// for their kind, and non-finite gauges, are ignored.
    pub fn merge(&self, metrics: Vec<Metric>) {
        let mut readings = self.lock();
        for metric in metrics {
            match (metric.delta, metric.value) {
                (Some(delta), _) if metric.mtype == "counter" => {
                    let pending = readings.counters.entry(metric.id).or_insert(0);
                    *pending = pending.wrapping_add(delta);
                }
                (_, Some(value)) if metric.mtype == "gauge" && value.is_finite() => {
                    readings.gauges.insert(metric.id, value);
                }
                _ => debug!(metric_id = %metric.id, "Ignoring reading without a usable payload"),
            }
        }
    }

    pub fn record_poll(&self) {
        let mut readings = self.lock();
        let pending = readings.counters.entry(POLL_COUNT.to_string()).or_insert(0);
        *pending = pending.wrapping_add(1);
    }

    /// Every gauge plus the pending counter deltas, which are reset.
    pub fn snapshot(&self) -> Vec<Metric> {
        let mut readings = self.lock();
        let counters = std::mem::take(&mut readings.counters);
        let gauges = readings.gauges.iter().map(|(id, value)| Metric::gauge(id.clone(), *value));
        gauges.chain(counters.into_iter().map(|(id, delta)| Metric::counter(id, delta))).collect()
    }

    pub fn is_empty(&self) -> bool {
        let readings = self.lock();
        readings.gauges.is_empty() && readings.counters.is_empty()
    }
}

/// Runs probes on the poll interval and feeds the accumulator.
pub struct Sampler {
    probes: Vec<Box<dyn Probe>>,
    accumulator: Arc<Accumulator>,
}

impl Sampler {
    pub fn new(probes: Vec<Box<dyn Probe>>, accumulator: Arc<Accumulator>) -> Self {
        Self { probes, accumulator }
    }

    /// Capture every probe and merge the readings.
    pub fn poll_once(&mut self) {
        for probe in &mut self.probes {
            let readings = probe.sample();
            metrics::counter!("vigil_samples_total", "source" => probe.name()).increment(1);
            self.accumulator.merge(readings);
        }
        self.accumulator.record_poll();
    }

    /// Poll until cancelled, sleeping `poll_interval` after each capture.
    pub async fn run(mut self, poll_interval: Duration, cancel: CancellationToken) {
        info!(poll_interval_secs = poll_interval.as_secs(), "Sampler started");
        loop {
            self.poll_once();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
        info!("Sampler stopped");
    }
}
