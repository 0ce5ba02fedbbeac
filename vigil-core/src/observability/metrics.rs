//! Core metrics definitions.
//!
//! All metrics follow Prometheus naming conventions:
//! - `_total` suffix for counters
//! - `_seconds` suffix for histograms measuring duration

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Register all core metrics with descriptions.
pub fn register_core_metrics() {
    // Collector
    describe_counter!(
        "vigil_requests_total",
        "Accepted update/read requests (by transport, endpoint)"
    );
    describe_counter!(
        "vigil_requests_rejected_total",
        "Rejected requests (by transport, reason)"
    );
    describe_counter!("vigil_metrics_applied_total", "Metric updates applied to the store");

    // Storage
    describe_counter!("vigil_db_errors_total", "Relational store failures (by operation)");
    describe_counter!("vigil_snapshot_flushes_total", "Snapshot flushes (by trigger)");
    describe_counter!("vigil_snapshot_errors_total", "Snapshot write failures");
    describe_histogram!("vigil_snapshot_duration_seconds", "Time taken to write a snapshot");

    // Agent
    describe_counter!("vigil_dispatch_attempts_total", "Send attempts (by mode)");
    describe_counter!("vigil_dispatch_failures_total", "Failed sends (by mode, reason)");
    describe_counter!("vigil_dispatch_dropped_total", "Metrics dropped after exhausting retries");
    describe_counter!("vigil_samples_total", "Sampler iterations (by source)");
}

pub fn record_rejection(transport: &'static str, reason: &'static str) {
    counter!("vigil_requests_rejected_total", "transport" => transport, "reason" => reason)
        .increment(1);
}

pub fn record_request(transport: &'static str, endpoint: &'static str) {
    counter!("vigil_requests_total", "transport" => transport, "endpoint" => endpoint)
        .increment(1);
}

pub fn record_flush(trigger: &'static str, duration_secs: f64) {
    counter!("vigil_snapshot_flushes_total", "trigger" => trigger).increment(1);
    histogram!("vigil_snapshot_duration_seconds").record(duration_secs);
}
