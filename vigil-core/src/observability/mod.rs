//! Observability infrastructure: structured logging and process metrics.
//!
//! Both binaries call [`init`] once at startup. Library code only emits
//! through `tracing` and the `metrics` facade.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Result, VigilError};

pub mod metrics;

/// Install the tracing subscriber and, when `metrics_addr` is set, the
/// Prometheus exporter.
///
/// The log filter defaults to `info` and can be overridden with `RUST_LOG`.
pub fn init(service: &'static str, metrics_addr: Option<SocketAddr>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true))
        .try_init()
        .map_err(|e| VigilError::Internal(format!("tracing already initialized: {e}")))?;

    if let Some(addr) = metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .map_err(|e| VigilError::Internal(format!("metrics exporter: {e}")))?;
        tracing::info!(service, %addr, "Prometheus exporter listening");
    }

    metrics::register_core_metrics();
    tracing::info!(service, version = env!("CARGO_PKG_VERSION"), "Observability initialized");
    Ok(())
}
