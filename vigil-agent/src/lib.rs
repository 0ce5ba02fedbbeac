//! Vigil agent.
//!
//! Samples process and host metrics and ships them to the collector through
//! the security envelope, either as periodic snapshots or through a
//! rate-limited worker pool.

use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vigil_core::{AgentConfig, Backoff, Envelope};

pub mod dispatch;
pub mod error;
pub mod sampler;
pub mod transport;

pub use error::DispatchError;

use dispatch::{SnapshotReporter, WorkerPool};
use sampler::{default_probes, Accumulator, Sampler};
use transport::{local_origin, HttpTransport, RpcTransport, Transport};

/// Build the transport selected by `config`.
pub fn build_transport(config: &AgentConfig) -> anyhow::Result<Arc<dyn Transport>> {
    let envelope = Arc::new(Envelope::from_config(&config.key, config.crypto_key.as_deref(), None)?);
    let origin = local_origin();

    let transport: Arc<dyn Transport> = if config.use_rpc {
        Arc::new(RpcTransport::new(&config.address, envelope, origin)?)
    } else {
        Arc::new(HttpTransport::new(&config.address, envelope, origin)?)
    };
    Ok(transport)
}

/// Run the agent until `cancel` fires.
pub async fn run(config: AgentConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    config.validate()?;
    let transport = build_transport(&config)?;

    info!(
        address = %config.address,
        transport = if config.use_rpc { "rpc" } else { "http" },
        rate_limit = config.rate_limit,
        poll_interval_secs = config.poll_interval,
        report_interval_secs = config.report_interval,
        signing = !config.key.is_empty(),
        encryption = config.crypto_key.is_some(),
        "Agent starting"
    );

    if config.rate_limit == 0 {
        let accumulator = Arc::new(Accumulator::new());
        let sampler = Sampler::new(default_probes(), accumulator.clone());
        let sampling = tokio::spawn(sampler.run(config.poll_interval(), cancel.clone()));

        SnapshotReporter::new(accumulator, transport, Backoff::default())
            .run(config.report_interval(), cancel)
            .await;
        sampling.await.context("sampler task failed")?;
    } else {
        WorkerPool::new(config.rate_limit, transport, Backoff::default(), default_probes())
            .run(config.report_interval(), config.poll_interval(), cancel)
            .await;
    }

    info!("Agent stopped");
    Ok(())
}
