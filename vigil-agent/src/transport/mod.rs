//! Wire transports to the collector.

use async_trait::async_trait;
use std::net::IpAddr;
use vigil_core::Metric;

use crate::error::DispatchError;

mod http;
mod rpc;

pub use http::HttpTransport;
pub use rpc::RpcTransport;

/// Sends sealed metrics to the collector.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a whole batch in one request.
    async fn send_batch(&self, metrics: &[Metric]) -> Result<(), DispatchError>;

    /// Send a single metric in its own request.
    async fn send_one(&self, metric: &Metric) -> Result<(), DispatchError>;
}

/// Outbound address of this host, declared to the collector as the origin.
pub fn local_origin() -> Option<IpAddr> {
    match local_ip_address::local_ip() {
        Ok(ip) => Some(ip),
        Err(e) => {
            tracing::warn!("Cannot determine local IP, origin header disabled: {}", e);
            None
        }
    }
}
