//! Transport front ends.
//!
//! HTTP ([`http`]) and RPC ([`rpc`]) share one [`AppState`] and the helpers
//! below, so both apply updates and answer reads identically.

use std::sync::Arc;
use vigil_core::{Envelope, Metric, MetricKind, MetricStore, MetricUpdate, Result, TrustedSubnet};

pub mod error;
pub mod extract;
pub mod http;
pub mod middleware;
pub mod rpc;

pub use error::ApiError;

/// Everything a request handler needs, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetricStore>,
    pub envelope: Arc<Envelope>,
    pub trusted_subnet: Option<TrustedSubnet>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn MetricStore>,
        envelope: Envelope,
        trusted_subnet: Option<TrustedSubnet>,
    ) -> Self {
        Self { store, envelope: Arc::new(envelope), trusted_subnet }
    }
}

/// Apply one validated update and return the stored result.
///
/// Counters come back with the running total this update produced in `delta`.
pub(crate) async fn apply_update(store: &dyn MetricStore, update: MetricUpdate) -> Result<Metric> {
    match update {
        MetricUpdate::Gauge { id, value } => {
            store.update_gauge(&id, value).await?;
            Ok(Metric::gauge(id, value))
        }
        MetricUpdate::Counter { id, delta } => {
            let total = store.update_counter(&id, delta).await?;
            Ok(Metric::counter(id, total))
        }
    }
}

/// Read the current value of `id`.
pub(crate) async fn read_metric(store: &dyn MetricStore, kind: MetricKind, id: &str) -> Result<Metric> {
    match kind {
        MetricKind::Gauge => Ok(Metric::gauge(id, store.get_gauge(id).await?)),
        MetricKind::Counter => Ok(Metric::counter(id, store.get_counter(id).await?)),
    }
}
