//! RPC front end.
//!
//! Mirrors the HTTP update endpoints. The origin check runs in an
//! interceptor; the signature is carried in `hashsha256` metadata and covers
//! the protobuf encoding of the request message. When payload encryption is
//! on, the metric(s) travel as encrypted JSON in the `sealed` field.

use prost::Message;
use serde::de::DeserializeOwned;
use tonic::service::interceptor::InterceptedService;
use tonic::{Request, Response, Status};
use tracing::{debug, instrument};
use vigil_api::vigil::v1::metrics_service_server::{MetricsService, MetricsServiceServer};
use vigil_api::vigil::v1::{
    UpdateMetricRequest, UpdateMetricResponse, UpdateMetricsRequest, UpdateMetricsResponse,
};
use vigil_core::observability::metrics::record_request;
use vigil_core::{Metric, MetricUpdate, TrustedSubnet, VigilError, HASH_METADATA, REAL_IP_METADATA};

use super::{apply_update, ApiError, AppState};

pub struct MetricsServiceImpl {
    state: AppState,
}

impl MetricsServiceImpl {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    fn verify<M: Message>(&self, request: &Request<M>) -> Result<(), ApiError> {
        if !self.state.envelope.signer().is_enabled() {
            return Ok(());
        }
        let signature =
            request.metadata().get(HASH_METADATA).and_then(|v| v.to_str().ok());
        self.state.envelope.verify(&request.get_ref().encode_to_vec(), signature)?;
        Ok(())
    }

    /// With a private key configured only encrypted payloads are accepted,
    /// as on the HTTP side.
    fn require_sealed(&self, sealed: &[u8]) -> Result<(), ApiError> {
        if sealed.is_empty() && self.state.envelope.decrypts() {
            return Err(ApiError(VigilError::DecryptionFailed {
                reason: "plaintext payload refused, encryption is required".to_string(),
            }));
        }
        Ok(())
    }

    fn unseal<T: DeserializeOwned>(&self, sealed: &[u8]) -> Result<T, ApiError> {
        let plain = self.state.envelope.decrypt(sealed.to_vec())?;
        serde_json::from_slice(&plain)
            .map_err(|e| ApiError(VigilError::MalformedPayload { reason: e.to_string() }))
    }
}

/// Origin check shared by every RPC.
#[derive(Clone)]
pub struct OriginInterceptor {
    subnet: Option<TrustedSubnet>,
}

impl tonic::service::Interceptor for OriginInterceptor {
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        if let Some(subnet) = &self.subnet {
            let origin = request.metadata().get(REAL_IP_METADATA).and_then(|v| v.to_str().ok());
            subnet.check(origin).map_err(ApiError)?;
        }
        Ok(request)
    }
}

/// Wrap the service with its origin interceptor.
pub fn service(
    state: AppState,
) -> InterceptedService<MetricsServiceServer<MetricsServiceImpl>, OriginInterceptor> {
    let interceptor = OriginInterceptor { subnet: state.trusted_subnet };
    MetricsServiceServer::with_interceptor(MetricsServiceImpl::new(state), interceptor)
}

#[tonic::async_trait]
impl MetricsService for MetricsServiceImpl {
    #[instrument(skip(self, request))]
    async fn update_metric(
        &self,
        request: Request<UpdateMetricRequest>,
    ) -> Result<Response<UpdateMetricResponse>, Status> {
        record_request("rpc", "update");
        self.verify(&request)?;

        let req = request.into_inner();
        self.require_sealed(&req.sealed)?;
        let metric: Metric = if req.sealed.is_empty() {
            req.metric
                .map(Metric::from)
                .ok_or_else(|| Status::invalid_argument("metric is required"))?
        } else {
            self.unseal(&req.sealed)?
        };

        let update = MetricUpdate::try_from(&metric).map_err(ApiError)?;
        let stored = apply_update(self.state.store.as_ref(), update).await.map_err(ApiError)?;
        debug!(metric_id = %stored.id, "Metric updated");

        Ok(Response::new(UpdateMetricResponse { metric: Some(stored.into()) }))
    }

    #[instrument(skip(self, request))]
    async fn update_metrics(
        &self,
        request: Request<UpdateMetricsRequest>,
    ) -> Result<Response<UpdateMetricsResponse>, Status> {
        record_request("rpc", "updates");
        self.verify(&request)?;

        let req = request.into_inner();
        self.require_sealed(&req.sealed)?;
        let metrics: Vec<Metric> = if req.sealed.is_empty() {
            req.metrics.into_iter().map(Metric::from).collect()
        } else {
            self.unseal(&req.sealed)?
        };

        self.state.store.update_batch(&metrics).await.map_err(ApiError)?;
        metrics::counter!("vigil_metrics_applied_total").increment(metrics.len() as u64);
        debug!(batch_size = metrics.len(), "Batch applied");

        Ok(Response::new(UpdateMetricsResponse { success: true }))
    }
}
