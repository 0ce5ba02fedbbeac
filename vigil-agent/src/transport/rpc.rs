//! RPC transport (tonic).

use async_trait::async_trait;
use prost::Message;
use std::net::IpAddr;
use std::sync::Arc;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Request, Status};
use tracing::debug;
use vigil_api::vigil::v1::metrics_service_client::MetricsServiceClient;
use vigil_api::vigil::v1::{UpdateMetricRequest, UpdateMetricsRequest};
use vigil_core::{Envelope, Metric, VigilError, HASH_METADATA, REAL_IP_METADATA};

use super::Transport;
use crate::error::DispatchError;

/// Calls `UpdateMetric` / `UpdateMetrics`.
///
/// With a public key configured the metric(s) travel as encrypted JSON in
/// the `sealed` field. The signature covers the encoded request message.
pub struct RpcTransport {
    client: MetricsServiceClient<Channel>,
    endpoint: String,
    envelope: Arc<Envelope>,
    origin: Option<IpAddr>,
}

impl RpcTransport {
    /// The channel connects lazily, so a collector that is not up yet
    /// surfaces as a refused send rather than a startup failure.
    pub fn new(
        address: &str,
        envelope: Arc<Envelope>,
        origin: Option<IpAddr>,
    ) -> Result<Self, DispatchError> {
        let endpoint = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };
        let channel = Endpoint::from_shared(endpoint.clone())
            .map_err(|e| DispatchError::InvalidEndpoint {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?
            .connect_lazy();

        Ok(Self { client: MetricsServiceClient::new(channel), endpoint, envelope, origin })
    }

    fn request<M: Message>(&self, message: M) -> Result<Request<M>, DispatchError> {
        let signature = self.envelope.signer().sign(&message.encode_to_vec());
        let mut request = Request::new(message);

        if let Some(signature) = signature {
            let value = MetadataValue::try_from(signature.as_str()).map_err(VigilError::internal)?;
            request.metadata_mut().insert(HASH_METADATA, value);
        }
        if let Some(origin) = self.origin {
            let value =
                MetadataValue::try_from(origin.to_string().as_str()).map_err(VigilError::internal)?;
            request.metadata_mut().insert(REAL_IP_METADATA, value);
        }
        Ok(request)
    }

    fn classify(&self, status: Status) -> DispatchError {
        match status.code() {
            Code::Unavailable => DispatchError::Refused {
                endpoint: self.endpoint.clone(),
                reason: status.message().to_string(),
            },
            code => DispatchError::Rejected {
                status: format!("{:?}", code),
                message: status.message().to_string(),
            },
        }
    }

    fn seal<T: serde::Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, DispatchError> {
        let json = serde_json::to_vec(value).map_err(VigilError::from)?;
        Ok(self.envelope.encrypt(json)?)
    }
}

#[async_trait]
impl Transport for RpcTransport {
    async fn send_batch(&self, metrics: &[Metric]) -> Result<(), DispatchError> {
        let message = if self.envelope.encrypts() {
            UpdateMetricsRequest { metrics: Vec::new(), sealed: self.seal(metrics)? }
        } else {
            UpdateMetricsRequest { metrics: metrics.iter().map(Into::into).collect(), sealed: Vec::new() }
        };

        let request = self.request(message)?;
        self.client.clone().update_metrics(request).await.map_err(|s| self.classify(s))?;
        debug!(batch_size = metrics.len(), "Delivered over RPC");
        Ok(())
    }

    async fn send_one(&self, metric: &Metric) -> Result<(), DispatchError> {
        let message = if self.envelope.encrypts() {
            UpdateMetricRequest { metric: None, sealed: self.seal(metric)? }
        } else {
            UpdateMetricRequest { metric: Some(metric.into()), sealed: Vec::new() }
        };

        let request = self.request(message)?;
        self.client.clone().update_metric(request).await.map_err(|s| self.classify(s))?;
        Ok(())
    }
}
