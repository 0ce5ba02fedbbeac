//! HTTP transport (reqwest).

use async_trait::async_trait;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use vigil_core::{Envelope, Metric, HASH_HEADER, REAL_IP_HEADER};

use super::Transport;
use crate::error::DispatchError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts JSON to `/update/` and `/updates/`.
///
/// Bodies are encrypted when a public key is configured, always gzip
/// compressed, and signed over the compressed bytes.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    envelope: Arc<Envelope>,
    origin: Option<IpAddr>,
}

impl HttpTransport {
    /// `address` is `host:port`; a scheme may be given explicitly.
    pub fn new(
        address: &str,
        envelope: Arc<Envelope>,
        origin: Option<IpAddr>,
    ) -> Result<Self, DispatchError> {
        let base_url = if address.contains("://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", address.trim_end_matches('/'))
        };
        reqwest::Url::parse(&base_url).map_err(|e| DispatchError::InvalidEndpoint {
            endpoint: base_url.clone(),
            reason: e.to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        Ok(Self { client, base_url, envelope, origin })
    }

    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    async fn post(&self, path: &str, payload: Vec<u8>) -> Result<(), DispatchError> {
        let sealed = self.envelope.seal(payload, true)?;
        let url = format!("{}{}", self.base_url, path);

        // reqwest advertises and undoes gzip on responses itself.
        let mut request = self.client.post(&url).header(CONTENT_TYPE, "application/json");
        if sealed.compressed {
            request = request.header(CONTENT_ENCODING, "gzip");
        }
        if let Some(signature) = &sealed.signature {
            request = request.header(HASH_HEADER, signature);
        }
        if let Some(origin) = self.origin {
            request = request.header(REAL_IP_HEADER, origin.to_string());
        }

        let response = request.body(sealed.body).send().await.map_err(|e| classify(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected { status: status.to_string(), message });
        }
        debug!(%status, "Delivered");
        Ok(())
    }
}

fn classify(url: &str, err: reqwest::Error) -> DispatchError {
    if err.is_connect() {
        DispatchError::Refused { endpoint: url.to_string(), reason: err.to_string() }
    } else if err.is_builder() {
        DispatchError::InvalidEndpoint { endpoint: url.to_string(), reason: err.to_string() }
    } else {
        DispatchError::Transport(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_batch(&self, metrics: &[Metric]) -> Result<(), DispatchError> {
        let payload = serde_json::to_vec(metrics).map_err(vigil_core::VigilError::from)?;
        self.post("/updates/", payload).await
    }

    async fn send_one(&self, metric: &Metric) -> Result<(), DispatchError> {
        let payload = serde_json::to_vec(metric).map_err(vigil_core::VigilError::from)?;
        self.post("/update/", payload).await
    }
}
