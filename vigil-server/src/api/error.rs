//! Mapping of core errors onto HTTP statuses and RPC codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};
use vigil_core::observability::metrics::record_rejection;
use vigil_core::VigilError;

/// A request-scoped failure.
#[derive(Debug)]
pub struct ApiError(pub VigilError);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            VigilError::MetricNotFound { .. } => StatusCode::NOT_FOUND,
            VigilError::UntrustedOrigin { .. } | VigilError::InvalidOrigin { .. } => {
                StatusCode::FORBIDDEN
            }
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn log(&self, transport: &'static str) {
        let reason = self.0.reason();
        record_rejection(transport, reason);
        if self.0.is_client_error() || matches!(reason, "not_found" | "trust") {
            warn!(transport, reason, error = %self.0, "Request rejected");
        } else {
            error!(transport, reason, error = %self.0, "Request failed");
        }
    }
}

impl From<VigilError> for ApiError {
    fn from(err: VigilError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log("http");
        let status = self.status_code();
        // Server-side details stay in the logs.
        let body = if status.is_server_error() {
            "internal server error".to_string()
        } else {
            self.0.to_string()
        };
        (status, body).into_response()
    }
}

impl From<ApiError> for tonic::Status {
    fn from(err: ApiError) -> Self {
        err.log("rpc");
        let message = err.0.to_string();
        match err.0 {
            VigilError::MetricNotFound { .. } => tonic::Status::not_found(message),
            VigilError::MissingSignature | VigilError::SignatureMismatch => {
                tonic::Status::unauthenticated(message)
            }
            VigilError::UntrustedOrigin { .. } | VigilError::InvalidOrigin { .. } => {
                tonic::Status::permission_denied(message)
            }
            e if e.is_client_error() => tonic::Status::invalid_argument(message),
            _ => tonic::Status::internal("internal server error"),
        }
    }
}
