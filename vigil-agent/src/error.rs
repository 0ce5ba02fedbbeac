//! Dispatch error classification.

use thiserror::Error;
use vigil_core::VigilError;

/// Why a send failed.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Nothing is listening at the collector address. Retryable.
    #[error("Connection refused by {endpoint}: {reason}")]
    Refused { endpoint: String, reason: String },

    /// The collector answered with a non-success status.
    #[error("Collector rejected request ({status}): {message}")]
    Rejected { status: String, message: String },

    /// The payload could not be sealed.
    #[error("Failed to encode payload: {0}")]
    Encoding(#[from] VigilError),

    /// Malformed collector address.
    #[error("Invalid collector endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Any other transport failure (timeouts, resets, protocol errors).
    #[error("Transport error: {0}")]
    Transport(String),
}

impl DispatchError {
    /// Only refused connections are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Refused { .. })
    }

    /// Short label for the failure metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Refused { .. } => "refused",
            Self::Rejected { .. } => "rejected",
            Self::Encoding(_) => "encoding",
            Self::InvalidEndpoint { .. } => "endpoint",
            Self::Transport(_) => "transport",
        }
    }
}
