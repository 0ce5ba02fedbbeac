//! Error types for Vigil.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Vigil operations.
pub type Result<T> = std::result::Result<T, VigilError>;

/// Main error type for Vigil.
#[derive(Error, Debug)]
pub enum VigilError {
    // Lookup errors
    #[error("{kind} metric not found: {id}")]
    MetricNotFound { kind: &'static str, id: String },

    // Validation errors
    #[error("Unknown metric type: {mtype}")]
    UnknownMetricType { mtype: String },

    #[error("Metric name must not be empty")]
    EmptyMetricId,

    #[error("Missing {field} for {kind} metric {id}")]
    MissingValue { id: String, kind: &'static str, field: &'static str },

    #[error("Invalid value {value:?} for {kind} metric")]
    InvalidValue { kind: &'static str, value: String },

    #[error("Counter {id} would overflow")]
    CounterOverflow { id: String },

    #[error("Malformed payload: {reason}")]
    MalformedPayload { reason: String },

    // Integrity errors
    #[error("Missing request signature")]
    MissingSignature,

    #[error("Request signature mismatch")]
    SignatureMismatch,

    // Trust errors
    #[error("Origin {origin} is outside the trusted subnet")]
    UntrustedOrigin { origin: String },

    #[error("Origin address missing or unparsable: {origin:?}")]
    InvalidOrigin { origin: String },

    // Envelope errors
    #[error("Encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    #[error("Decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    #[error("Compression failed: {reason}")]
    CompressionFailed { reason: String },

    #[error("Failed to load key {path:?}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    // Storage errors
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Database migration failed: {reason}")]
    MigrationFailed { reason: String },

    #[error("Snapshot I/O error at {path:?}: {source}")]
    SnapshotIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VigilError {
    /// Create an Internal error from any error type.
    pub fn internal(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal(err.to_string())
    }

    /// Whether the error was caused by the request contents rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownMetricType { .. }
                | Self::EmptyMetricId
                | Self::MissingValue { .. }
                | Self::InvalidValue { .. }
                | Self::CounterOverflow { .. }
                | Self::MalformedPayload { .. }
                | Self::MissingSignature
                | Self::SignatureMismatch
                | Self::DecryptionFailed { .. }
                | Self::CompressionFailed { .. }
        )
    }

    /// Short label used for the rejection metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MetricNotFound { .. } => "not_found",
            Self::UnknownMetricType { .. }
            | Self::EmptyMetricId
            | Self::MissingValue { .. }
            | Self::InvalidValue { .. }
            | Self::CounterOverflow { .. }
            | Self::MalformedPayload { .. } => "validation",
            Self::MissingSignature | Self::SignatureMismatch => "integrity",
            Self::UntrustedOrigin { .. } | Self::InvalidOrigin { .. } => "trust",
            Self::EncryptionFailed { .. }
            | Self::DecryptionFailed { .. }
            | Self::CompressionFailed { .. }
            | Self::KeyLoadFailed { .. } => "envelope",
            Self::DatabaseError(_)
            | Self::MigrationFailed { .. }
            | Self::SnapshotIo { .. }
            | Self::Serialization(_) => "storage",
            Self::InvalidConfig { .. } => "config",
            Self::Internal(_) | Self::Other(_) => "internal",
        }
    }
}
