//! Vigil Core Library
//!
//! Shared types and machinery for the Vigil telemetry agent and collector:
//! the metric model, the security envelope, the storage engine and the
//! ambient configuration/observability plumbing.

pub mod build_info;
pub mod config;
pub mod error;
pub mod observability;
pub mod proto_convert;
pub mod retry;
pub mod security;
pub mod shutdown;
pub mod state;
pub mod trust;
pub mod types;

// Re-export commonly used items
pub use config::{AgentConfig, ServerConfig};
pub use error::{Result, VigilError};
pub use observability::init as init_observability;
pub use retry::Backoff;
pub use security::{Envelope, Signer, HASH_HEADER, HASH_METADATA};
pub use shutdown::shutdown_signal;
pub use state::{MetricStore, StoreBackend};
pub use trust::{TrustedSubnet, REAL_IP_HEADER, REAL_IP_METADATA};
pub use types::{Metric, MetricKind, MetricUpdate};
