//! Configuration for the collector and the agent.
//!
//! Both structs are plain values: the binaries resolve them from flags,
//! environment and an optional JSON file, then hand them to the core.

use crate::error::{Result, VigilError};
use crate::state::StoreBackend;
use crate::trust::TrustedSubnet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Collector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, `host:port`.
    pub address: String,
    /// Snapshot period in seconds; 0 flushes after every mutation.
    pub store_interval: u64,
    #[serde(alias = "store_file")]
    pub file_storage_path: PathBuf,
    pub restore: bool,
    /// Selects the relational backend when non-empty.
    pub database_dsn: String,
    /// Shared HMAC secret; empty disables signing.
    pub key: String,
    /// Private key PEM used to decrypt request bodies.
    pub crypto_key: Option<PathBuf>,
    /// CIDR that request origins must fall within.
    pub trusted_subnet: String,
    pub use_rpc: bool,
    /// Prometheus exporter address; unset disables the exporter.
    pub metrics_addr: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            store_interval: 300,
            file_storage_path: PathBuf::from("./metrics.json"),
            restore: true,
            database_dsn: String::new(),
            key: String::new(),
            crypto_key: None,
            trusted_subnet: String::new(),
            use_rpc: false,
            metrics_addr: None,
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path.as_ref())
    }

    pub fn store_interval(&self) -> Duration {
        Duration::from_secs(self.store_interval)
    }

    /// Periodic snapshots run only for the in-memory backend with a non-zero interval.
    pub fn periodic_snapshots(&self) -> bool {
        self.database_dsn.is_empty() && self.store_interval > 0
    }

    pub fn store_backend(&self) -> StoreBackend {
        if !self.database_dsn.is_empty() {
            return StoreBackend::Relational { dsn: self.database_dsn.clone() };
        }
        let snapshot_path = (!self.file_storage_path.as_os_str().is_empty())
            .then(|| self.file_storage_path.clone());
        StoreBackend::Memory {
            snapshot_path,
            restore: self.restore,
            sync_flush: self.store_interval == 0,
        }
    }

    pub fn trusted_subnet(&self) -> Result<Option<TrustedSubnet>> {
        TrustedSubnet::parse_optional(&self.trusted_subnet)
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            return Err(invalid("address must not be empty"));
        }
        self.trusted_subnet()?;
        if let Some(path) = &self.crypto_key {
            require_file(path)?;
        }
        Ok(())
    }
}

/// Agent configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Collector address, `host:port`.
    pub address: String,
    /// Seconds between reports.
    pub report_interval: u64,
    /// Seconds between samples.
    pub poll_interval: u64,
    pub key: String,
    /// Number of concurrent senders; 0 sends whole snapshots instead.
    pub rate_limit: usize,
    /// Public key PEM used to encrypt request bodies.
    pub crypto_key: Option<PathBuf>,
    pub use_rpc: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            report_interval: 10,
            poll_interval: 2,
            key: String::new(),
            rate_limit: 0,
            crypto_key: None,
            use_rpc: false,
        }
    }
}

impl AgentConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path.as_ref())
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            return Err(invalid("address must not be empty"));
        }
        if self.report_interval == 0 {
            return Err(invalid("report interval must be positive"));
        }
        if self.poll_interval == 0 {
            return Err(invalid("poll interval must be positive"));
        }
        if let Some(path) = &self.crypto_key {
            require_file(path)?;
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> VigilError {
    VigilError::InvalidConfig { reason: reason.to_string() }
}

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(VigilError::InvalidConfig { reason: format!("key file not found: {}", path.display()) })
    }
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| VigilError::InvalidConfig {
        reason: format!("Failed to read config {}: {}", path.display(), e),
    })?;
    serde_json::from_str(&content).map_err(|e| VigilError::InvalidConfig {
        reason: format!("Failed to parse config {}: {}", path.display(), e),
    })
}
