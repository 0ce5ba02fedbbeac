use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use vigil_core::build_info::BuildInfo;
use vigil_core::{init_observability, shutdown_signal, ServerConfig};

/// Vigil metrics collector.
#[derive(Parser, Debug)]
#[command(name = "vigil-server", version, about, long_about = None)]
struct Args {
    /// Listen address (host:port)
    #[arg(short = 'a', long, env = "ADDRESS")]
    address: Option<String>,

    /// Snapshot interval in seconds; 0 writes after every update
    #[arg(short = 'i', long, env = "STORE_INTERVAL")]
    store_interval: Option<u64>,

    /// Snapshot file path
    #[arg(short = 'f', long, env = "FILE_STORAGE_PATH")]
    file_storage_path: Option<PathBuf>,

    /// Restore state from the snapshot file at startup
    #[arg(short = 'r', long, env = "RESTORE")]
    restore: Option<bool>,

    /// Database DSN; selects the relational store
    #[arg(short = 'd', long, env = "DATABASE_DSN")]
    database_dsn: Option<String>,

    /// Shared HMAC secret
    #[arg(short = 'k', long, env = "KEY", hide_env_values = true)]
    key: Option<String>,

    /// Private key PEM for payload decryption
    #[arg(long, env = "CRYPTO_KEY")]
    crypto_key: Option<PathBuf>,

    /// Trusted origin subnet (CIDR)
    #[arg(short = 't', long, env = "TRUSTED_SUBNET")]
    trusted_subnet: Option<String>,

    /// Serve RPC instead of HTTP
    #[arg(long, env = "USE_RPC")]
    use_rpc: Option<bool>,

    /// Prometheus exporter address
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// JSON configuration file; flags and environment take precedence
    #[arg(short = 'c', long, env = "CONFIG")]
    config: Option<PathBuf>,
}

impl Args {
    fn resolve(self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(v) = self.address {
            config.address = v;
        }
        if let Some(v) = self.store_interval {
            config.store_interval = v;
        }
        if let Some(v) = self.file_storage_path {
            config.file_storage_path = v;
        }
        if let Some(v) = self.restore {
            config.restore = v;
        }
        if let Some(v) = self.database_dsn {
            config.database_dsn = v;
        }
        if let Some(v) = self.key {
            config.key = v;
        }
        if let Some(v) = self.crypto_key {
            config.crypto_key = Some(v);
        }
        if let Some(v) = self.trusted_subnet {
            config.trusted_subnet = v;
        }
        if let Some(v) = self.use_rpc {
            config.use_rpc = v;
        }
        if let Some(v) = self.metrics_addr {
            config.metrics_addr = Some(v.to_string());
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("{}", BuildInfo::current());

    let config = Args::parse().resolve()?;
    let metrics_addr = config.metrics_addr.as_deref().map(str::parse::<SocketAddr>).transpose()?;
    init_observability("vigil-server", metrics_addr)?;

    info!("Vigil collector starting");
    vigil_server::run(config, shutdown_signal()).await
}
