use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use vigil_core::build_info::BuildInfo;
use vigil_core::{init_observability, shutdown_signal, AgentConfig};

/// Vigil metrics agent.
#[derive(Parser, Debug)]
#[command(name = "vigil-agent", version, about, long_about = None)]
struct Args {
    /// Collector address (host:port)
    #[arg(short = 'a', long, env = "ADDRESS")]
    address: Option<String>,

    /// Seconds between reports
    #[arg(short = 'r', long, env = "REPORT_INTERVAL")]
    report_interval: Option<u64>,

    /// Seconds between samples
    #[arg(short = 'p', long, env = "POLL_INTERVAL")]
    poll_interval: Option<u64>,

    /// Shared HMAC secret
    #[arg(short = 'k', long, env = "KEY", hide_env_values = true)]
    key: Option<String>,

    /// Concurrent senders; 0 sends whole snapshots
    #[arg(short = 'l', long, env = "RATE_LIMIT")]
    rate_limit: Option<usize>,

    /// Public key PEM for payload encryption
    #[arg(long, env = "CRYPTO_KEY")]
    crypto_key: Option<PathBuf>,

    /// Send over RPC instead of HTTP
    #[arg(long, env = "USE_RPC")]
    use_rpc: Option<bool>,

    /// JSON configuration file; flags and environment take precedence
    #[arg(short = 'c', long, env = "CONFIG")]
    config: Option<PathBuf>,
}

impl Args {
    fn resolve(self) -> Result<AgentConfig> {
        let mut config = match &self.config {
            Some(path) => AgentConfig::from_file(path)?,
            None => AgentConfig::default(),
        };

        if let Some(v) = self.address {
            config.address = v;
        }
        if let Some(v) = self.report_interval {
            config.report_interval = v;
        }
        if let Some(v) = self.poll_interval {
            config.poll_interval = v;
        }
        if let Some(v) = self.key {
            config.key = v;
        }
        if let Some(v) = self.rate_limit {
            config.rate_limit = v;
        }
        if let Some(v) = self.crypto_key {
            config.crypto_key = Some(v);
        }
        if let Some(v) = self.use_rpc {
            config.use_rpc = v;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("{}", BuildInfo::current());

    let config = Args::parse().resolve()?;
    init_observability("vigil-agent", None)?;

    info!("Vigil agent starting");
    vigil_agent::run(config, shutdown_signal()).await
}
