//! Vigil collector.
//!
//! Accepts metric updates over HTTP or RPC, unwraps the security envelope,
//! applies them to the configured store, and persists state on a timer and
//! at shutdown.

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vigil_core::{state, Envelope, ServerConfig};

pub mod api;
pub mod shutdown;
pub mod snapshot;

pub use api::AppState;

/// Serve the HTTP front end until `cancel` fires and in-flight requests finish.
pub async fn serve_http(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    axum::serve(listener, api::http::router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .context("HTTP server error")
}

/// Serve the RPC front end until `cancel` fires and in-flight calls finish.
pub async fn serve_rpc(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    tonic::transport::Server::builder()
        .add_service(api::rpc::service(state))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), cancel.cancelled_owned())
        .await
        .context("RPC server error")
}

/// Build every component from `config` and run until shutdown.
///
/// Returns an error for anything that prevents serving: bad configuration,
/// unreadable key, unreachable database, or a listener that cannot bind.
pub async fn run(config: ServerConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    config.validate()?;
    let trusted_subnet = config.trusted_subnet()?;
    let envelope = Envelope::from_config(&config.key, None, config.crypto_key.as_deref())?;
    let store = state::open(&config.store_backend()).await.context("failed to open metric store")?;

    let snapshotter = config.periodic_snapshots().then(|| {
        snapshot::spawn(store.clone(), config.store_interval(), cancel.child_token())
    });

    let listener = TcpListener::bind(&config.address)
        .await
        .with_context(|| format!("failed to bind {}", config.address))?;
    info!(
        address = %listener.local_addr()?,
        transport = if config.use_rpc { "rpc" } else { "http" },
        backend = store.backend(),
        signing = !config.key.is_empty(),
        encryption = config.crypto_key.is_some(),
        trusted_subnet = ?trusted_subnet.map(|s| s.to_string()),
        "Collector listening"
    );

    let app = AppState::new(store.clone(), envelope, trusted_subnet);
    let outcome = if config.use_rpc {
        let server = serve_rpc(listener, app, cancel.clone());
        shutdown::run_until_shutdown(server, store, cancel, shutdown::GRACE_PERIOD).await
    } else {
        let server = serve_http(listener, app, cancel.clone());
        shutdown::run_until_shutdown(server, store, cancel, shutdown::GRACE_PERIOD).await
    };

    if let Some(handle) = snapshotter {
        let _ = handle.await;
    }
    info!("Collector stopped");
    outcome
}
