//! End-to-end tests: agent transports against a collector on an ephemeral port.
//!
//! Each test starts its own collector with an in-memory store, then drives
//! the agent side through the same envelope configuration the binaries use.

use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use vigil_agent::dispatch::SnapshotReporter;
use vigil_agent::sampler::{Accumulator, POLL_COUNT};
use vigil_agent::transport::{HttpTransport, RpcTransport, Transport};
use vigil_agent::DispatchError;
use vigil_core::state::MemoryStore;
use vigil_core::{Backoff, Envelope, Metric, MetricStore};
use vigil_server::AppState;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

struct Keys {
    _dir: tempfile::TempDir,
    public: PathBuf,
    private: PathBuf,
}

fn keys() -> Keys {
    let key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let public = dir.path().join("public.pem");
    let private = dir.path().join("private.pem");
    std::fs::write(&private, key.to_pkcs1_pem(LineEnding::LF).unwrap().as_bytes()).unwrap();
    std::fs::write(&public, RsaPublicKey::from(&key).to_pkcs1_pem(LineEnding::LF).unwrap())
        .unwrap();
    Keys { _dir: dir, public, private }
}

struct Collector {
    store: Arc<dyn MetricStore>,
    address: String,
    cancel: CancellationToken,
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn collector(envelope: Envelope, subnet: Option<&str>, rpc: bool) -> Collector {
    let store: Arc<dyn MetricStore> = Arc::new(MemoryStore::new(None));
    let state = AppState::new(store.clone(), envelope, subnet.map(|s| s.parse().unwrap()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let cancel = CancellationToken::new();

    if rpc {
        tokio::spawn(vigil_server::serve_rpc(listener, state, cancel.clone()));
    } else {
        tokio::spawn(vigil_server::serve_http(listener, state, cancel.clone()));
    }
    Collector { store, address, cancel }
}

#[tokio::test]
async fn test_http_batches_accumulate_counters() {
    let server = collector(Envelope::default(), None, false).await;
    let agent = HttpTransport::new(&server.address, Arc::new(Envelope::default()), None).unwrap();

    agent.send_batch(&[Metric::counter("Requests", 5)]).await.unwrap();
    agent.send_batch(&[Metric::counter("Requests", 3)]).await.unwrap();
    agent.send_one(&Metric::gauge("CPU", 0.91)).await.unwrap();

    assert_eq!(server.store.get_counter("Requests").await.unwrap(), 8);
    assert_eq!(server.store.get_gauge("CPU").await.unwrap(), 0.91);
}

#[tokio::test]
async fn test_http_full_envelope() {
    let keys = keys();
    let server_envelope = Envelope::from_config("secret", None, Some(&keys.private)).unwrap();
    let agent_envelope = Envelope::from_config("secret", Some(&keys.public), None).unwrap();

    let server = collector(server_envelope, Some("127.0.0.0/8"), false).await;
    let agent =
        HttpTransport::new(&server.address, Arc::new(agent_envelope), Some(LOCALHOST)).unwrap();

    let batch: Vec<Metric> =
        (1..=16).map(|core| Metric::gauge(format!("CPUutilization{core}"), 3.5)).collect();
    agent.send_batch(&batch).await.unwrap();
    agent.send_one(&Metric::counter(POLL_COUNT, 1)).await.unwrap();

    assert_eq!(server.store.list_gauges().await.unwrap().len(), 16);
    assert_eq!(server.store.get_counter(POLL_COUNT).await.unwrap(), 1);
}

#[tokio::test]
async fn test_http_wrong_secret_rejected_without_retry() {
    let server = collector(Envelope::from_config("server", None, None).unwrap(), None, false).await;
    let agent_envelope = Envelope::from_config("agent", None, None).unwrap();
    let agent = HttpTransport::new(&server.address, Arc::new(agent_envelope), None).unwrap();

    let err = agent.send_batch(&[Metric::counter("Requests", 1)]).await.unwrap_err();
    assert!(matches!(err, DispatchError::Rejected { .. }), "{err}");
    assert!(!err.is_retryable());
    assert!(server.store.list_counters().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_http_untrusted_origin_rejected() {
    let server = collector(Envelope::default(), Some("10.20.0.0/16"), false).await;
    let agent = HttpTransport::new(&server.address, Arc::new(Envelope::default()), Some(LOCALHOST))
        .unwrap();

    let err = agent.send_one(&Metric::gauge("Load", 1.0)).await.unwrap_err();
    match err {
        DispatchError::Rejected { status, .. } => assert!(status.starts_with("403"), "{status}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_refused_connection_is_retryable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let http = HttpTransport::new(&address, Arc::new(Envelope::default()), None).unwrap();
    let err = http.send_batch(&[Metric::counter("Requests", 1)]).await.unwrap_err();
    assert!(matches!(err, DispatchError::Refused { .. }), "{err}");

    let rpc = RpcTransport::new(&address, Arc::new(Envelope::default()), None).unwrap();
    let err = rpc.send_batch(&[Metric::counter("Requests", 1)]).await.unwrap_err();
    assert!(matches!(err, DispatchError::Refused { .. }), "{err}");
}

#[tokio::test]
async fn test_rpc_full_envelope() {
    let keys = keys();
    let server_envelope = Envelope::from_config("secret", None, Some(&keys.private)).unwrap();
    let agent_envelope = Envelope::from_config("secret", Some(&keys.public), None).unwrap();

    let server = collector(server_envelope, Some("127.0.0.0/8"), true).await;
    let agent =
        RpcTransport::new(&server.address, Arc::new(agent_envelope), Some(LOCALHOST)).unwrap();

    agent.send_batch(&[Metric::counter("Requests", 5), Metric::gauge("Load", 0.25)]).await.unwrap();
    agent.send_one(&Metric::counter("Requests", 3)).await.unwrap();

    assert_eq!(server.store.get_counter("Requests").await.unwrap(), 8);
    assert_eq!(server.store.get_gauge("Load").await.unwrap(), 0.25);
}

#[tokio::test]
async fn test_rpc_plaintext_refused_when_collector_decrypts() {
    let keys = keys();
    let server_envelope = Envelope::from_config("", None, Some(&keys.private)).unwrap();
    let server = collector(server_envelope, None, true).await;
    let agent = RpcTransport::new(&server.address, Arc::new(Envelope::default()), None).unwrap();

    let err = agent.send_batch(&[Metric::counter("Requests", 1)]).await.unwrap_err();
    assert!(matches!(err, DispatchError::Rejected { .. }), "{err}");
    let err = agent.send_one(&Metric::gauge("Load", 1.0)).await.unwrap_err();
    assert!(matches!(err, DispatchError::Rejected { .. }), "{err}");

    assert!(server.store.list_counters().await.unwrap().is_empty());
    assert!(server.store.list_gauges().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rpc_wrong_secret_rejected() {
    let server = collector(Envelope::from_config("server", None, None).unwrap(), None, true).await;
    let agent_envelope = Envelope::from_config("agent", None, None).unwrap();
    let agent = RpcTransport::new(&server.address, Arc::new(agent_envelope), None).unwrap();

    let err = agent.send_one(&Metric::gauge("Load", 1.0)).await.unwrap_err();
    assert!(matches!(err, DispatchError::Rejected { .. }), "{err}");
}

#[tokio::test]
async fn test_snapshot_reporter_against_collector() {
    let server = collector(Envelope::default(), None, false).await;
    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::new(&server.address, Arc::new(Envelope::default()), None).unwrap());

    let accumulator = Arc::new(Accumulator::new());
    let reporter = SnapshotReporter::new(accumulator.clone(), transport, Backoff::default());

    for _ in 0..3 {
        accumulator.merge(vec![Metric::gauge("Load", 0.5)]);
        accumulator.record_poll();
        reporter.report_once().await.unwrap();
    }

    // Deltas are drained per report, so the collector sees each poll once.
    assert_eq!(server.store.get_counter(POLL_COUNT).await.unwrap(), 3);
    assert_eq!(server.store.get_gauge("Load").await.unwrap(), 0.5);
}
