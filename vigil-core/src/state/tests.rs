#[cfg(test)]
mod tests {
    use crate::error::VigilError;
    use crate::state::{open, MemoryStore, MetricStore, SqliteStore, StoreBackend};
    use crate::types::Metric;
    use std::sync::Arc;

    async fn backends() -> Vec<Arc<dyn MetricStore>> {
        vec![
            Arc::new(MemoryStore::new(None)),
            Arc::new(SqliteStore::new_in_memory().await.unwrap()),
        ]
    }

    #[tokio::test]
    async fn test_counter_accumulates() {
        for store in backends().await {
            store.update_counter("Requests", 5).await.unwrap();
            store.update_counter("Requests", 3).await.unwrap();
            assert_eq!(store.get_counter("Requests").await.unwrap(), 8, "{}", store.backend());
        }
    }

    #[tokio::test]
    async fn test_gauge_last_write_wins() {
        for store in backends().await {
            store.update_gauge("Load", 0.42).await.unwrap();
            store.update_gauge("Load", 0.91).await.unwrap();
            assert_eq!(store.get_gauge("Load").await.unwrap(), 0.91, "{}", store.backend());
        }
    }

    #[tokio::test]
    async fn test_missing_metric_is_not_found() {
        for store in backends().await {
            let err = store.get_gauge("nope").await.unwrap_err();
            assert!(matches!(err, VigilError::MetricNotFound { kind: "gauge", .. }));

            let err = store.get_counter("nope").await.unwrap_err();
            assert!(matches!(err, VigilError::MetricNotFound { kind: "counter", .. }));
        }
    }

    #[tokio::test]
    async fn test_kinds_are_separate_namespaces() {
        for store in backends().await {
            store.update_gauge("Shared", 1.5).await.unwrap();
            store.update_counter("Shared", 2).await.unwrap();
            assert_eq!(store.get_gauge("Shared").await.unwrap(), 1.5);
            assert_eq!(store.get_counter("Shared").await.unwrap(), 2);
        }
    }

    #[tokio::test]
    async fn test_batch_applies_all_entries() {
        for store in backends().await {
            let batch = vec![
                Metric::counter("Requests", 5),
                Metric::gauge("Load", 0.5),
                Metric::counter("Requests", 3),
            ];
            store.update_batch(&batch).await.unwrap();

            assert_eq!(store.get_counter("Requests").await.unwrap(), 8);
            assert_eq!(store.get_gauge("Load").await.unwrap(), 0.5);
        }
    }

    #[tokio::test]
    async fn test_invalid_batch_mutates_nothing() {
        for store in backends().await {
            store.update_counter("Requests", 1).await.unwrap();

            let batch = vec![
                Metric::counter("Requests", 5),
                Metric::gauge("Load", 0.5),
                Metric { id: "Broken".into(), mtype: "histogram".into(), delta: None, value: None },
            ];
            let err = store.update_batch(&batch).await.unwrap_err();
            assert!(err.is_client_error());

            assert_eq!(store.get_counter("Requests").await.unwrap(), 1);
            assert!(store.get_gauge("Load").await.is_err());
        }
    }

    #[tokio::test]
    async fn test_listing_returns_both_maps() {
        for store in backends().await {
            store.update_gauge("b", 2.0).await.unwrap();
            store.update_gauge("a", 1.0).await.unwrap();
            store.update_counter("c", 7).await.unwrap();

            let gauges = store.list_gauges().await.unwrap();
            assert_eq!(gauges.keys().collect::<Vec<_>>(), vec!["a", "b"]);
            assert_eq!(store.list_counters().await.unwrap().get("c"), Some(&7));
        }
    }

    #[tokio::test]
    async fn test_concurrent_counter_updates_are_not_lost() {
        for store in backends().await {
            let mut handles = Vec::new();
            for _ in 0..16 {
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    for _ in 0..10 {
                        store.update_counter("Hits", 1).await.unwrap();
                    }
                }));
            }
            for handle in handles {
                handle.await.unwrap();
            }
            assert_eq!(store.get_counter("Hits").await.unwrap(), 160, "{}", store.backend());
        }
    }

    #[tokio::test]
    async fn test_update_counter_returns_new_total() {
        for store in backends().await {
            assert_eq!(store.update_counter("Requests", 5).await.unwrap(), 5);
            assert_eq!(store.update_counter("Requests", -2).await.unwrap(), 3, "{}", store.backend());
        }
    }

    #[tokio::test]
    async fn test_counter_overflow_rejected() {
        for store in backends().await {
            store.update_counter("Big", i64::MAX).await.unwrap();
            let err = store.update_counter("Big", 1).await.unwrap_err();
            assert!(matches!(err, VigilError::CounterOverflow { .. }), "{}: {err}", store.backend());
            assert!(err.is_client_error());
            assert_eq!(store.get_counter("Big").await.unwrap(), i64::MAX);

            store.update_counter("Small", i64::MIN).await.unwrap();
            assert!(store.update_counter("Small", -1).await.is_err());
            assert_eq!(store.get_counter("Small").await.unwrap(), i64::MIN);

            // Both totals still decode as integers.
            let counters = store.list_counters().await.unwrap();
            assert_eq!(counters.get("Big"), Some(&i64::MAX));
        }
    }

    #[tokio::test]
    async fn test_overflowing_batch_mutates_nothing() {
        for store in backends().await {
            store.update_counter("Requests", i64::MAX - 10).await.unwrap();

            let batch = vec![
                Metric::gauge("Load", 0.5),
                Metric::counter("Requests", 6),
                Metric::counter("Requests", 6),
            ];
            let err = store.update_batch(&batch).await.unwrap_err();
            assert!(matches!(err, VigilError::CounterOverflow { .. }), "{}", store.backend());

            assert_eq!(store.get_counter("Requests").await.unwrap(), i64::MAX - 10);
            assert!(store.get_gauge("Load").await.is_err());
        }
    }

    #[tokio::test]
    async fn test_non_finite_gauge_rejected() {
        for store in backends().await {
            for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
                let err = store.update_gauge("Bad", value).await.unwrap_err();
                assert!(matches!(err, VigilError::InvalidValue { .. }), "{}", store.backend());
                assert!(store.update_batch(&[Metric::gauge("Bad", value)]).await.is_err());
            }
            assert!(store.get_gauge("Bad").await.is_err());
        }
    }

    #[tokio::test]
    async fn test_ping() {
        for store in backends().await {
            store.ping().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_flush_then_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let store = MemoryStore::new(Some(path.clone()));
        store.update_gauge("Alloc", 1024.5).await.unwrap();
        store.update_counter("PollCount", 4).await.unwrap();
        store.update_counter("PollCount", 6).await.unwrap();
        store.flush().await.unwrap();

        let restored = MemoryStore::new(Some(path.clone()));
        restored.restore().await.unwrap();
        assert_eq!(restored.list_gauges().await.unwrap(), store.list_gauges().await.unwrap());
        assert_eq!(restored.list_counters().await.unwrap(), store.list_counters().await.unwrap());
        assert_eq!(restored.get_counter("PollCount").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_snapshot_is_json_array_of_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let store = MemoryStore::new(Some(path.clone()));
        store.update_gauge("Load", 0.25).await.unwrap();
        store.update_counter("Requests", 3).await.unwrap();
        store.flush().await.unwrap();

        let body = std::fs::read(&path).unwrap();
        let metrics: Vec<Metric> = serde_json::from_slice(&body).unwrap();
        assert_eq!(metrics, vec![Metric::gauge("Load", 0.25), Metric::counter("Requests", 3)]);
    }

    #[tokio::test]
    async fn test_flush_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let store = MemoryStore::new(Some(path.clone()));
        store.update_counter("Requests", 1).await.unwrap();
        store.flush().await.unwrap();
        store.update_counter("Requests", 1).await.unwrap();
        store.flush().await.unwrap();

        let metrics: Vec<Metric> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(metrics, vec![Metric::counter("Requests", 2)]);
    }

    #[tokio::test]
    async fn test_restore_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(Some(dir.path().join("absent.json")));
        store.restore().await.unwrap();
        assert!(store.list_gauges().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restore_rejects_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = MemoryStore::new(Some(path));
        assert!(matches!(store.restore().await, Err(VigilError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_sync_flush_writes_on_every_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let store = MemoryStore::new(Some(path.clone())).with_sync_flush(true);
        store.update_gauge("Load", 0.5).await.unwrap();

        let metrics: Vec<Metric> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(metrics, vec![Metric::gauge("Load", 0.5)]);
    }

    #[tokio::test]
    async fn test_failed_sync_flush_rolls_back_mutation() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the snapshot directory should be.
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"").unwrap();

        let store = MemoryStore::new(Some(blocker.join("metrics.json"))).with_sync_flush(true);

        let err = store.update_batch(&[Metric::counter("Requests", 5)]).await.unwrap_err();
        assert!(matches!(err, VigilError::SnapshotIo { .. }));
        assert!(store.update_counter("Requests", 5).await.is_err());
        assert!(store.update_gauge("Load", 0.5).await.is_err());

        assert!(store.get_counter("Requests").await.is_err());
        assert!(store.list_gauges().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_flush_snapshot_matches_committed_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let store = MemoryStore::new(Some(path.clone())).with_sync_flush(true);
        store.update_counter("Requests", 5).await.unwrap();
        store.update_batch(&[Metric::counter("Requests", 3), Metric::gauge("Load", 0.5)]).await.unwrap();

        let restored = MemoryStore::new(Some(path));
        restored.restore().await.unwrap();
        assert_eq!(restored.get_counter("Requests").await.unwrap(), 8);
        assert_eq!(restored.get_gauge("Load").await.unwrap(), 0.5);
    }

    #[tokio::test]
    async fn test_open_restores_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        std::fs::write(&path, br#"[{"id":"Requests","type":"counter","delta":8}]"#).unwrap();

        let backend =
            StoreBackend::Memory { snapshot_path: Some(path.clone()), restore: true, sync_flush: false };
        let store = open(&backend).await.unwrap();
        assert_eq!(store.get_counter("Requests").await.unwrap(), 8);

        let backend = StoreBackend::Memory { snapshot_path: Some(path), restore: false, sync_flush: false };
        let store = open(&backend).await.unwrap();
        assert!(store.get_counter("Requests").await.is_err());
    }

    #[tokio::test]
    async fn test_relational_flush_and_restore_are_noops() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        store.update_counter("Requests", 2).await.unwrap();
        store.flush().await.unwrap();
        store.restore().await.unwrap();
        assert_eq!(store.get_counter("Requests").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_relational_data_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let dsn = format!("sqlite://{}", dir.path().join("metrics.db").display());

        let store = SqliteStore::connect(&dsn).await.unwrap();
        store.update_counter("Requests", 5).await.unwrap();
        store.pool().close().await;

        let store = SqliteStore::connect(&dsn).await.unwrap();
        store.update_counter("Requests", 3).await.unwrap();
        assert_eq!(store.get_counter("Requests").await.unwrap(), 8);
    }
}
