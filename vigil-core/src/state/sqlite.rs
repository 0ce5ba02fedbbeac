//! Relational backend on SQLite.
//!
//! Durability is delegated to the database: every accepted update is written
//! through, so `restore` and `flush` have nothing to do. Counter increments
//! use an additive upsert and never lose concurrent updates.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{ConnectOptions, Executor, Sqlite};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

use super::{migrations, MetricStore};
use crate::error::{Result, VigilError};
use crate::retry::Backoff;
use crate::types::{finite_gauge, Metric, MetricKind, MetricUpdate};

const PING_TIMEOUT: Duration = Duration::from_secs(1);

fn db_error(operation: &'static str) -> impl FnOnce(sqlx::Error) -> VigilError {
    move |e| {
        metrics::counter!("vigil_db_errors_total", "operation" => operation).increment(1);
        VigilError::DatabaseError(e.to_string())
    }
}

async fn upsert_gauge<'e, E>(executor: E, id: &str, value: f64) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO gauges (id, value) VALUES (?, ?)
        ON CONFLICT (id) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(id)
    .bind(value)
    .execute(executor)
    .await
    .map_err(db_error("update_gauge"))?;
    Ok(())
}

/// Add `delta` and return the new total.
///
/// SQLite turns an overflowing integer add into REAL, so the update is guarded
/// to the range where the sum still fits in `i64`. A refused update returns no
/// row and is reported as an overflow.
async fn upsert_counter<'e, E>(executor: E, id: &str, delta: i64) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO counters (id, value) VALUES (?, ?)
        ON CONFLICT (id) DO UPDATE SET value = counters.value + excluded.value
        WHERE (excluded.value >= 0 AND counters.value <= 9223372036854775807 - excluded.value)
           OR (excluded.value < 0 AND counters.value >= (-9223372036854775807 - 1) - excluded.value)
        RETURNING value
        "#,
    )
    .bind(id)
    .bind(delta)
    .fetch_optional(executor)
    .await
    .map_err(db_error("update_counter"))?
    .ok_or_else(|| VigilError::CounterOverflow { id: id.to_string() })
}

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Store on a private in-memory database (for tests).
    pub async fn new_in_memory() -> Result<Self> {
        Self::open(":memory:").await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Connect with the default retry policy; a database still unreachable
    /// after the last retry is returned as an error.
    #[instrument(skip(dsn))]
    pub async fn connect(dsn: &str) -> Result<Self> {
        Self::connect_with(dsn, Backoff::default()).await
    }

    pub async fn connect_with(dsn: &str, backoff: Backoff) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(|e| VigilError::InvalidConfig { reason: format!("invalid database DSN: {e}") })?
            .create_if_missing(true)
            .log_statements(tracing::log::LevelFilter::Debug);

        // Every connection to `:memory:` is its own database.
        let in_memory = dsn.contains(":memory:") || dsn.contains("mode=memory");
        let max_connections = if in_memory { 1 } else { 5 };

        let pool = backoff
            .retry(
                "database connect",
                |_| {
                    SqlitePoolOptions::new()
                        .max_connections(max_connections)
                        .connect_with(options.clone())
                },
                |e| !matches!(e, sqlx::Error::Configuration(_)),
            )
            .await
            .map_err(db_error("connect"))?;

        migrations::run(&pool).await?;
        info!(in_memory, "Relational store connected");
        Ok(Self { pool })
    }

    async fn open(dsn: &str) -> Result<Self> {
        Self::connect_with(dsn, Backoff::new(0)).await
    }
}

#[async_trait]
impl MetricStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    #[instrument(skip(self))]
    async fn update_gauge(&self, id: &str, value: f64) -> Result<()> {
        upsert_gauge(&self.pool, id, finite_gauge(value)?).await
    }

    #[instrument(skip(self))]
    async fn update_counter(&self, id: &str, delta: i64) -> Result<i64> {
        upsert_counter(&self.pool, id, delta).await
    }

    async fn get_gauge(&self, id: &str) -> Result<f64> {
        sqlx::query_scalar::<_, f64>("SELECT value FROM gauges WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("get_gauge"))?
            .ok_or_else(|| VigilError::MetricNotFound {
                kind: MetricKind::Gauge.as_str(),
                id: id.to_string(),
            })
    }

    async fn get_counter(&self, id: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT value FROM counters WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("get_counter"))?
            .ok_or_else(|| VigilError::MetricNotFound {
                kind: MetricKind::Counter.as_str(),
                id: id.to_string(),
            })
    }

    async fn list_gauges(&self) -> Result<BTreeMap<String, f64>> {
        let rows: Vec<(String, f64)> = sqlx::query_as("SELECT id, value FROM gauges")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list_gauges"))?;
        Ok(rows.into_iter().collect())
    }

    async fn list_counters(&self) -> Result<BTreeMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT id, value FROM counters")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list_counters"))?;
        Ok(rows.into_iter().collect())
    }

    #[instrument(skip(self, metrics), fields(count = metrics.len()))]
    async fn update_batch(&self, metrics: &[Metric]) -> Result<()> {
        let updates = MetricUpdate::validate_batch(metrics)?;

        let mut tx = self.pool.begin().await.map_err(db_error("begin"))?;
        for update in &updates {
            match update {
                MetricUpdate::Gauge { id, value } => upsert_gauge(&mut *tx, id, *value).await?,
                MetricUpdate::Counter { id, delta } => {
                    upsert_counter(&mut *tx, id, *delta).await?;
                }
            }
        }
        // Dropping `tx` on an early return rolls it back.
        tx.commit().await.map_err(db_error("commit"))?;
        Ok(())
    }

    async fn restore(&self) -> Result<()> {
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let probe = sqlx::query("SELECT 1").execute(&self.pool);
        match tokio::time::timeout(PING_TIMEOUT, probe).await {
            Ok(result) => result.map(|_| ()).map_err(db_error("ping")),
            Err(_) => Err(VigilError::DatabaseError("ping timed out".to_string())),
        }
    }
}
