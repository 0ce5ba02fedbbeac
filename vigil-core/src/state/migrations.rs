//! Database migrations for the relational backend.

use crate::error::{Result, VigilError};
use sqlx::SqlitePool;
use tracing::{info, instrument};

const SCHEMA_VERSION: i64 = 1;

#[instrument(skip(pool))]
pub async fn run(pool: &SqlitePool) -> Result<()> {
    // Create schema_version table if not exists
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| VigilError::MigrationFailed { reason: e.to_string() })?;

    // Get current schema version
    let current_version: Option<i64> =
        sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(pool)
            .await
            .map_err(|e| VigilError::MigrationFailed { reason: e.to_string() })?;

    let current_version = current_version.unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    info!("Migrating database from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        migrate_to_v1(pool).await?;
    }

    Ok(())
}

#[instrument(skip(pool))]
async fn migrate_to_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration to schema version 1");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gauges (
            id TEXT PRIMARY KEY,
            value DOUBLE PRECISION NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| VigilError::MigrationFailed { reason: e.to_string() })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS counters (
            id TEXT PRIMARY KEY,
            value BIGINT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| VigilError::MigrationFailed { reason: e.to_string() })?;

    set_version(pool, 1).await?;
    info!("Migration to schema version 1 complete");
    Ok(())
}

async fn set_version(pool: &SqlitePool, version: i64) -> Result<()> {
    sqlx::query("DELETE FROM schema_version")
        .execute(pool)
        .await
        .map_err(|e| VigilError::MigrationFailed { reason: e.to_string() })?;

    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await
        .map_err(|e| VigilError::MigrationFailed { reason: e.to_string() })?;

    Ok(())
}
