//! # Database Migration Management
//!
//! Schema migrations are embedded in the binary from `migrations/` and applied
//! through sqlx's migrator, which records each version in `_sqlx_migrations`.

use crate::errors::{KeelsonError, Result};
use crate::storage::DbPool;
use serde::{Deserialize, Serialize};
use sqlx::migrate::Migrator;
use tracing::{error, info};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// An applied migration as recorded by the migrator.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MigrationInfo {
    pub version: i64,
    pub description: String,
    pub installed_on: chrono::DateTime<chrono::Utc>,
    pub success: bool,
}

/// Run all pending database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    info!(embedded = MIGRATOR.iter().count(), "Starting database migration process");

    MIGRATOR.run(pool).await.map_err(|e| {
        error!(error = %e, "Database migration failed");
        KeelsonError::from(e)
    })?;

    let version = get_migration_version(pool).await?;
    info!(version = ?version, "Database migrations complete");
    Ok(())
}

/// Latest successfully applied migration version, if any
pub async fn get_migration_version(pool: &DbPool) -> Result<Option<i64>> {
    let version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .map_err(|e| KeelsonError::database(e, "Failed to read migration version"))?;
    Ok(version)
}

/// All migrations recorded in the database, oldest first
pub async fn list_applied_migrations(pool: &DbPool) -> Result<Vec<MigrationInfo>> {
    sqlx::query_as::<sqlx::Postgres, MigrationInfo>(
        "SELECT version, description, installed_on, success FROM _sqlx_migrations ORDER BY version",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| KeelsonError::database(e, "Failed to list applied migrations"))
}
