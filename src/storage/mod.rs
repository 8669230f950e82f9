//! # Storage and Persistence
//!
//! The [`TemplateStore`] contract and its two backends: an in-process store
//! for development and tests, and a PostgreSQL store for deployments. The
//! principal store follows the same `database.backend` switch, so a
//! PostgreSQL deployment keeps users and their grants across restarts.

pub mod memory;
pub mod migrations;
pub mod pool;
pub mod postgres;
pub mod principals;
pub mod store;

#[cfg(all(test, feature = "postgres_tests"))]
pub mod test_helpers;

use std::sync::Arc;

pub use crate::config::DatabaseConfig;

pub use memory::MemoryTemplateStore;
pub use migrations::{get_migration_version, list_applied_migrations, run_migrations, MigrationInfo};
pub use pool::{create_pool, get_pool_stats, sanitize_url, DbPool, PoolStats};
pub use postgres::PgTemplateStore;
pub use principals::PgPrincipalStore;
pub use store::{
    ReconcileOutcome, TemplateStore, CLUSTER_RESOURCE, REVISION_RESOURCE, TEMPLATE_RESOURCE,
};

use crate::auth::{MemoryPrincipalStore, PrincipalStore};
use crate::config::StoreBackend;
use crate::errors::{KeelsonError, Result};

/// Check database connectivity
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| KeelsonError::database(e, "Database connectivity check failed"))?;

    Ok(())
}

/// Template and principal stores sharing one backend.
#[derive(Clone)]
pub struct Stores {
    pub templates: Arc<dyn TemplateStore>,
    pub principals: Arc<dyn PrincipalStore>,
}

/// Build the stores selected by `database.backend`.
pub async fn build_stores(config: &DatabaseConfig) -> Result<Stores> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!(backend = %config.backend, "Using in-memory stores");
            Ok(Stores {
                templates: Arc::new(MemoryTemplateStore::new()),
                principals: Arc::new(MemoryPrincipalStore::new()),
            })
        }
        StoreBackend::Postgres => {
            let pool = create_pool(config).await?;
            check_connection(&pool).await?;
            let stats = get_pool_stats(&pool);
            tracing::info!(
                backend = %config.backend,
                url = %sanitize_url(&config.url),
                pool_size = stats.size,
                pool_active = stats.active(),
                "Using PostgreSQL stores"
            );
            Ok(Stores {
                templates: Arc::new(PgTemplateStore::new(pool.clone())),
                principals: Arc::new(PgPrincipalStore::new(pool)),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_is_default() {
        let stores = build_stores(&DatabaseConfig::default()).await.unwrap();
        assert!(stores.principals.find_by_username("admin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn postgres_backend_rejects_invalid_url() {
        let config = DatabaseConfig {
            backend: StoreBackend::Postgres,
            url: "mysql://localhost/keelson".to_string(),
            ..Default::default()
        };
        assert!(build_stores(&config).await.is_err());
    }
}
