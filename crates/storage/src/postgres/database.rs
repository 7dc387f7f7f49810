//! PostgreSQL database connection and configuration.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, instrument};

use sluice_core::error::{StorageError, StorageResult};

use super::helpers::query_error;

/// Pool settings for one of the two processes sharing the database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// How long a query waits for a free connection.
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    /// Batches are written one at a time: one connection holds the batch
    /// transaction, the others serve handler lookups.
    pub fn for_processor(url: &str) -> Self {
        Self {
            url: url.to_string(),
            max_connections: 8,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    /// Queries fail fast rather than queue behind a busy pool.
    pub fn for_graphql(url: &str) -> Self {
        Self {
            url: url.to_string(),
            max_connections: 15,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Pool shared by the repositories of one process.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    #[instrument(skip_all, fields(max_connections = config.max_connections))]
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        debug!("Connection pool ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the core migrations (cursor and bundle migration tracking).
    ///
    /// Bundle tables are created afterwards by the bundle registry.
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::MigrationError(e.to_string()))
    }

    /// Whether a connection can be acquired and used.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Reset every processor cursor.
    ///
    /// Bundle tables are truncated separately by the bundle registry; the
    /// schema and `bundle_migrations` stay in place so nothing re-runs.
    #[instrument(skip(self))]
    pub async fn purge(&self) -> StorageResult<PurgeStats> {
        let cursors: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM processor_cursor")
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)?;

        sqlx::query("TRUNCATE processor_cursor")
            .execute(&self.pool)
            .await
            .map_err(query_error)?;

        debug!(cursors = cursors.0, "Cursors reset");
        Ok(PurgeStats {
            cursors_removed: cursors.0 as u64,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PurgeStats {
    pub cursors_removed: u64,
}
