//! PostgreSQL storage adapter.
//!
//! This module implements the repository traits defined in `sluice-core`
//! using PostgreSQL as the backing store.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool and core migrations
//! - [`PgCursorRepository`] - Processor cursor
//! - [`OutputWriter`] - Seam through which bundles persist their entities
//! - [`PgRepositories`] - Composite repository implementing `Repositories`
//!
//! # Usage
//!
//! ```ignore
//! let config = DatabaseConfig::for_processor(&database_url);
//! let db = Database::connect(&config).await?;
//! db.migrate().await?;
//!
//! let repositories = PgRepositories::new(Arc::new(db), bundles.writers());
//! ```

mod cursor_repo;
mod database;
mod helpers;

pub use cursor_repo::PgCursorRepository;
pub use database::{Database, DatabaseConfig, PurgeStats};
pub use helpers::{
    bytes_to_hash32, parse_numeric, parse_optional_numeric, query_error, typed_outputs,
};

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgConnection;
use tracing::{debug, instrument};

use sluice_core::error::{StorageError, StorageResult};
use sluice_core::models::ProcessorCursor;
use sluice_core::ports::{BatchWriteStats, CursorRepository, HandlerOutputs, Repositories};

// =============================================================================
// Output writers
// =============================================================================

/// Persists one bundle's share of the batch outputs.
///
/// Writers receive the open batch transaction. They must not commit or
/// roll back; an error from any writer discards the whole batch.
#[async_trait]
pub trait OutputWriter: Send + Sync {
    /// Name used in logs and write statistics.
    fn name(&self) -> &'static str;

    /// Write the entities this writer owns, returning the affected row count.
    async fn write(&self, conn: &mut PgConnection, outputs: &HandlerOutputs)
    -> StorageResult<u64>;
}

// =============================================================================
// Composite Repository
// =============================================================================

/// Aggregated PostgreSQL repositories implementing the `Repositories` trait.
pub struct PgRepositories {
    db: Arc<Database>,
    cursor: PgCursorRepository,
    writers: Vec<Arc<dyn OutputWriter>>,
}

impl PgRepositories {
    /// Create the repository aggregate.
    ///
    /// Writers run in the given order inside every batch transaction.
    pub fn new(db: Arc<Database>, writers: Vec<Arc<dyn OutputWriter>>) -> Self {
        Self {
            cursor: PgCursorRepository::new(&db),
            db,
            writers,
        }
    }

    /// Names of the registered writers, in execution order.
    pub fn writer_names(&self) -> Vec<&'static str> {
        self.writers.iter().map(|w| w.name()).collect()
    }
}

#[async_trait]
impl Repositories for PgRepositories {
    fn cursor(&self) -> &dyn CursorRepository {
        &self.cursor
    }

    #[instrument(skip_all, fields(processor = %cursor.processor, block = cursor.last_block))]
    async fn persist_batch_atomic(
        &self,
        outputs: &HandlerOutputs,
        cursor: &ProcessorCursor,
    ) -> StorageResult<BatchWriteStats> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        let mut stats = BatchWriteStats::default();
        for writer in &self.writers {
            let rows = writer.write(&mut *tx, outputs).await?;
            debug!(writer = writer.name(), rows, "Writer finished");
            stats.record(writer.name(), rows);
        }

        cursor_repo::upsert_cursor(&mut *tx, cursor).await?;

        // Dropping `tx` on any error above rolls everything back
        tx.commit()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        Ok(stats)
    }
}
