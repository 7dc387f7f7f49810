//! Port traits for data repositories.
//!
//! These traits define the storage interface used by the domain layer.
//! Implementations live in the infrastructure layer (e.g., `sluice-storage`).

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::models::ProcessorCursor;

use super::handler::HandlerOutputs;

/// Repository for processor cursor state.
#[async_trait]
pub trait CursorRepository: Send + Sync {
    /// Get current cursor for a processor.
    async fn get_cursor(&self, processor: &str) -> StorageResult<Option<ProcessorCursor>>;

    /// Update cursor (upsert).
    async fn set_cursor(&self, cursor: &ProcessorCursor) -> StorageResult<()>;
}

/// What one batch transaction wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchWriteStats {
    /// Rows written per output key.
    pub rows: Vec<(String, u64)>,
}

impl BatchWriteStats {
    pub fn record(&mut self, key: impl Into<String>, rows: u64) {
        self.rows.push((key.into(), rows));
    }

    pub fn total(&self) -> u64 {
        self.rows.iter().map(|(_, n)| n).sum()
    }
}

/// Combined repository access for the processor.
#[async_trait]
pub trait Repositories: Send + Sync {
    /// Access the cursor repository.
    fn cursor(&self) -> &dyn CursorRepository;

    /// Persist one batch atomically.
    ///
    /// Writes every handler output and moves the cursor in a single
    /// transaction. If any write fails, everything is rolled back and the
    /// cursor stays where it was.
    async fn persist_batch_atomic(
        &self,
        outputs: &HandlerOutputs,
        cursor: &ProcessorCursor,
    ) -> StorageResult<BatchWriteStats>;
}
