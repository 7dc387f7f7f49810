//! Batch processor service - orchestrates fetch, decode and persist.
//!
//! One block range is fetched, run through every handler and persisted
//! together with the cursor before the next range is requested.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::error::{ChainError, ChainResult, ProcessorError, ProcessorResult};
use crate::metrics::{ProcessingTimer, record_batch_processed, record_fetch_retry, record_items};
use crate::models::{BlockHash, BlockRange, ProcessorCursor, Ss58Codec};
use crate::ports::{
    BatchContext, BatchSource, HandlerOutputs, HandlerRegistry, RawBlock, Repositories, Selection,
};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the batch processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Processor name, used as the cursor key.
    pub name: String,
    /// First block to process when no cursor exists.
    pub from_block: u64,
    /// Last block to process (inclusive). `None` follows the finalized head.
    pub to_block: Option<u64>,
    /// Maximum number of blocks per batch.
    pub batch_size: u64,
    /// Wait time when the processor has caught up with the finalized head.
    pub poll_interval: Duration,
    /// Maximum retries for a failed fetch.
    pub max_retries: u32,
    /// Initial delay between retries (doubled on each attempt).
    pub retry_delay: Duration,
    /// Genesis hash the processor must be connected to.
    pub expected_genesis: Option<BlockHash>,
    /// Address codec of the indexed network.
    pub ss58: Ss58Codec,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            name: "sluice".to_string(),
            from_block: 0,
            to_block: None,
            batch_size: 500,
            poll_interval: Duration::from_secs(6),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            expected_genesis: None,
            ss58: Ss58Codec::new(42),
        }
    }
}

// =============================================================================
// BatchProcessor
// =============================================================================

/// Sequential batch processor.
///
/// # Flow
///
/// 1. Resume from the stored cursor (or `from_block`)
/// 2. Fetch the next range, capped by `batch_size` and the finalized head
/// 3. Run every handler over the batch, in priority order
/// 4. Persist all handler outputs and the new cursor in one transaction
///
/// Fetch failures are retried with backoff. Any other error, including an
/// unknown schema version, stops the processor with nothing of the failing
/// batch persisted.
pub struct BatchProcessor<S: BatchSource, R: Repositories> {
    config: ProcessorConfig,
    source: Arc<S>,
    repositories: Arc<R>,
    handlers: Arc<HandlerRegistry>,
    selection: Selection,
}

impl<S: BatchSource, R: Repositories> BatchProcessor<S, R> {
    pub fn new(
        config: ProcessorConfig,
        source: Arc<S>,
        repositories: Arc<R>,
        handlers: Arc<HandlerRegistry>,
    ) -> Self {
        let selection = handlers.selection();
        Self {
            config,
            source,
            repositories,
            handlers,
            selection,
        }
    }

    /// Selection requested from the source on every fetch.
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Start the processor.
    ///
    /// Returns `Ok(())` once `to_block` has been persisted, or
    /// [`ProcessorError::ShutdownRequested`] when stopped by the signal.
    #[instrument(skip_all, fields(processor = %self.config.name))]
    pub async fn run(
        &self,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> ProcessorResult<()> {
        info!(handlers = ?self.handlers.registered(), "⛓️  Starting processor");

        if self.handlers.is_empty() {
            return Err(ProcessorError::ConfigError(
                "no handlers registered".to_string(),
            ));
        }

        self.verify_genesis().await?;

        let mut next = self.start_block().await?;

        loop {
            if *shutdown_rx.borrow() {
                debug!("Shutdown requested");
                return Err(ProcessorError::ShutdownRequested);
            }

            if let Some(to) = self.config.to_block
                && next > to
            {
                info!(to_block = to, "🏁 Reached end of configured range");
                return Ok(());
            }

            let head = self
                .with_retry("finalized head", || self.source.finalized_head())
                .await?;

            let Some(range) = self.next_range(next, head.number) else {
                debug!(next, head = head.number, "Caught up with finalized head");
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    _ = shutdown_rx.changed() => {}
                }
                continue;
            };

            let cursor = self.process_batch(range).await?;
            next = cursor.last_block + 1;
        }
    }

    /// Verify the connected chain is the one the processor was configured for.
    async fn verify_genesis(&self) -> ProcessorResult<()> {
        let Some(expected) = self.config.expected_genesis else {
            return Ok(());
        };

        let connected = self.source.genesis_hash().await?;
        if connected != expected {
            error!(
                connected = %connected,
                expected = %expected,
                "❌ Chain mismatch! Connected node is not the configured network"
            );
            return Err(ProcessorError::ChainMismatch {
                connected: connected.to_hex(),
                expected: expected.to_hex(),
            });
        }
        debug!("Genesis hash verified");
        Ok(())
    }

    /// First block of the next batch: after the cursor, or `from_block`.
    pub async fn start_block(&self) -> ProcessorResult<u64> {
        let cursor = self
            .repositories
            .cursor()
            .get_cursor(&self.config.name)
            .await?;

        match cursor {
            Some(cursor) => {
                info!(
                    last_block = cursor.last_block,
                    "🔁 Resuming from cursor"
                );
                Ok(cursor.last_block + 1)
            }
            None => {
                info!(from_block = self.config.from_block, "🆕 No cursor, starting fresh");
                Ok(self.config.from_block)
            }
        }
    }

    /// Range starting at `next`, capped by batch size, head and `to_block`.
    pub fn next_range(&self, next: u64, head: u64) -> Option<BlockRange> {
        let mut last = head.min(next.saturating_add(self.config.batch_size.max(1) - 1));
        if let Some(to) = self.config.to_block {
            last = last.min(to);
        }
        (next <= last).then(|| BlockRange::new(next, last))
    }

    /// Fetch, process and persist one range.
    ///
    /// Returns the cursor written with the batch.
    #[instrument(skip(self), fields(range = %range))]
    pub async fn process_batch(&self, range: BlockRange) -> ProcessorResult<ProcessorCursor> {
        let _timer = ProcessingTimer::new();

        let blocks = self
            .with_retry("batch", || self.source.fetch_batch(range, &self.selection))
            .await?;
        check_contiguous(range, &blocks)?;

        let item_count = count_items(&blocks);
        let ctx = BatchContext::new(&blocks, self.source.as_ref(), self.config.ss58);

        let mut outputs = HandlerOutputs::new();
        for handler in self.handlers.all() {
            let handler_outputs = handler.handle_batch(&ctx).await.inspect_err(|e| {
                error!(handler = handler.name(), error = %e, "❌ Handler failed, aborting batch");
            })?;
            outputs.merge(handler_outputs);
        }

        // check_contiguous guarantees at least one block
        let last = blocks
            .last()
            .ok_or_else(|| ProcessorError::Internal("empty batch".to_string()))?;
        let cursor = ProcessorCursor {
            processor: self.config.name.clone(),
            last_block: last.number,
            last_hash: last.hash,
            updated_at: chrono::Utc::now(),
        };

        let persist_timer = ProcessingTimer::for_histogram("sluice_persist_duration_seconds");
        let stats = self
            .repositories
            .persist_batch_atomic(&outputs, &cursor)
            .await?;
        drop(persist_timer);

        record_batch_processed(range.len(), last.number);
        info!(
            from = range.from,
            to = range.to,
            items = item_count,
            rows = stats.total(),
            "📦 Batch persisted"
        );

        Ok(cursor)
    }

    /// Retry a source call with exponential backoff.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut call: F) -> ChainResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ChainResult<T>>,
    {
        let mut delay = self.config.retry_delay;
        let mut attempt = 0;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        error = %e,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        "⚠️  Failed to fetch {}, retrying...",
                        what
                    );
                    record_fetch_retry();
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Blocks must cover `range` exactly, in ascending order.
fn check_contiguous(range: BlockRange, blocks: &[RawBlock]) -> ChainResult<()> {
    if blocks.len() as u64 != range.len() {
        return Err(ChainError::BlockFetchError {
            number: range.from,
            message: format!(
                "expected {} blocks for {}, got {}",
                range.len(),
                range,
                blocks.len()
            ),
        });
    }
    for (offset, block) in blocks.iter().enumerate() {
        let expected = range.from + offset as u64;
        if block.number != expected {
            return Err(ChainError::BlockFetchError {
                number: expected,
                message: format!("out of order block #{}", block.number),
            });
        }
    }
    Ok(())
}

fn count_items(blocks: &[RawBlock]) -> usize {
    let mut per_kind: std::collections::BTreeMap<String, u64> = Default::default();
    for block in blocks {
        for item in &block.items {
            *per_kind
                .entry(format!("{}.{}", item.pallet(), item.name()))
                .or_default() += 1;
        }
    }
    for (kind, count) in &per_kind {
        record_items(kind, *count);
    }
    per_kind.values().sum::<u64>() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use crate::decoding::ItemKind;
    use crate::error::{DomainError, DomainResult, StorageError, StorageResult};
    use crate::models::{BlockRef, H160, SchemaFingerprint};
    use crate::ports::{
        BatchHandler, BatchWriteStats, CursorRepository, EventPhase, FinalizedHead, ItemSelector,
        RawEvent, RawItem, StorageLookup, StorageQuery,
    };

    // -------------------------------------------------------------------------
    // Fakes
    // -------------------------------------------------------------------------

    struct FakeSource {
        genesis: BlockHash,
        head: u64,
        fail_fetches: AtomicU32,
        fetched: Mutex<Vec<BlockRange>>,
    }

    impl FakeSource {
        fn new(head: u64) -> Self {
            Self {
                genesis: BlockHash([7; 32]),
                head,
                fail_fetches: AtomicU32::new(0),
                fetched: Mutex::new(Vec::new()),
            }
        }

        fn block(number: u64) -> RawBlock {
            let transfer = RawEvent {
                index: 1,
                phase: EventPhase::ApplyExtrinsic(1),
                pallet: "Balances".into(),
                name: "Transfer".into(),
                fingerprint: SchemaFingerprint([1; 32]),
                args: json!([]),
                extrinsic: None,
            };
            RawBlock {
                number,
                hash: BlockHash([number as u8; 32]),
                parent_hash: BlockHash([number.saturating_sub(1) as u8; 32]),
                timestamp: Some(1_600_000_000_000 + number * 6000),
                spec_version: 1020,
                items: vec![RawItem::Event(transfer)],
            }
        }
    }

    #[async_trait]
    impl BatchSource for FakeSource {
        async fn genesis_hash(&self) -> ChainResult<BlockHash> {
            Ok(self.genesis)
        }

        async fn finalized_head(&self) -> ChainResult<FinalizedHead> {
            Ok(FinalizedHead {
                number: self.head,
                hash: BlockHash([self.head as u8; 32]),
            })
        }

        async fn fetch_batch(
            &self,
            range: BlockRange,
            _selection: &Selection,
        ) -> ChainResult<Vec<RawBlock>> {
            if self.fail_fetches.load(Ordering::SeqCst) > 0 {
                self.fail_fetches.fetch_sub(1, Ordering::SeqCst);
                return Err(ChainError::RpcError("connection reset".into()));
            }
            self.fetched.lock().unwrap().push(range);
            Ok((range.from..=range.to).map(Self::block).collect())
        }

        async fn storage(&self, _: &BlockRef, _: &StorageQuery) -> ChainResult<StorageLookup> {
            Ok(StorageLookup::Missing)
        }

        async fn evm_call(&self, _: &BlockRef, _: H160, _: Vec<u8>) -> ChainResult<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct FakeRepositories {
        cursor: Mutex<Option<ProcessorCursor>>,
        batches: Mutex<Vec<(usize, u64)>>,
        fail_persist: bool,
    }

    #[async_trait]
    impl CursorRepository for FakeRepositories {
        async fn get_cursor(&self, _: &str) -> StorageResult<Option<ProcessorCursor>> {
            Ok(self.cursor.lock().unwrap().clone())
        }

        async fn set_cursor(&self, cursor: &ProcessorCursor) -> StorageResult<()> {
            *self.cursor.lock().unwrap() = Some(cursor.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl Repositories for FakeRepositories {
        fn cursor(&self) -> &dyn CursorRepository {
            self
        }

        async fn persist_batch_atomic(
            &self,
            outputs: &HandlerOutputs,
            cursor: &ProcessorCursor,
        ) -> StorageResult<BatchWriteStats> {
            if self.fail_persist {
                return Err(StorageError::TransactionError("commit failed".into()));
            }
            self.batches
                .lock()
                .unwrap()
                .push((outputs.len(), cursor.last_block));
            *self.cursor.lock().unwrap() = Some(cursor.clone());
            let mut stats = BatchWriteStats::default();
            stats.record("test:transfers", outputs.len() as u64);
            Ok(stats)
        }
    }

    /// Emits one output per selected transfer; optionally fails at a height.
    struct CountingHandler {
        fail_at: Option<u64>,
    }

    #[async_trait]
    impl BatchHandler for CountingHandler {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn selection(&self) -> Selection {
            Selection::new().with(ItemSelector::event(ItemKind::event("Balances", "Transfer")))
        }

        async fn handle_batch(&self, ctx: &BatchContext<'_>) -> DomainResult<HandlerOutputs> {
            let selection = self.selection();
            let mut outputs = HandlerOutputs::new();
            for (block, _event) in ctx.events(&selection) {
                if Some(block.number) == self.fail_at {
                    return Err(DomainError::UnknownSchemaVersion {
                        kind: "Balances.Transfer".into(),
                        fingerprint: "0x01".into(),
                    });
                }
                outputs.add("test", "transfers", block.number)?;
            }
            Ok(outputs)
        }
    }

    fn processor(
        source: Arc<FakeSource>,
        repos: Arc<FakeRepositories>,
        fail_at: Option<u64>,
        config: ProcessorConfig,
    ) -> BatchProcessor<FakeSource, FakeRepositories> {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(CountingHandler { fail_at }));
        BatchProcessor::new(config, source, repos, Arc::new(registry))
    }

    fn config(from: u64, to: Option<u64>, batch_size: u64) -> ProcessorConfig {
        ProcessorConfig {
            name: "test".into(),
            from_block: from,
            to_block: to,
            batch_size,
            retry_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn shutdown() -> tokio::sync::watch::Receiver<bool> {
        let (tx, rx) = tokio::sync::watch::channel(false);
        std::mem::forget(tx);
        rx
    }

    // -------------------------------------------------------------------------
    // Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_runs_range_in_batches() {
        let source = Arc::new(FakeSource::new(100));
        let repos = Arc::new(FakeRepositories::default());
        let p = processor(source.clone(), repos.clone(), None, config(10, Some(34), 10));

        p.run(shutdown()).await.unwrap();

        let fetched = source.fetched.lock().unwrap().clone();
        assert_eq!(
            fetched,
            vec![
                BlockRange::new(10, 19),
                BlockRange::new(20, 29),
                BlockRange::new(30, 34)
            ]
        );
        // Un lot = une transaction, curseur inclus
        let batches = repos.batches.lock().unwrap().clone();
        assert_eq!(batches, vec![(10, 19), (10, 29), (5, 34)]);
        assert_eq!(repos.cursor.lock().unwrap().as_ref().unwrap().last_block, 34);
    }

    #[tokio::test]
    async fn test_unknown_schema_aborts_without_persisting() {
        let source = Arc::new(FakeSource::new(100));
        let repos = Arc::new(FakeRepositories::default());
        let p = processor(source, repos.clone(), Some(25), config(0, Some(40), 10));

        let err = p.run(shutdown()).await.unwrap_err();

        assert!(err.is_unknown_schema());
        // Batches before the failing one are kept, the failing one is not
        let batches = repos.batches.lock().unwrap().clone();
        assert_eq!(batches, vec![(10, 9), (10, 19)]);
        assert_eq!(repos.cursor.lock().unwrap().as_ref().unwrap().last_block, 19);
    }

    #[tokio::test]
    async fn test_resumes_after_cursor() {
        let source = Arc::new(FakeSource::new(100));
        let repos = Arc::new(FakeRepositories::default());
        *repos.cursor.lock().unwrap() = Some(ProcessorCursor {
            processor: "test".into(),
            last_block: 49,
            last_hash: BlockHash([49; 32]),
            updated_at: chrono::Utc::now(),
        });
        let p = processor(source.clone(), repos, None, config(0, Some(55), 100));

        assert_eq!(p.start_block().await.unwrap(), 50);
        p.run(shutdown()).await.unwrap();
        assert_eq!(
            source.fetched.lock().unwrap().clone(),
            vec![BlockRange::new(50, 55)]
        );
    }

    #[tokio::test]
    async fn test_next_range_respects_head_and_to_block() {
        let source = Arc::new(FakeSource::new(100));
        let repos = Arc::new(FakeRepositories::default());
        let p = processor(source, repos, None, config(0, Some(1000), 500));

        assert_eq!(p.next_range(90, 100), Some(BlockRange::new(90, 100)));
        assert_eq!(p.next_range(101, 100), None);
        assert_eq!(p.next_range(0, 10_000), Some(BlockRange::new(0, 499)));
        assert_eq!(p.next_range(900, 10_000), Some(BlockRange::new(900, 1000)));
    }

    #[tokio::test]
    async fn test_fetch_errors_are_retried() {
        let source = Arc::new(FakeSource::new(100));
        source.fail_fetches.store(2, Ordering::SeqCst);
        let repos = Arc::new(FakeRepositories::default());
        let p = processor(source, repos.clone(), None, config(0, Some(4), 10));

        p.run(shutdown()).await.unwrap();
        assert_eq!(repos.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_gives_up_after_max_retries() {
        let source = Arc::new(FakeSource::new(100));
        source.fail_fetches.store(10, Ordering::SeqCst);
        let repos = Arc::new(FakeRepositories::default());
        let p = processor(source, repos.clone(), None, config(0, Some(4), 10));

        let err = p.run(shutdown()).await.unwrap_err();
        assert!(matches!(err, ProcessorError::Chain(_)));
        assert!(repos.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persist_failure_stops_processor() {
        let source = Arc::new(FakeSource::new(100));
        let repos = Arc::new(FakeRepositories {
            fail_persist: true,
            ..Default::default()
        });
        let p = processor(source, repos.clone(), None, config(0, Some(4), 10));

        let err = p.run(shutdown()).await.unwrap_err();
        assert!(matches!(err, ProcessorError::Storage(_)));
        assert!(repos.cursor.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_genesis_mismatch() {
        let source = Arc::new(FakeSource::new(100));
        let repos = Arc::new(FakeRepositories::default());
        let mut cfg = config(0, Some(4), 10);
        cfg.expected_genesis = Some(BlockHash([9; 32]));
        let p = processor(source, repos, None, cfg);

        let err = p.run(shutdown()).await.unwrap_err();
        assert!(matches!(err, ProcessorError::ChainMismatch { .. }));
    }

    #[tokio::test]
    async fn test_shutdown_requested() {
        let source = Arc::new(FakeSource::new(100));
        let repos = Arc::new(FakeRepositories::default());
        let p = processor(source, repos, None, config(0, None, 10));

        let (tx, rx) = tokio::sync::watch::channel(true);
        let err = p.run(rx).await.unwrap_err();
        drop(tx);
        assert!(matches!(err, ProcessorError::ShutdownRequested));
    }

    #[test]
    fn test_check_contiguous_rejects_gaps() {
        let blocks = vec![FakeSource::block(1), FakeSource::block(3)];
        assert!(check_contiguous(BlockRange::new(1, 2), &blocks).is_err());
        assert!(check_contiguous(BlockRange::new(1, 3), &blocks).is_err());
        let ok = vec![FakeSource::block(1), FakeSource::block(2)];
        assert!(check_contiguous(BlockRange::new(1, 2), &ok).is_ok());
    }
}
