//! Processor bundle trait definition.

use std::sync::Arc;

use sluice_core::ports::BatchHandler;
use sluice_storage::OutputWriter;

/// A self-contained processor: what it selects, how it folds a batch into
/// entities, and the tables those entities live in.
///
/// # Example
///
/// ```ignore
/// pub struct MyBundle { pool: PgPool }
///
/// impl ProcessorBundle for MyBundle {
///     fn name(&self) -> &'static str { "my_bundle" }
///
///     fn handlers(&self) -> Vec<Arc<dyn BatchHandler>> {
///         vec![Arc::new(MyHandler::new(self.storage()))]
///     }
///
///     fn writers(&self) -> Vec<Arc<dyn OutputWriter>> {
///         vec![Arc::new(MyWriter)]
///     }
///
///     fn migrations(&self) -> &'static [&'static str] {
///         MIGRATIONS
///     }
/// }
/// ```
pub trait ProcessorBundle: Send + Sync {
    /// Unique name identifying this bundle.
    ///
    /// Used for logging, output keys and migration tracking.
    fn name(&self) -> &'static str;

    /// Batch handlers provided by this bundle.
    fn handlers(&self) -> Vec<Arc<dyn BatchHandler>>;

    /// Writers persisting this bundle's outputs inside the batch transaction.
    fn writers(&self) -> Vec<Arc<dyn OutputWriter>>;

    /// Forward-only SQL migrations for this bundle's schema.
    ///
    /// Entries are applied in order and never edited once released; a
    /// schema change is a new entry at the end.
    fn migrations(&self) -> &'static [&'static str] {
        &[]
    }

    /// SS58 network of the chain this bundle reads, used for account ids
    /// unless `SS58_NETWORK` overrides it.
    fn default_ss58_network(&self) -> &'static str {
        "substrate"
    }

    /// First block this bundle has anything to read from.
    fn start_block(&self) -> u64 {
        0
    }

    /// Priority for migrations and writers (higher = earlier).
    fn priority(&self) -> i32 {
        0
    }

    /// Tables owned by this bundle, truncated by `--purge`.
    fn tables_to_purge(&self) -> &'static [&'static str] {
        &[]
    }
}
