//! Bundle registry for managing processor bundles.

use std::cmp::Reverse;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::{debug, info};

use sluice_core::error::{StorageError, StorageResult};
use sluice_core::ports::HandlerRegistry;
use sluice_storage::OutputWriter;

use crate::bundle::ProcessorBundle;

/// Registry for managing processor bundles.
///
/// The registry handles:
/// - Bundle registration with priority ordering
/// - Migration execution with tracking (idempotent)
/// - Handler and writer extraction for the processor
///
/// # Example
///
/// ```ignore
/// let mut registry = BundleRegistry::new();
/// registry.register(Box::new(BalancesBundle::new(pool.clone())));
/// registry.register(Box::new(IdentityBundle::new(pool.clone())));
///
/// registry.run_migrations(&pool).await?;
///
/// let handlers = registry.handler_registry();
/// let repositories = PgRepositories::new(db, registry.writers());
/// ```
pub struct BundleRegistry {
    bundles: Vec<Box<dyn ProcessorBundle>>,
}

impl BundleRegistry {
    /// Create a new empty bundle registry.
    pub fn new() -> Self {
        Self {
            bundles: Vec::new(),
        }
    }

    /// Register a bundle.
    pub fn register(&mut self, bundle: Box<dyn ProcessorBundle>) {
        info!(bundle = bundle.name(), "📦 Registering processor bundle");
        self.bundles.push(bundle);
        self.bundles.sort_by_key(|b| Reverse(b.priority()));
    }

    /// Apply every bundle's pending migrations, in priority order.
    ///
    /// Applied migrations are tracked in `bundle_migrations` by bundle name,
    /// index and sha256 checksum. Each one runs in its own transaction
    /// together with its tracking row. A recorded migration whose content
    /// has since changed is an error: migrations only move forward.
    ///
    /// Returns the number of migrations applied.
    pub async fn run_migrations(&self, pool: &PgPool) -> StorageResult<usize> {
        let mut applied = 0;

        for bundle in &self.bundles {
            let migrations = bundle.migrations();
            if migrations.is_empty() {
                debug!(bundle = bundle.name(), "No migrations to run");
                continue;
            }

            for (index, migration) in migrations.iter().enumerate() {
                let checksum = compute_checksum(migration);

                let existing: Option<(String,)> = sqlx::query_as(
                    "SELECT checksum FROM bundle_migrations WHERE bundle_name = $1 AND migration_index = $2",
                )
                .bind(bundle.name())
                .bind(index as i32)
                .fetch_optional(pool)
                .await
                .map_err(|e| StorageError::MigrationError(e.to_string()))?;

                if let Some((existing_checksum,)) = existing {
                    if existing_checksum != checksum {
                        return Err(StorageError::MigrationError(format!(
                            "{} migration {} was modified after being applied (recorded {}, found {})",
                            bundle.name(),
                            index,
                            existing_checksum,
                            checksum
                        )));
                    }
                    debug!(
                        bundle = bundle.name(),
                        migration = index,
                        "Migration already applied, skipping"
                    );
                    continue;
                }

                info!(bundle = bundle.name(), migration = index, "🗄️  Applying migration");
                apply_migration(pool, bundle.name(), index, migration, &checksum).await?;
                applied += 1;
            }
        }

        Ok(applied)
    }

    /// Build the handler registry for the processor.
    pub fn handler_registry(&self) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();

        for bundle in &self.bundles {
            let handlers = bundle.handlers();
            debug!(
                bundle = bundle.name(),
                handlers = handlers.len(),
                "Extracting handlers"
            );
            for handler in handlers {
                registry.register(handler);
            }
        }

        registry
    }

    /// Writers of every bundle, in bundle priority order.
    pub fn writers(&self) -> Vec<Arc<dyn OutputWriter>> {
        self.bundles.iter().flat_map(|b| b.writers()).collect()
    }

    /// Get the names of all registered bundles.
    pub fn bundle_names(&self) -> Vec<&'static str> {
        self.bundles.iter().map(|b| b.name()).collect()
    }

    /// Earliest start block among the registered bundles.
    pub fn start_block(&self) -> u64 {
        self.bundles.iter().map(|b| b.start_block()).min().unwrap_or(0)
    }

    /// SS58 network shared by every registered bundle.
    ///
    /// None when no bundle is registered or when bundles read chains with
    /// different address formats.
    pub fn default_ss58_network(&self) -> Option<&'static str> {
        let mut networks = self.bundles.iter().map(|b| b.default_ss58_network());
        let first = networks.next()?;
        networks.all(|n| n == first).then_some(first)
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Deduplicated list of the tables owned by all bundles.
    pub fn tables_to_purge(&self) -> Vec<&'static str> {
        let mut tables: Vec<&'static str> = self
            .bundles
            .iter()
            .flat_map(|b| b.tables_to_purge().iter().copied())
            .collect();
        tables.sort();
        tables.dedup();
        tables
    }

    /// Truncate all bundle-owned tables.
    ///
    /// Returns the number of tables truncated.
    pub async fn purge_tables(&self, pool: &PgPool) -> StorageResult<usize> {
        let tables = self.tables_to_purge();
        if tables.is_empty() {
            return Ok(0);
        }

        // Table names can't be parameterized; they are compile-time constants
        let query = format!("TRUNCATE {} CASCADE", tables.join(", "));
        debug!(tables = ?tables, "Truncating bundle tables");
        sqlx::raw_sql(&query)
            .execute(pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(tables.len())
    }
}

impl Default for BundleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn apply_migration(
    pool: &PgPool,
    bundle: &str,
    index: usize,
    migration: &str,
    checksum: &str,
) -> StorageResult<()> {
    let migration_err = |e: sqlx::Error| {
        StorageError::MigrationError(format!("{} migration {}: {}", bundle, index, e))
    };

    let mut tx = pool.begin().await.map_err(migration_err)?;
    sqlx::raw_sql(migration)
        .execute(&mut *tx)
        .await
        .map_err(migration_err)?;
    sqlx::query(
        "INSERT INTO bundle_migrations (bundle_name, migration_index, checksum) VALUES ($1, $2, $3)",
    )
    .bind(bundle)
    .bind(index as i32)
    .bind(checksum)
    .execute(&mut *tx)
    .await
    .map_err(migration_err)?;
    tx.commit().await.map_err(migration_err)
}

/// sha256 of the migration content, hex encoded.
fn compute_checksum(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use sluice_core::decoding::ItemKind;
    use sluice_core::error::DomainResult;
    use sluice_core::ports::{BatchContext, BatchHandler, HandlerOutputs, ItemSelector, Selection};

    struct MockHandler(&'static str, i32);

    #[async_trait]
    impl BatchHandler for MockHandler {
        fn name(&self) -> &'static str {
            self.0
        }
        fn priority(&self) -> i32 {
            self.1
        }
        fn selection(&self) -> Selection {
            Selection::new().with(ItemSelector::event(ItemKind::event("Balances", "Transfer")))
        }
        async fn handle_batch(&self, _: &BatchContext<'_>) -> DomainResult<HandlerOutputs> {
            Ok(HandlerOutputs::new())
        }
    }

    struct MockBundle {
        name: &'static str,
        priority: i32,
        tables: &'static [&'static str],
    }

    fn bundle(name: &'static str, priority: i32, tables: &'static [&'static str]) -> Box<MockBundle> {
        Box::new(MockBundle { name, priority, tables })
    }

    struct LateBundle(u64);

    impl ProcessorBundle for LateBundle {
        fn name(&self) -> &'static str {
            "late"
        }
        fn handlers(&self) -> Vec<Arc<dyn BatchHandler>> {
            Vec::new()
        }
        fn writers(&self) -> Vec<Arc<dyn OutputWriter>> {
            Vec::new()
        }
        fn start_block(&self) -> u64 {
            self.0
        }
    }

    struct ChainBundle(&'static str, &'static str);

    impl ProcessorBundle for ChainBundle {
        fn name(&self) -> &'static str {
            self.0
        }
        fn handlers(&self) -> Vec<Arc<dyn BatchHandler>> {
            Vec::new()
        }
        fn writers(&self) -> Vec<Arc<dyn OutputWriter>> {
            Vec::new()
        }
        fn default_ss58_network(&self) -> &'static str {
            self.1
        }
    }

    impl ProcessorBundle for MockBundle {
        fn name(&self) -> &'static str {
            self.name
        }
        fn handlers(&self) -> Vec<Arc<dyn BatchHandler>> {
            vec![Arc::new(MockHandler(self.name, self.priority))]
        }
        fn writers(&self) -> Vec<Arc<dyn OutputWriter>> {
            Vec::new()
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn tables_to_purge(&self) -> &'static [&'static str] {
            self.tables
        }
    }

    // Test critique: les handlers sont extraits dans l'ordre de priorité des bundles
    #[test]
    fn test_bundle_to_handler_registry_extraction() {
        let mut registry = BundleRegistry::new();
        registry.register(bundle("identity", 0, &["identity_account"]));
        registry.register(bundle("balances", 100, &["account", "transfer"]));

        assert_eq!(registry.bundle_names(), vec!["balances", "identity"]);
        let handlers = registry.handler_registry();
        assert_eq!(handlers.registered(), vec!["balances", "identity"]);
    }

    #[test]
    fn test_tables_to_purge_dedup() {
        let mut registry = BundleRegistry::new();
        registry.register(bundle("a", 0, &["transfer", "account"]));
        registry.register(bundle("b", 0, &["account"]));
        assert_eq!(registry.tables_to_purge(), vec!["account", "transfer"]);
    }

    #[test]
    fn test_start_block_is_earliest_bundle() {
        let mut registry = BundleRegistry::new();
        assert_eq!(registry.start_block(), 0);

        registry.register(Box::new(LateBundle(13_000_000)));
        assert_eq!(registry.start_block(), 13_000_000);

        registry.register(bundle("balances", 100, &[]));
        assert_eq!(registry.start_block(), 0);
    }

    // Test critique: checksum déterministe pour tracking des migrations
    #[test]
    fn test_migration_checksum_stability() {
        let sql = "CREATE TABLE transfer (id TEXT PRIMARY KEY);";
        assert_eq!(compute_checksum(sql), compute_checksum(sql));
        assert_eq!(compute_checksum(sql).len(), 64);

        // Un changement minime doit changer le checksum
        let modified = "CREATE TABLE transfer (id VARCHAR PRIMARY KEY);";
        assert_ne!(compute_checksum(sql), compute_checksum(modified));
        assert_eq!(
            compute_checksum("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_default_ss58_network_needs_agreement() {
        let mut registry = BundleRegistry::new();
        assert_eq!(registry.default_ss58_network(), None);

        registry.register(Box::new(ChainBundle("balances", "kusama")));
        registry.register(Box::new(ChainBundle("remark", "kusama")));
        assert_eq!(registry.default_ss58_network(), Some("kusama"));

        // Polkadot et Kusama n'ont pas le même format d'adresse
        registry.register(Box::new(ChainBundle("staking", "polkadot")));
        assert_eq!(registry.default_ss58_network(), None);
    }
}
