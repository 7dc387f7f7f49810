//! Balances bundle.
//!
//! Indexes `Balances.Transfer` on Kusama into accounts and transfers, and
//! serves the `transfersDayData` aggregate.
//!
//! # Database Tables
//!
//! - `account` - Every address seen in a transfer
//! - `transfer` - One row per transfer event
//!
//! # Usage
//!
//! ```ignore
//! use sluice_handlers::{BalancesBundle, BundleRegistry};
//!
//! let mut registry = BundleRegistry::new();
//! registry.register(Box::new(BalancesBundle::new(pool)));
//! ```

mod handler;
pub mod graphql;
pub mod models;
pub mod storage;
pub mod versions;

use std::sync::Arc;

use sqlx::PgPool;

use sluice_core::ports::BatchHandler;
use sluice_storage::OutputWriter;

use crate::ProcessorBundle;

pub use graphql::BalancesQuery;
pub use handler::BalancesHandler;
pub use models::{Account, Transfer, TransfersDayData};
pub use storage::{BalancesStorage, BalancesWriter, MIGRATIONS, PgBalancesStorage, TransferFilter};

pub(crate) const BUNDLE: &str = "balances";
pub(crate) const ACCOUNTS: &str = "accounts";
pub(crate) const TRANSFERS: &str = "transfers";

/// Processor bundle for balance transfers.
pub struct BalancesBundle {
    storage: Arc<PgBalancesStorage>,
}

impl BalancesBundle {
    pub fn new(pool: PgPool) -> Self {
        Self {
            storage: Arc::new(PgBalancesStorage::new(pool)),
        }
    }

    /// Storage handle for the GraphQL layer.
    pub fn storage(&self) -> Arc<dyn BalancesStorage> {
        self.storage.clone()
    }
}

impl ProcessorBundle for BalancesBundle {
    fn name(&self) -> &'static str {
        BUNDLE
    }

    fn default_ss58_network(&self) -> &'static str {
        "kusama"
    }

    fn handlers(&self) -> Vec<Arc<dyn BatchHandler>> {
        vec![Arc::new(BalancesHandler::new(self.storage.clone()))]
    }

    fn writers(&self) -> Vec<Arc<dyn OutputWriter>> {
        vec![Arc::new(BalancesWriter)]
    }

    fn migrations(&self) -> &'static [&'static str] {
        MIGRATIONS
    }

    fn priority(&self) -> i32 {
        100
    }

    fn tables_to_purge(&self) -> &'static [&'static str] {
        &["transfer", "account"]
    }
}
