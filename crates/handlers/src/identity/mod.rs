//! Identity bundle.
//!
//! Follows `Identity.set_identity` and `Identity.clear_indentity` calls and
//! keeps the current identity fields of each signer.

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

pub use graphql::IdentityQuery;
pub use handler::IdentityHandler;
pub use models::IdentityAccount;
pub use storage::{IdentityStorage, IdentityWriter, MIGRATIONS, PgIdentityStorage};

pub(crate) const BUNDLE: &str = "identity";
pub(crate) const ACCOUNTS: &str = "accounts";

/// Processor bundle for account identities.
pub struct IdentityBundle {
    storage: Arc<PgIdentityStorage>,
}

impl IdentityBundle {
    pub fn new(pool: PgPool) -> Self {
        Self {
            storage: Arc::new(PgIdentityStorage::new(pool)),
        }
    }

    pub fn storage(&self) -> Arc<dyn IdentityStorage> {
        self.storage.clone()
    }
}

impl ProcessorBundle for IdentityBundle {
    fn name(&self) -> &'static str {
        BUNDLE
    }

    fn default_ss58_network(&self) -> &'static str {
        "kusama"
    }

    fn handlers(&self) -> Vec<Arc<dyn BatchHandler>> {
        vec![Arc::new(IdentityHandler::new(self.storage.clone()))]
    }

    fn writers(&self) -> Vec<Arc<dyn OutputWriter>> {
        vec![Arc::new(IdentityWriter)]
    }

    fn migrations(&self) -> &'static [&'static str] {
        MIGRATIONS
    }

    fn tables_to_purge(&self) -> &'static [&'static str] {
        &["identity_account"]
    }
}
