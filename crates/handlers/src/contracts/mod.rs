//! Contracts bundle.
//!
//! Indexes transfers of an ink! ERC-20 contract from the events it emits
//! through `pallet-contracts`.
//!
//! # Database Tables
//!
//! - `ink_account` - Token holders
//! - `ink_transfer` - Transfers, with empty sender on mint and empty recipient on burn

pub mod erc20;
pub mod graphql;
mod handler;
pub mod models;
pub mod storage;
pub mod versions;

use std::sync::Arc;

use sqlx::PgPool;

use sluice_core::models::AccountId;
use sluice_core::ports::BatchHandler;
use sluice_storage::OutputWriter;

use crate::ProcessorBundle;

pub use graphql::ContractsQuery;
pub use handler::ContractsHandler;
pub use models::{InkAccount, InkTransfer};
pub use storage::{ContractsStorage, ContractsWriter, MIGRATIONS, PgContractsStorage};

pub(crate) const BUNDLE: &str = "contracts";
pub(crate) const ACCOUNTS: &str = "accounts";
pub(crate) const TRANSFERS: &str = "transfers";

/// ERC-20 example contract on Shibuya.
pub const INK_ERC20: AccountId = AccountId([
    0x52, 0x07, 0x20, 0x2c, 0x27, 0xb6, 0x46, 0xce, 0xeb, 0x29, 0x4c, 0xe5, 0x16, 0xd4, 0x33, 0x4e,
    0xda, 0xfb, 0xd7, 0x71, 0xf8, 0x69, 0x21, 0x5c, 0xb0, 0x70, 0xba, 0x51, 0xdd, 0x7e, 0x2c, 0x72,
]);

pub struct ContractsBundle {
    storage: Arc<PgContractsStorage>,
    contract: AccountId,
}

impl ContractsBundle {
    /// Bundle for [`INK_ERC20`].
    pub fn new(pool: PgPool) -> Self {
        Self::with_contract(pool, INK_ERC20)
    }

    pub fn with_contract(pool: PgPool, contract: AccountId) -> Self {
        Self {
            storage: Arc::new(PgContractsStorage::new(pool)),
            contract,
        }
    }

    pub fn storage(&self) -> Arc<dyn ContractsStorage> {
        self.storage.clone()
    }
}

impl ProcessorBundle for ContractsBundle {
    fn name(&self) -> &'static str {
        BUNDLE
    }

    fn default_ss58_network(&self) -> &'static str {
        "shibuya"
    }

    fn handlers(&self) -> Vec<Arc<dyn BatchHandler>> {
        vec![Arc::new(ContractsHandler::new(self.storage.clone(), self.contract))]
    }

    fn writers(&self) -> Vec<Arc<dyn OutputWriter>> {
        vec![Arc::new(ContractsWriter)]
    }

    fn migrations(&self) -> &'static [&'static str] {
        MIGRATIONS
    }

    fn tables_to_purge(&self) -> &'static [&'static str] {
        &["ink_transfer", "ink_account"]
    }
}
