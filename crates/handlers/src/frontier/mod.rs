//! Frontier bundle.
//!
//! Indexes an ERC-721 contract deployed on a Frontier (EVM) parachain:
//! tokens, their owners and every transfer.
//!
//! # Database Tables
//!
//! - `evm_contract` - The indexed contract
//! - `evm_owner` - Holders with their token count
//! - `evm_token` - Tokens with URI and current owner
//! - `evm_transfer` - Transfers with the Ethereum transaction hash

pub mod erc721;
mod handler;
pub mod graphql;
pub mod models;
pub mod storage;
pub mod versions;

use std::sync::Arc;

use sqlx::PgPool;

use sluice_core::models::H160;
use sluice_core::ports::BatchHandler;
use sluice_storage::OutputWriter;

use crate::ProcessorBundle;

pub use graphql::FrontierQuery;
pub use handler::{ContractInfo, FrontierHandler};
pub use models::{Contract, EvmTransfer, Owner, Token};
pub use storage::{FrontierStorage, FrontierWriter, MIGRATIONS, PgFrontierStorage};

pub(crate) const BUNDLE: &str = "frontier";
pub(crate) const CONTRACTS: &str = "contracts";
pub(crate) const OWNERS: &str = "owners";
pub(crate) const TOKENS: &str = "tokens";
pub(crate) const TRANSFERS: &str = "transfers";

/// Moonsama on Moonriver, `0xb654611f84a8dc429ba3cb4fda9fad236c505a1a`.
pub const MOONSAMA: ContractInfo = ContractInfo {
    address: H160([
        0xb6, 0x54, 0x61, 0x1f, 0x84, 0xa8, 0xdc, 0x42, 0x9b, 0xa3, 0xcb, 0x4f, 0xda, 0x9f, 0xad,
        0x23, 0x6c, 0x50, 0x5a, 0x1a,
    ]),
    name: "Moonsama",
    symbol: "MSAMA",
    total_supply: 1000,
};

/// Processor bundle for one ERC-721 contract.
pub struct FrontierBundle {
    storage: Arc<PgFrontierStorage>,
    contract: ContractInfo,
}

impl FrontierBundle {
    /// Bundle for [`MOONSAMA`].
    pub fn new(pool: PgPool) -> Self {
        Self::with_contract(pool, MOONSAMA)
    }

    pub fn with_contract(pool: PgPool, contract: ContractInfo) -> Self {
        Self {
            storage: Arc::new(PgFrontierStorage::new(pool)),
            contract,
        }
    }

    pub fn storage(&self) -> Arc<dyn FrontierStorage> {
        self.storage.clone()
    }
}

impl ProcessorBundle for FrontierBundle {
    fn name(&self) -> &'static str {
        BUNDLE
    }

    fn default_ss58_network(&self) -> &'static str {
        "moonriver"
    }

    fn handlers(&self) -> Vec<Arc<dyn BatchHandler>> {
        vec![Arc::new(FrontierHandler::new(
            self.storage.clone(),
            self.contract.clone(),
        ))]
    }

    fn writers(&self) -> Vec<Arc<dyn OutputWriter>> {
        vec![Arc::new(FrontierWriter)]
    }

    fn migrations(&self) -> &'static [&'static str] {
        MIGRATIONS
    }

    fn tables_to_purge(&self) -> &'static [&'static str] {
        &["evm_transfer", "evm_token", "evm_owner", "evm_contract"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moonsama_address() {
        assert_eq!(MOONSAMA.address.to_hex(), "0xb654611f84a8dc429ba3cb4fda9fad236c505a1a");
    }
}
