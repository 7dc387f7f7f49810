//! Remark bundle.
//!
//! Follows RMRK 2.0.0 NFTs on Kusama from the `System.remark` calls that
//! mint, send, buy and burn them.
//!
//! # Database Tables
//!
//! - `rmrk_account` - NFT owners
//! - `rmrk_nft` - NFTs with their owner and optional parent NFT

pub mod graphql;
mod handler;
pub mod models;
pub mod rmrk;
pub mod storage;
pub mod versions;

use std::sync::Arc;

use sqlx::PgPool;

use sluice_core::ports::BatchHandler;
use sluice_storage::OutputWriter;

use crate::ProcessorBundle;

pub use graphql::RemarkQuery;
pub use handler::RemarkHandler;
pub use models::{RmrkAccount, RmrkNft};
pub use storage::{MIGRATIONS, PgRemarkStorage, RemarkStorage, RemarkWriter};

pub(crate) const BUNDLE: &str = "remark";
pub(crate) const ACCOUNTS: &str = "accounts";
pub(crate) const NFTS: &str = "nfts";
pub(crate) const BURNED: &str = "burned";

/// First Kusama block worth scanning for RMRK 2.0.0.
pub const START_BLOCK: u64 = 13_000_000;

pub struct RemarkBundle {
    storage: Arc<PgRemarkStorage>,
}

impl RemarkBundle {
    pub fn new(pool: PgPool) -> Self {
        Self {
            storage: Arc::new(PgRemarkStorage::new(pool)),
        }
    }

    pub fn storage(&self) -> Arc<dyn RemarkStorage> {
        self.storage.clone()
    }
}

impl ProcessorBundle for RemarkBundle {
    fn name(&self) -> &'static str {
        BUNDLE
    }

    fn default_ss58_network(&self) -> &'static str {
        "kusama"
    }

    fn handlers(&self) -> Vec<Arc<dyn BatchHandler>> {
        vec![Arc::new(RemarkHandler::new(self.storage.clone(), START_BLOCK))]
    }

    fn writers(&self) -> Vec<Arc<dyn OutputWriter>> {
        vec![Arc::new(RemarkWriter)]
    }

    fn migrations(&self) -> &'static [&'static str] {
        MIGRATIONS
    }

    fn start_block(&self) -> u64 {
        START_BLOCK
    }

    fn tables_to_purge(&self) -> &'static [&'static str] {
        &["rmrk_nft", "rmrk_account"]
    }
}
