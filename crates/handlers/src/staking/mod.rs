//! Staking bundle.
//!
//! Records every era of a Polkadot-like chain together with the exposure
//! of each validator at the era's first block. All data comes from
//! storage reads; `Grandpa.NewAuthorities` only marks candidate blocks.
//!
//! # Database Tables
//!
//! - `era` - One row per era
//! - `era_validator` - Validator exposures, nominators as JSONB

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

pub use graphql::StakingQuery;
pub use handler::StakingHandler;
pub use models::{Era, EraValidator, Nomination};
pub use storage::{MIGRATIONS, PgStakingStorage, StakingStorage, StakingWriter};

pub(crate) const BUNDLE: &str = "staking";
pub(crate) const ERAS: &str = "eras";
pub(crate) const ERA_VALIDATORS: &str = "era_validators";

/// Processor bundle for staking eras.
pub struct StakingBundle {
    storage: Arc<PgStakingStorage>,
}

impl StakingBundle {
    pub fn new(pool: PgPool) -> Self {
        Self {
            storage: Arc::new(PgStakingStorage::new(pool)),
        }
    }

    pub fn storage(&self) -> Arc<dyn StakingStorage> {
        self.storage.clone()
    }
}

impl ProcessorBundle for StakingBundle {
    fn name(&self) -> &'static str {
        BUNDLE
    }

    fn default_ss58_network(&self) -> &'static str {
        "polkadot"
    }

    fn handlers(&self) -> Vec<Arc<dyn BatchHandler>> {
        vec![Arc::new(StakingHandler)]
    }

    fn writers(&self) -> Vec<Arc<dyn OutputWriter>> {
        vec![Arc::new(StakingWriter)]
    }

    fn migrations(&self) -> &'static [&'static str] {
        MIGRATIONS
    }

    fn tables_to_purge(&self) -> &'static [&'static str] {
        &["era_validator", "era"]
    }
}
