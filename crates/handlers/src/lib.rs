//! Processor bundles for Sluice.
//!
//! Each bundle is a self-contained processor with its own:
//!
//! - Versioned decoders for the items it selects
//! - Batch handler folding a batch into entities
//! - Writer and forward-only SQL migrations
//! - GraphQL query root
//!
//! # Bundles
//!
//! | Name | Chain | Reads |
//! |------|-------|-------|
//! | `balances` | Kusama | `Balances.Transfer` events |
//! | `identity` | Kusama | `Identity` calls |
//! | `staking` | Polkadot | `Staking` and `Session` storage |
//! | `frontier` | Moonriver | ERC-721 `EVM.Log` events |
//! | `contracts` | Shibuya | ink! ERC-20 events |
//! | `remark` | Kusama | RMRK 2.0.0 remarks |
//!
//! # Registering Bundles
//!
//! ```ignore
//! let mut registry = BundleRegistry::new();
//! for name in ["balances", "identity"] {
//!     registry.register(bundle_by_name(name, pool.clone()).ok_or("unknown bundle")?);
//! }
//!
//! registry.run_migrations(&pool).await?;
//!
//! let handlers = registry.handler_registry();
//! let repositories = PgRepositories::new(db, registry.writers());
//! ```

pub mod balances;
pub mod contracts;
pub mod frontier;
pub mod identity;
pub mod remark;
pub mod staking;
pub mod utils;

mod bundle;
mod registry;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use async_graphql::{MergedObject, SchemaBuilder};
use sqlx::PgPool;

pub use bundle::ProcessorBundle;
pub use registry::BundleRegistry;

pub use balances::BalancesBundle;
pub use contracts::ContractsBundle;
pub use frontier::FrontierBundle;
pub use identity::IdentityBundle;
pub use remark::RemarkBundle;
pub use staking::StakingBundle;

/// Names accepted by [`bundle_by_name`].
pub const BUNDLE_NAMES: &[&str] = &["balances", "identity", "staking", "frontier", "contracts", "remark"];

/// Build a bundle from its name.
pub fn bundle_by_name(name: &str, pool: PgPool) -> Option<Box<dyn ProcessorBundle>> {
    let bundle: Box<dyn ProcessorBundle> = match name {
        "balances" => Box::new(BalancesBundle::new(pool)),
        "identity" => Box::new(IdentityBundle::new(pool)),
        "staking" => Box::new(StakingBundle::new(pool)),
        "frontier" => Box::new(FrontierBundle::new(pool)),
        "contracts" => Box::new(ContractsBundle::new(pool)),
        "remark" => Box::new(RemarkBundle::new(pool)),
        _ => return None,
    };
    Some(bundle)
}

/// Query roots of every bundle.
#[derive(MergedObject, Default)]
pub struct BundleQuery(
    balances::BalancesQuery,
    identity::IdentityQuery,
    staking::StakingQuery,
    frontier::FrontierQuery,
    contracts::ContractsQuery,
    remark::RemarkQuery,
);

/// Add the storage each bundle query reads from.
pub fn with_bundle_storages<Q, M, S>(builder: SchemaBuilder<Q, M, S>, pool: &PgPool) -> SchemaBuilder<Q, M, S> {
    builder
        .data::<Arc<dyn balances::BalancesStorage>>(Arc::new(balances::PgBalancesStorage::new(pool.clone())))
        .data::<Arc<dyn identity::IdentityStorage>>(Arc::new(identity::PgIdentityStorage::new(pool.clone())))
        .data::<Arc<dyn staking::StakingStorage>>(Arc::new(staking::PgStakingStorage::new(pool.clone())))
        .data::<Arc<dyn frontier::FrontierStorage>>(Arc::new(frontier::PgFrontierStorage::new(pool.clone())))
        .data::<Arc<dyn contracts::ContractsStorage>>(Arc::new(contracts::PgContractsStorage::new(pool.clone())))
        .data::<Arc<dyn remark::RemarkStorage>>(Arc::new(remark::PgRemarkStorage::new(pool.clone())))
}
