//! GraphQL API for Sluice processors.
//!
//! Provides a read-only GraphQL endpoint over processed entities.
//!
//! # Building a Schema with Extensions
//!
//! Use `schema_builder` to compose CoreQuery with bundle queries:
//!
//! ```ignore
//! use async_graphql::MergedObject;
//! use sluice_graphql::{schema_builder, CoreQuery};
//! use sluice_handlers::balances::BalancesQuery;
//!
//! #[derive(MergedObject, Default)]
//! struct Query(CoreQuery, BalancesQuery);
//!
//! let schema = schema_builder(Query::default(), cursors, "kusama-transfers")
//!     .data(balances_storage)
//!     .finish();
//! ```

mod schema;
mod server;
mod types;

pub use schema::{
    CoreQuery, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MAX_QUERY_COMPLEXITY, MAX_QUERY_DEPTH, Order,
    PageInfo, ProcessorName, ProcessorStatus, build_core_schema, parse_hash, schema_builder,
    validate_filter_string, validate_id, validate_pagination_first,
};
pub use server::{HealthCheck, ServerConfig, serve_with_shutdown};
pub use types::SluiceSchema;
