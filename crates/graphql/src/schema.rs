//! GraphQL schema definition.
//!
//! This module provides the core GraphQL schema shared by every processor:
//! processor status plus the pagination and validation helpers bundle
//! queries build on.

use std::sync::Arc;

use async_graphql::{
    Context, EmptyMutation, EmptySubscription, Object, Result, Schema, SchemaBuilder,
};
use chrono::{DateTime, Utc};

use sluice_core::ports::{CursorRepository, OrderDirection};

use crate::types::SluiceSchema;

// -----------------------------------------------------------------------------
// Schema Configuration
// -----------------------------------------------------------------------------

/// Maximum query depth to prevent deeply nested queries (DoS protection).
/// Note: GraphQL introspection requires depth ~13, so we use 15 to allow it.
pub const MAX_QUERY_DEPTH: usize = 15;

/// Maximum query complexity score (DoS protection).
/// Each field has a default complexity of 1, nested objects multiply.
pub const MAX_QUERY_COMPLEXITY: usize = 500;

/// Name of the processor whose cursor `status` reports by default.
#[derive(Debug, Clone)]
pub struct ProcessorName(pub String);

// -----------------------------------------------------------------------------
// Schema Builder
// -----------------------------------------------------------------------------

/// Build a GraphQL schema with just the core query.
pub fn build_core_schema(cursors: Arc<dyn CursorRepository>, processor: &str) -> SluiceSchema {
    Schema::build(CoreQuery, EmptyMutation, EmptySubscription)
        .data(cursors)
        .data(ProcessorName(processor.to_string()))
        .limit_depth(MAX_QUERY_DEPTH)
        .limit_complexity(MAX_QUERY_COMPLEXITY)
        .finish()
}

/// Create a schema builder for a merged query type.
///
/// Bundle storages are added with `.data(..)`. Remember to call
/// `.limit_depth()` and `.limit_complexity()` before `.finish()`.
///
/// # Example
///
/// ```ignore
/// use async_graphql::MergedObject;
/// use sluice_graphql::{schema_builder, CoreQuery, MAX_QUERY_DEPTH, MAX_QUERY_COMPLEXITY};
/// use sluice_handlers::balances::BalancesQuery;
///
/// #[derive(MergedObject, Default)]
/// struct Query(CoreQuery, BalancesQuery);
///
/// let schema = schema_builder(Query::default(), cursors, "kusama-transfers")
///     .data(balances_storage)
///     .limit_depth(MAX_QUERY_DEPTH)
///     .limit_complexity(MAX_QUERY_COMPLEXITY)
///     .finish();
/// ```
pub fn schema_builder<Q>(
    query: Q,
    cursors: Arc<dyn CursorRepository>,
    processor: &str,
) -> SchemaBuilder<Q, EmptyMutation, EmptySubscription>
where
    Q: async_graphql::ObjectType + 'static,
{
    Schema::build(query, EmptyMutation, EmptySubscription)
        .data(cursors)
        .data(ProcessorName(processor.to_string()))
}

// -----------------------------------------------------------------------------
// Core Query
// -----------------------------------------------------------------------------

/// Core query root.
///
/// Merged with bundle-specific queries using `#[derive(MergedObject)]`.
#[derive(Default)]
pub struct CoreQuery;

#[Object]
impl CoreQuery {
    /// Progress of a processor (the configured one by default).
    async fn status<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        processor: Option<String>,
    ) -> Result<ProcessorStatus> {
        validate_filter_string(&processor, "processor")?;
        let cursors = ctx.data::<Arc<dyn CursorRepository>>()?;
        let name = match processor {
            Some(name) => name,
            None => ctx.data::<ProcessorName>()?.0.clone(),
        };

        let cursor = cursors.get_cursor(&name).await?;
        Ok(ProcessorStatus {
            processor: name,
            last_processed_block: cursor.as_ref().map(|c| c.last_block as i64),
            last_processed_hash: cursor.as_ref().map(|c| c.last_hash.to_hex()),
            last_updated: cursor.map(|c| c.updated_at),
        })
    }
}

// -----------------------------------------------------------------------------
// GraphQL Types
// -----------------------------------------------------------------------------

/// Ordering direction.
#[derive(async_graphql::Enum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    Desc,
    Asc,
}

impl From<Order> for OrderDirection {
    fn from(order: Order) -> Self {
        match order {
            Order::Asc => OrderDirection::Asc,
            Order::Desc => OrderDirection::Desc,
        }
    }
}

/// Processor status.
#[derive(async_graphql::SimpleObject)]
pub struct ProcessorStatus {
    pub processor: String,
    pub last_processed_block: Option<i64>,
    pub last_processed_hash: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Page information for Relay-style pagination.
#[derive(async_graphql::SimpleObject)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

impl From<sluice_core::ports::PageInfo> for PageInfo {
    fn from(info: sluice_core::ports::PageInfo) -> Self {
        Self {
            has_next_page: info.has_next_page,
            has_previous_page: info.has_previous_page,
            start_cursor: info.start_cursor.map(|c| c.value),
            end_cursor: info.end_cursor.map(|c| c.value),
        }
    }
}

/// Generate Relay-style connection types (Edge + Connection) with From impl.
#[macro_export]
macro_rules! define_connection {
    ($node:ty, $core_model:ty, $edge:ident, $connection:ident) => {
        #[derive(async_graphql::SimpleObject)]
        pub struct $edge {
            pub node: $node,
            pub cursor: String,
        }

        #[derive(async_graphql::SimpleObject)]
        pub struct $connection {
            pub edges: Vec<$edge>,
            pub page_info: $crate::PageInfo,
            pub total_count: Option<i64>,
        }

        impl From<sluice_core::ports::Connection<$core_model>> for $connection {
            fn from(conn: sluice_core::ports::Connection<$core_model>) -> Self {
                Self {
                    edges: conn
                        .edges
                        .into_iter()
                        .map(|e| $edge {
                            node: <$node as From<$core_model>>::from(e.node),
                            cursor: e.cursor.value,
                        })
                        .collect(),
                    page_info: conn.page_info.into(),
                    total_count: conn.total_count,
                }
            }
        }
    };
}

// -----------------------------------------------------------------------------
// Helpers & Validation
// -----------------------------------------------------------------------------

/// Maximum length for hash strings (64 hex chars + "0x" prefix).
const MAX_HASH_LENGTH: usize = 66;
/// Maximum length for string filter parameters.
const MAX_FILTER_STRING_LENGTH: usize = 128;
/// Maximum page size for pagination.
pub const MAX_PAGE_SIZE: i32 = 100;
/// Default page size for pagination.
pub const DEFAULT_PAGE_SIZE: i32 = 20;

/// Parse and validate a 32-byte hash string.
pub fn parse_hash(s: &str) -> Result<[u8; 32]> {
    if s.len() > MAX_HASH_LENGTH {
        return Err(async_graphql::Error::new(format!(
            "Hash too long: maximum {} characters allowed",
            MAX_HASH_LENGTH
        )));
    }

    let s = s.strip_prefix("0x").unwrap_or(s);

    if !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(async_graphql::Error::new(
            "Invalid hash: must contain only hexadecimal characters",
        ));
    }

    let bytes =
        hex::decode(s).map_err(|e| async_graphql::Error::new(format!("Invalid hash: {}", e)))?;

    bytes
        .try_into()
        .map_err(|_| async_graphql::Error::new("Hash must be exactly 32 bytes (64 hex characters)"))
}

/// Validate a filter string parameter (account address, entity id, ...).
pub fn validate_filter_string(s: &Option<String>, field_name: &str) -> Result<()> {
    if let Some(value) = s {
        if value.len() > MAX_FILTER_STRING_LENGTH {
            return Err(async_graphql::Error::new(format!(
                "{} too long: maximum {} characters allowed",
                field_name, MAX_FILTER_STRING_LENGTH
            )));
        }
        if value.is_empty() {
            return Err(async_graphql::Error::new(format!(
                "{} cannot be empty",
                field_name
            )));
        }
    }
    Ok(())
}

/// Validate a required identifier argument.
pub fn validate_id(value: &str, field_name: &str) -> Result<()> {
    validate_filter_string(&Some(value.to_string()), field_name)
}

/// Validate and normalize pagination first parameter.
pub fn validate_pagination_first(first: Option<i32>) -> i32 {
    first.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}
