//! GraphQL types and queries for the contracts bundle.

use std::sync::Arc;

use async_graphql::{Context, Object, Result};
use chrono::{DateTime, Utc};

use sluice_graphql::{validate_filter_string, validate_pagination_first};

use super::models::InkTransfer as InkTransferModel;
use super::storage::ContractsStorage;

/// A transfer of the ink! ERC-20 token.
#[derive(async_graphql::SimpleObject)]
pub struct InkTransfer {
    pub id: String,
    /// Empty on mint.
    #[graphql(name = "from")]
    pub sender: Option<String>,
    /// Empty on burn.
    pub to: Option<String>,
    /// Amount as a decimal string.
    pub amount: String,
    pub block_number: i64,
    pub timestamp: DateTime<Utc>,
}

impl From<InkTransferModel> for InkTransfer {
    fn from(t: InkTransferModel) -> Self {
        Self {
            id: t.id,
            sender: t.from_id,
            to: t.to_id,
            amount: t.amount.to_string(),
            block_number: t.block_number as i64,
            timestamp: t.timestamp,
        }
    }
}

#[derive(Default)]
pub struct ContractsQuery;

#[Object]
impl ContractsQuery {
    /// Latest token transfers, optionally for one account.
    async fn ink_transfers<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        account: Option<String>,
        #[graphql(default = 20)] first: Option<i32>,
    ) -> Result<Vec<InkTransfer>> {
        validate_filter_string(&account, "account")?;
        let contracts = ctx.data::<Arc<dyn ContractsStorage>>()?;

        let limit = validate_pagination_first(first) as i64;
        let transfers = contracts.list_transfers(account.as_deref(), limit).await?;
        Ok(transfers.into_iter().map(InkTransfer::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_graphql::{EmptyMutation, EmptySubscription, Schema};
    use async_trait::async_trait;
    use sluice_core::error::StorageResult;

    use crate::contracts::models::InkAccount;

    struct MintOnly;

    #[async_trait]
    impl ContractsStorage for MintOnly {
        async fn get_accounts(&self, _: &[String]) -> StorageResult<Vec<InkAccount>> {
            Ok(Vec::new())
        }

        async fn list_transfers(&self, _: Option<&str>, limit: i64) -> StorageResult<Vec<InkTransferModel>> {
            assert_eq!(limit, 20);
            Ok(vec![InkTransferModel {
                id: "0000000042-000001-0a1b2".to_string(),
                from_id: None,
                to_id: Some("ZAP5o2".to_string()),
                amount: 1_000,
                block_number: 42,
                timestamp: DateTime::from_timestamp(1_650_000_000, 0).unwrap(),
            }])
        }
    }

    #[tokio::test]
    async fn test_mint_has_null_from() {
        let storage: Arc<dyn ContractsStorage> = Arc::new(MintOnly);
        let schema = Schema::build(ContractsQuery, EmptyMutation, EmptySubscription)
            .data(storage)
            .finish();

        let response = schema.execute("{ inkTransfers { id from to amount blockNumber } }").await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);

        let data = response.data.into_json().unwrap();
        let transfer = &data["inkTransfers"][0];
        assert!(transfer["from"].is_null());
        assert_eq!(transfer["to"], "ZAP5o2");
        assert_eq!(transfer["amount"], "1000");
        assert_eq!(transfer["blockNumber"], 42);
    }
}
