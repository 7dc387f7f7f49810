//! GraphQL types and queries for the balances bundle.

use std::sync::Arc;

use async_graphql::{Context, Object, Result};
use chrono::{DateTime, NaiveDate, Utc};

use sluice_core::ports::{Cursor, Pagination};
use sluice_graphql::{Order, define_connection, validate_filter_string, validate_id, validate_pagination_first};

use super::models::{Transfer as TransferModel, TransfersDayData as DayDataModel};
use super::storage::{BalancesStorage, TransferFilter};

/// Transfer type.
#[derive(async_graphql::SimpleObject)]
pub struct Transfer {
    pub id: String,
    pub block_number: i64,
    pub timestamp: DateTime<Utc>,
    pub extrinsic_hash: Option<String>,
    pub call: Option<String>,
    /// Sender address.
    #[graphql(name = "from")]
    pub sender: String,
    /// Recipient address.
    pub to: String,
    pub amount: String,
    pub fee: Option<String>,
}

impl From<TransferModel> for Transfer {
    fn from(t: TransferModel) -> Self {
        Self {
            id: t.id,
            block_number: t.block_number as i64,
            timestamp: t.timestamp,
            extrinsic_hash: t.extrinsic_hash,
            call: t.call,
            sender: t.from_id,
            to: t.to_id,
            amount: t.amount.to_string(),
            fee: t.fee.map(|f| f.to_string()),
        }
    }
}

define_connection!(Transfer, TransferModel, TransferEdge, TransferConnection);

/// Transfer volume of one day.
#[derive(async_graphql::SimpleObject)]
pub struct TransfersDayData {
    pub day: NaiveDate,
    /// Sum of amounts, as a decimal string.
    pub volume: String,
    pub count: i64,
}

impl From<DayDataModel> for TransfersDayData {
    fn from(d: DayDataModel) -> Self {
        Self {
            day: d.day,
            volume: d.volume.to_string(),
            count: d.count,
        }
    }
}

/// GraphQL query root for the balances bundle.
///
/// This can be merged with other query types using `#[derive(MergedObject)]`.
#[derive(Default)]
pub struct BalancesQuery;

#[Object]
impl BalancesQuery {
    /// Get a transfer by ID.
    async fn transfer<'ctx>(&self, ctx: &Context<'ctx>, id: String) -> Result<Option<Transfer>> {
        validate_id(&id, "id")?;
        let balances = ctx.data::<Arc<dyn BalancesStorage>>()?;

        let transfer = balances.get_transfer(&id).await?;
        Ok(transfer.map(Transfer::from))
    }

    /// List transfers, optionally those involving one account.
    async fn transfers<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        #[graphql(default = 20)] first: Option<i32>,
        after: Option<String>,
        account: Option<String>,
        #[graphql(default)] order: Order,
    ) -> Result<TransferConnection> {
        validate_filter_string(&account, "account")?;
        validate_filter_string(&after, "after")?;
        let balances = ctx.data::<Arc<dyn BalancesStorage>>()?;

        let pagination = Pagination {
            first: Some(validate_pagination_first(first)),
            after: after.map(|value| Cursor { value }),
        };

        let connection = balances
            .list_transfers(TransferFilter { account }, pagination, order.into())
            .await?;

        Ok(TransferConnection::from(connection))
    }

    /// Daily transfer volume and count, latest day first.
    async fn transfers_day_data<'ctx>(&self, ctx: &Context<'ctx>) -> Result<Vec<TransfersDayData>> {
        let balances = ctx.data::<Arc<dyn BalancesStorage>>()?;
        let days = balances.transfers_day_data().await?;
        Ok(days.into_iter().map(TransfersDayData::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_graphql::{EmptyMutation, EmptySubscription, Schema};
    use async_trait::async_trait;
    use sluice_core::error::StorageResult;
    use sluice_core::ports::{Connection, OrderDirection};
    use std::sync::Mutex;

    use crate::balances::models::Account;

    #[derive(Default)]
    struct DayStorage {
        last_filter: Mutex<Option<(Option<String>, i64, OrderDirection)>>,
    }

    #[async_trait]
    impl BalancesStorage for DayStorage {
        async fn get_accounts(&self, _: &[String]) -> StorageResult<Vec<Account>> {
            Ok(Vec::new())
        }

        async fn get_transfer(&self, id: &str) -> StorageResult<Option<TransferModel>> {
            Ok(Some(TransferModel {
                id: id.to_string(),
                block_number: 1_000,
                timestamp: DateTime::from_timestamp(1_600_000_000, 0).unwrap(),
                extrinsic_hash: None,
                call: Some("Balances.transfer".to_string()),
                from_id: "HNZata".to_string(),
                to_id: "FxtnD4".to_string(),
                amount: 5,
                fee: None,
            }))
        }

        async fn list_transfers(
            &self,
            filter: TransferFilter,
            pagination: Pagination,
            order: OrderDirection,
        ) -> StorageResult<Connection<TransferModel>> {
            *self.last_filter.lock().unwrap() = Some((filter.account, pagination.limit(20), order));
            Ok(Connection::from_rows(Vec::new(), pagination.limit(20), false, |t: &TransferModel| {
                t.id.clone()
            }))
        }

        async fn transfers_day_data(&self) -> StorageResult<Vec<DayDataModel>> {
            Ok(vec![
                DayDataModel {
                    day: NaiveDate::from_ymd_opt(2022, 11, 18).unwrap(),
                    volume: u128::MAX,
                    count: 3,
                },
                DayDataModel {
                    day: NaiveDate::from_ymd_opt(2022, 11, 17).unwrap(),
                    volume: 10,
                    count: 1,
                },
            ])
        }
    }

    fn schema(storage: Arc<DayStorage>) -> Schema<BalancesQuery, EmptyMutation, EmptySubscription> {
        let storage: Arc<dyn BalancesStorage> = storage;
        Schema::build(BalancesQuery, EmptyMutation, EmptySubscription)
            .data(storage)
            .finish()
    }

    #[tokio::test]
    async fn test_transfers_day_data_query() {
        let response = schema(Arc::new(DayStorage::default()))
            .execute("{ transfersDayData { day volume count } }")
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);

        let data = response.data.into_json().unwrap();
        let days = data["transfersDayData"].as_array().unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0]["day"], "2022-11-18");
        // Le volume dépasse u64, il reste une chaîne
        assert_eq!(days[0]["volume"], u128::MAX.to_string());
        assert_eq!(days[1]["count"], 1);
    }

    #[tokio::test]
    async fn test_transfers_query_passes_filter() {
        let storage = Arc::new(DayStorage::default());
        let response = schema(storage.clone())
            .execute(r#"{ transfers(first: 500, account: "HNZata", order: ASC) { edges { cursor } pageInfo { hasNextPage } } }"#)
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);

        let (account, limit, order) = storage.last_filter.lock().unwrap().clone().unwrap();
        assert_eq!(account.as_deref(), Some("HNZata"));
        assert_eq!(limit, 100);
        assert_eq!(order, OrderDirection::Asc);
    }

    #[tokio::test]
    async fn test_transfer_rejects_empty_id() {
        let response = schema(Arc::new(DayStorage::default()))
            .execute(r#"{ transfer(id: "") { id } }"#)
            .await;
        assert!(!response.errors.is_empty());
    }

    #[tokio::test]
    async fn test_transfer_exposes_sender_as_from() {
        let response = schema(Arc::new(DayStorage::default()))
            .execute(r#"{ transfer(id: "0000001000-000002-abcde") { id from to amount } }"#)
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);

        let data = response.data.into_json().unwrap();
        assert_eq!(data["transfer"]["from"], "HNZata");
        assert_eq!(data["transfer"]["to"], "FxtnD4");
        assert_eq!(data["transfer"]["amount"], "5");
    }
}
