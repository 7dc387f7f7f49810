//! Storage layer for the balances bundle.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool};

use sluice_core::error::StorageResult;
use sluice_core::ports::{Connection, HandlerOutputs, OrderDirection, Pagination};
use sluice_storage::OutputWriter;
use sluice_storage::postgres::{parse_numeric, parse_optional_numeric, query_error, typed_outputs};

use super::models::{Account, Transfer, TransfersDayData};
use super::{ACCOUNTS, BUNDLE, TRANSFERS};

/// Filter options for transfer queries.
#[derive(Debug, Clone, Default)]
pub struct TransferFilter {
    /// Sender or recipient address.
    pub account: Option<String>,
}

/// Storage trait for balances data.
#[async_trait]
pub trait BalancesStorage: Send + Sync {
    /// Accounts among `ids` that already exist.
    async fn get_accounts(&self, ids: &[String]) -> StorageResult<Vec<Account>>;

    /// Get transfer by ID.
    async fn get_transfer(&self, id: &str) -> StorageResult<Option<Transfer>>;

    /// List transfers with pagination and filtering, ordered by id.
    async fn list_transfers(
        &self,
        filter: TransferFilter,
        pagination: Pagination,
        order: OrderDirection,
    ) -> StorageResult<Connection<Transfer>>;

    /// Volume and count of transfers per day, latest day first.
    async fn transfers_day_data(&self) -> StorageResult<Vec<TransfersDayData>>;
}

/// PostgreSQL implementation of [`BalancesStorage`].
pub struct PgBalancesStorage {
    pool: PgPool,
}

impl PgBalancesStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const TRANSFER_COLUMNS: &str = r#"
    id, block_number, timestamp, extrinsic_hash, call, from_id, to_id,
    amount::TEXT AS amount, fee::TEXT AS fee
"#;

#[async_trait]
impl BalancesStorage for PgBalancesStorage {
    async fn get_accounts(&self, ids: &[String]) -> StorageResult<Vec<Account>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM account WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(rows.into_iter().map(|(id,)| Account { id }).collect())
    }

    async fn get_transfer(&self, id: &str) -> StorageResult<Option<Transfer>> {
        let query = format!("SELECT {} FROM transfer WHERE id = $1", TRANSFER_COLUMNS);
        let row = sqlx::query_as::<_, TransferRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.map(TransferRow::into_transfer).transpose()
    }

    async fn list_transfers(
        &self,
        filter: TransferFilter,
        pagination: Pagination,
        order: OrderDirection,
    ) -> StorageResult<Connection<Transfer>> {
        let limit = pagination.limit(20);
        // Ids sort by position, so the cursor is the last id seen
        let after_op = match order {
            OrderDirection::Asc => ">",
            OrderDirection::Desc => "<",
        };

        let query = format!(
            r#"
            SELECT {}
            FROM transfer
            WHERE ($1::TEXT IS NULL OR from_id = $1 OR to_id = $1)
              AND ($2::TEXT IS NULL OR id {} $2)
            ORDER BY id {}
            LIMIT $3
            "#,
            TRANSFER_COLUMNS,
            after_op,
            order.as_sql()
        );

        let has_previous_page = pagination.after.is_some();
        let rows = sqlx::query_as::<_, TransferRow>(&query)
            .bind(filter.account)
            .bind(pagination.after.map(|c| c.value))
            .bind(limit + 1)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        let transfers = rows
            .into_iter()
            .map(TransferRow::into_transfer)
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(Connection::from_rows(transfers, limit, has_previous_page, |t| t.id.clone()))
    }

    async fn transfers_day_data(&self) -> StorageResult<Vec<TransfersDayData>> {
        let rows: Vec<(NaiveDate, String, i64)> = sqlx::query_as(
            r#"
            SELECT DATE(timestamp) AS day, SUM(amount)::TEXT AS volume, COUNT(*) AS count
            FROM transfer
            GROUP BY day
            ORDER BY day DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.into_iter()
            .map(|(day, volume, count)| {
                Ok(TransfersDayData {
                    day,
                    volume: parse_numeric(&volume, "transfers_day_data.volume")?,
                    count,
                })
            })
            .collect()
    }
}

// =============================================================================
// Batch writer
// =============================================================================

/// Writes accounts, then transfers, inside the batch transaction.
pub struct BalancesWriter;

#[async_trait]
impl OutputWriter for BalancesWriter {
    fn name(&self) -> &'static str {
        BUNDLE
    }

    async fn write(&self, conn: &mut PgConnection, outputs: &HandlerOutputs) -> StorageResult<u64> {
        let accounts: Vec<Account> = typed_outputs(outputs, BUNDLE, ACCOUNTS)?;
        let transfers: Vec<Transfer> = typed_outputs(outputs, BUNDLE, TRANSFERS)?;
        let mut rows = 0;

        for account in &accounts {
            rows += sqlx::query("INSERT INTO account (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
                .bind(&account.id)
                .execute(&mut *conn)
                .await
                .map_err(query_error)?
                .rows_affected();
        }

        for transfer in &transfers {
            rows += sqlx::query(
                r#"
                INSERT INTO transfer (
                    id, block_number, timestamp, extrinsic_hash, call,
                    from_id, to_id, amount, fee
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8::NUMERIC, $9::NUMERIC)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&transfer.id)
            .bind(transfer.block_number as i64)
            .bind(transfer.timestamp)
            .bind(&transfer.extrinsic_hash)
            .bind(&transfer.call)
            .bind(&transfer.from_id)
            .bind(&transfer.to_id)
            .bind(transfer.amount.to_string())
            .bind(transfer.fee.map(|f| f.to_string()))
            .execute(&mut *conn)
            .await
            .map_err(query_error)?
            .rows_affected();
        }

        Ok(rows)
    }
}

// =============================================================================
// Row mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct TransferRow {
    id: String,
    block_number: i64,
    timestamp: DateTime<Utc>,
    extrinsic_hash: Option<String>,
    call: Option<String>,
    from_id: String,
    to_id: String,
    amount: String,
    fee: Option<String>,
}

impl TransferRow {
    fn into_transfer(self) -> StorageResult<Transfer> {
        Ok(Transfer {
            amount: parse_numeric(&self.amount, "transfer.amount")?,
            fee: parse_optional_numeric(self.fee.as_deref(), "transfer.fee")?,
            id: self.id,
            block_number: self.block_number as u64,
            timestamp: self.timestamp,
            extrinsic_hash: self.extrinsic_hash,
            call: self.call,
            from_id: self.from_id,
            to_id: self.to_id,
        })
    }
}

/// SQL migrations for the balances bundle.
/// Each migration is tracked and only executed once.
pub const MIGRATIONS: &[&str] = &[
    // Migration 0: accounts and transfers
    r#"
CREATE TABLE account (
    id TEXT PRIMARY KEY
);

CREATE TABLE transfer (
    id TEXT PRIMARY KEY,
    block_number BIGINT NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL,
    extrinsic_hash TEXT,
    call TEXT,
    from_id TEXT NOT NULL REFERENCES account(id),
    to_id TEXT NOT NULL REFERENCES account(id),
    amount NUMERIC(39, 0) NOT NULL,
    fee NUMERIC(39, 0)
);

CREATE INDEX idx_transfer_block ON transfer(block_number);
CREATE INDEX idx_transfer_timestamp ON transfer(timestamp);
CREATE INDEX idx_transfer_extrinsic ON transfer(extrinsic_hash);
CREATE INDEX idx_transfer_from ON transfer(from_id);
CREATE INDEX idx_transfer_to ON transfer(to_id);
"#,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_mapping_keeps_large_amounts() {
        let row = TransferRow {
            id: "0000000001-000001-abcde".into(),
            block_number: 1,
            timestamp: Utc::now(),
            extrinsic_hash: None,
            call: None,
            from_id: "a".into(),
            to_id: "b".into(),
            amount: u128::MAX.to_string(),
            fee: Some("125000000".into()),
        };
        let transfer = row.into_transfer().unwrap();
        assert_eq!(transfer.amount, u128::MAX);
        assert_eq!(transfer.fee, Some(125_000_000));
    }

    #[test]
    fn test_row_mapping_rejects_bad_numeric() {
        let row = TransferRow {
            id: "x".into(),
            block_number: 1,
            timestamp: Utc::now(),
            extrinsic_hash: None,
            call: None,
            from_id: "a".into(),
            to_id: "b".into(),
            amount: "1.5".into(),
            fee: None,
        };
        assert!(row.into_transfer().is_err());
    }
}
