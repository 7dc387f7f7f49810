//! Storage layer for the contracts bundle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use sluice_core::error::StorageResult;
use sluice_core::ports::HandlerOutputs;
use sluice_storage::OutputWriter;
use sluice_storage::postgres::{parse_numeric, query_error, typed_outputs};

use super::models::{InkAccount, InkTransfer};
use super::{ACCOUNTS, BUNDLE, TRANSFERS};

#[async_trait]
pub trait ContractsStorage: Send + Sync {
    async fn get_accounts(&self, ids: &[String]) -> StorageResult<Vec<InkAccount>>;

    /// Latest transfers first, optionally involving `account`.
    async fn list_transfers(&self, account: Option<&str>, limit: i64) -> StorageResult<Vec<InkTransfer>>;
}

/// PostgreSQL implementation of [`ContractsStorage`].
pub struct PgContractsStorage {
    pool: PgPool,
}

impl PgContractsStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct InkTransferRow {
    id: String,
    from_id: Option<String>,
    to_id: Option<String>,
    amount: String,
    block_number: i64,
    timestamp: DateTime<Utc>,
}

impl InkTransferRow {
    fn into_transfer(self) -> StorageResult<InkTransfer> {
        Ok(InkTransfer {
            amount: parse_numeric(&self.amount, "ink_transfer.amount")?,
            id: self.id,
            from_id: self.from_id,
            to_id: self.to_id,
            block_number: self.block_number.max(0) as u64,
            timestamp: self.timestamp,
        })
    }
}

#[async_trait]
impl ContractsStorage for PgContractsStorage {
    async fn get_accounts(&self, ids: &[String]) -> StorageResult<Vec<InkAccount>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM ink_account WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(rows.into_iter().map(|(id,)| InkAccount { id }).collect())
    }

    async fn list_transfers(&self, account: Option<&str>, limit: i64) -> StorageResult<Vec<InkTransfer>> {
        let rows = sqlx::query_as::<_, InkTransferRow>(
            r#"
            SELECT id, from_id, to_id, amount::TEXT AS amount, block_number, timestamp
            FROM ink_transfer
            WHERE ($1::TEXT IS NULL OR from_id = $1 OR to_id = $1)
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(account)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.into_iter().map(InkTransferRow::into_transfer).collect()
    }
}

/// Writes accounts, then transfers.
pub struct ContractsWriter;

#[async_trait]
impl OutputWriter for ContractsWriter {
    fn name(&self) -> &'static str {
        BUNDLE
    }

    async fn write(&self, conn: &mut PgConnection, outputs: &HandlerOutputs) -> StorageResult<u64> {
        let accounts: Vec<InkAccount> = typed_outputs(outputs, BUNDLE, ACCOUNTS)?;
        let transfers: Vec<InkTransfer> = typed_outputs(outputs, BUNDLE, TRANSFERS)?;
        let mut rows = 0;

        for account in &accounts {
            rows += sqlx::query("INSERT INTO ink_account (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
                .bind(&account.id)
                .execute(&mut *conn)
                .await
                .map_err(query_error)?
                .rows_affected();
        }

        for transfer in &transfers {
            rows += sqlx::query(
                r#"
                INSERT INTO ink_transfer (id, from_id, to_id, amount, block_number, timestamp)
                VALUES ($1, $2, $3, $4::NUMERIC, $5, $6)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&transfer.id)
            .bind(&transfer.from_id)
            .bind(&transfer.to_id)
            .bind(transfer.amount.to_string())
            .bind(transfer.block_number as i64)
            .bind(transfer.timestamp)
            .execute(&mut *conn)
            .await
            .map_err(query_error)?
            .rows_affected();
        }

        Ok(rows)
    }
}

/// SQL migrations for the contracts bundle.
pub const MIGRATIONS: &[&str] = &[r#"
CREATE TABLE IF NOT EXISTS ink_account (
    id TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS ink_transfer (
    id TEXT PRIMARY KEY,
    from_id TEXT REFERENCES ink_account(id),
    to_id TEXT REFERENCES ink_account(id),
    amount NUMERIC(39, 0) NOT NULL,
    block_number BIGINT NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ink_transfer_from ON ink_transfer(from_id);
CREATE INDEX IF NOT EXISTS idx_ink_transfer_to ON ink_transfer(to_id);
CREATE INDEX IF NOT EXISTS idx_ink_transfer_block ON ink_transfer(block_number);
"#];
