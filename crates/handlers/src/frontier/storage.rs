//! Storage layer for the frontier bundle.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use sluice_core::error::StorageResult;
use sluice_core::ports::HandlerOutputs;
use sluice_storage::OutputWriter;
use sluice_storage::postgres::{parse_numeric, query_error, typed_outputs};

use super::models::{Contract, EvmTransfer, Owner, Token};
use super::{BUNDLE, CONTRACTS, OWNERS, TOKENS, TRANSFERS};

/// Storage trait for ERC-721 data.
#[async_trait]
pub trait FrontierStorage: Send + Sync {
    async fn get_contract(&self, id: &str) -> StorageResult<Option<Contract>>;

    async fn get_owners(&self, ids: &[String]) -> StorageResult<Vec<Owner>>;

    async fn get_tokens(&self, ids: &[String]) -> StorageResult<Vec<Token>>;

    async fn get_token(&self, id: &str) -> StorageResult<Option<Token>>;

    /// Tokens currently held by `owner`, by id.
    async fn list_tokens_by_owner(&self, owner: &str) -> StorageResult<Vec<Token>>;
}

/// PostgreSQL implementation of [`FrontierStorage`].
pub struct PgFrontierStorage {
    pool: PgPool,
}

impl PgFrontierStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type TokenRow = (String, Option<String>, String, String);

fn token_from_row((id, uri, contract_id, owner_id): TokenRow) -> Token {
    Token {
        id,
        uri,
        contract_id,
        owner_id,
    }
}

#[async_trait]
impl FrontierStorage for PgFrontierStorage {
    async fn get_contract(&self, id: &str) -> StorageResult<Option<Contract>> {
        let row: Option<(String, String, String, String)> = sqlx::query_as(
            "SELECT id, name, symbol, total_supply::TEXT FROM evm_contract WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.map(|(id, name, symbol, total_supply)| {
            Ok(Contract {
                total_supply: parse_numeric(&total_supply, "evm_contract.total_supply")?,
                id,
                name,
                symbol,
            })
        })
        .transpose()
    }

    async fn get_owners(&self, ids: &[String]) -> StorageResult<Vec<Owner>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT id, balance FROM evm_owner WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(&self.pool)
                .await
                .map_err(query_error)?;

        Ok(rows
            .into_iter()
            .map(|(id, balance)| Owner {
                id,
                balance: balance.max(0) as u64,
            })
            .collect())
    }

    async fn get_tokens(&self, ids: &[String]) -> StorageResult<Vec<Token>> {
        let rows: Vec<TokenRow> = sqlx::query_as(
            "SELECT id, uri, contract_id, owner_id FROM evm_token WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(rows.into_iter().map(token_from_row).collect())
    }

    async fn get_token(&self, id: &str) -> StorageResult<Option<Token>> {
        let row: Option<TokenRow> =
            sqlx::query_as("SELECT id, uri, contract_id, owner_id FROM evm_token WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error)?;

        Ok(row.map(token_from_row))
    }

    async fn list_tokens_by_owner(&self, owner: &str) -> StorageResult<Vec<Token>> {
        let rows: Vec<TokenRow> = sqlx::query_as(
            r#"
            SELECT id, uri, contract_id, owner_id
            FROM evm_token
            WHERE owner_id = $1
            ORDER BY LENGTH(id), id
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(rows.into_iter().map(token_from_row).collect())
    }
}

/// Writes the contract, owners, tokens and transfers, in that order.
pub struct FrontierWriter;

#[async_trait]
impl OutputWriter for FrontierWriter {
    fn name(&self) -> &'static str {
        BUNDLE
    }

    async fn write(&self, conn: &mut PgConnection, outputs: &HandlerOutputs) -> StorageResult<u64> {
        let contracts: Vec<Contract> = typed_outputs(outputs, BUNDLE, CONTRACTS)?;
        let owners: Vec<Owner> = typed_outputs(outputs, BUNDLE, OWNERS)?;
        let tokens: Vec<Token> = typed_outputs(outputs, BUNDLE, TOKENS)?;
        let transfers: Vec<EvmTransfer> = typed_outputs(outputs, BUNDLE, TRANSFERS)?;
        let mut rows = 0;

        for contract in &contracts {
            rows += sqlx::query(
                r#"
                INSERT INTO evm_contract (id, name, symbol, total_supply)
                VALUES ($1, $2, $3, $4::NUMERIC)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&contract.id)
            .bind(&contract.name)
            .bind(&contract.symbol)
            .bind(contract.total_supply.to_string())
            .execute(&mut *conn)
            .await
            .map_err(query_error)?
            .rows_affected();
        }

        for owner in &owners {
            rows += sqlx::query(
                r#"
                INSERT INTO evm_owner (id, balance) VALUES ($1, $2)
                ON CONFLICT (id) DO UPDATE SET balance = EXCLUDED.balance
                "#,
            )
            .bind(&owner.id)
            .bind(owner.balance as i64)
            .execute(&mut *conn)
            .await
            .map_err(query_error)?
            .rows_affected();
        }

        for token in &tokens {
            rows += sqlx::query(
                r#"
                INSERT INTO evm_token (id, uri, contract_id, owner_id) VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO UPDATE SET owner_id = EXCLUDED.owner_id
                "#,
            )
            .bind(&token.id)
            .bind(&token.uri)
            .bind(&token.contract_id)
            .bind(&token.owner_id)
            .execute(&mut *conn)
            .await
            .map_err(query_error)?
            .rows_affected();
        }

        for transfer in &transfers {
            rows += sqlx::query(
                r#"
                INSERT INTO evm_transfer (
                    id, block_number, timestamp, transaction_hash, from_id, to_id, token_id
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&transfer.id)
            .bind(transfer.block_number as i64)
            .bind(transfer.timestamp)
            .bind(&transfer.transaction_hash)
            .bind(&transfer.from_id)
            .bind(&transfer.to_id)
            .bind(&transfer.token_id)
            .execute(&mut *conn)
            .await
            .map_err(query_error)?
            .rows_affected();
        }

        Ok(rows)
    }
}

/// SQL migrations for the frontier bundle.
pub const MIGRATIONS: &[&str] = &[r#"
CREATE TABLE IF NOT EXISTS evm_contract (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    symbol TEXT NOT NULL,
    total_supply NUMERIC(78, 0) NOT NULL
);

CREATE TABLE IF NOT EXISTS evm_owner (
    id TEXT PRIMARY KEY,
    balance BIGINT NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS evm_token (
    id TEXT PRIMARY KEY,
    uri TEXT,
    contract_id TEXT NOT NULL REFERENCES evm_contract(id),
    owner_id TEXT NOT NULL REFERENCES evm_owner(id)
);

CREATE INDEX IF NOT EXISTS idx_evm_token_owner ON evm_token(owner_id);

CREATE TABLE IF NOT EXISTS evm_transfer (
    id TEXT PRIMARY KEY,
    block_number BIGINT NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL,
    transaction_hash TEXT,
    from_id TEXT NOT NULL REFERENCES evm_owner(id),
    to_id TEXT NOT NULL REFERENCES evm_owner(id),
    token_id TEXT NOT NULL REFERENCES evm_token(id)
);

CREATE INDEX IF NOT EXISTS idx_evm_transfer_token ON evm_transfer(token_id);
CREATE INDEX IF NOT EXISTS idx_evm_transfer_from ON evm_transfer(from_id);
CREATE INDEX IF NOT EXISTS idx_evm_transfer_to ON evm_transfer(to_id);
CREATE INDEX IF NOT EXISTS idx_evm_transfer_block ON evm_transfer(block_number);
"#];
