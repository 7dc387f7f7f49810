//! Storage layer for the remark bundle.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use sluice_core::error::StorageResult;
use sluice_core::ports::HandlerOutputs;
use sluice_storage::OutputWriter;
use sluice_storage::postgres::{query_error, typed_outputs};

use super::models::{RmrkAccount, RmrkNft};
use super::{ACCOUNTS, BUNDLE, BURNED, NFTS};

#[async_trait]
pub trait RemarkStorage: Send + Sync {
    async fn get_accounts(&self, ids: &[String]) -> StorageResult<Vec<RmrkAccount>>;

    async fn get_nfts(&self, ids: &[String]) -> StorageResult<Vec<RmrkNft>>;

    async fn get_nft(&self, id: &str) -> StorageResult<Option<RmrkNft>>;

    async fn list_nfts_by_owner(&self, owner: &str) -> StorageResult<Vec<RmrkNft>>;
}

/// PostgreSQL implementation of [`RemarkStorage`].
pub struct PgRemarkStorage {
    pool: PgPool,
}

impl PgRemarkStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct NftRow {
    id: String,
    symbol: Option<String>,
    transferable: Option<bool>,
    collection: String,
    issuer: Option<String>,
    sn: Option<String>,
    metadata: Option<String>,
    owner_id: Option<String>,
    parent_id: Option<String>,
}

impl From<NftRow> for RmrkNft {
    fn from(r: NftRow) -> Self {
        Self {
            id: r.id,
            symbol: r.symbol,
            transferable: r.transferable,
            collection: r.collection,
            issuer: r.issuer,
            sn: r.sn,
            metadata: r.metadata,
            owner_id: r.owner_id,
            parent_id: r.parent_id,
        }
    }
}

const NFT_COLUMNS: &str =
    "id, symbol, transferable, collection, issuer, sn, metadata, owner_id, parent_id";

#[async_trait]
impl RemarkStorage for PgRemarkStorage {
    async fn get_accounts(&self, ids: &[String]) -> StorageResult<Vec<RmrkAccount>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM rmrk_account WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(rows.into_iter().map(|(id,)| RmrkAccount { id }).collect())
    }

    async fn get_nfts(&self, ids: &[String]) -> StorageResult<Vec<RmrkNft>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!("SELECT {} FROM rmrk_nft WHERE id = ANY($1)", NFT_COLUMNS);
        let rows = sqlx::query_as::<_, NftRow>(&query)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(rows.into_iter().map(RmrkNft::from).collect())
    }

    async fn get_nft(&self, id: &str) -> StorageResult<Option<RmrkNft>> {
        let query = format!("SELECT {} FROM rmrk_nft WHERE id = $1", NFT_COLUMNS);
        let row = sqlx::query_as::<_, NftRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(row.map(RmrkNft::from))
    }

    async fn list_nfts_by_owner(&self, owner: &str) -> StorageResult<Vec<RmrkNft>> {
        let query = format!("SELECT {} FROM rmrk_nft WHERE owner_id = $1 ORDER BY id", NFT_COLUMNS);
        let rows = sqlx::query_as::<_, NftRow>(&query)
            .bind(owner)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(rows.into_iter().map(RmrkNft::from).collect())
    }
}

/// Writes accounts and NFTs, then detaches and deletes burned NFTs.
pub struct RemarkWriter;

#[async_trait]
impl OutputWriter for RemarkWriter {
    fn name(&self) -> &'static str {
        BUNDLE
    }

    async fn write(&self, conn: &mut PgConnection, outputs: &HandlerOutputs) -> StorageResult<u64> {
        let accounts: Vec<RmrkAccount> = typed_outputs(outputs, BUNDLE, ACCOUNTS)?;
        let nfts: Vec<RmrkNft> = typed_outputs(outputs, BUNDLE, NFTS)?;
        let burned: Vec<String> = typed_outputs(outputs, BUNDLE, BURNED)?;
        let mut rows = 0;

        for account in &accounts {
            rows += sqlx::query("INSERT INTO rmrk_account (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
                .bind(&account.id)
                .execute(&mut *conn)
                .await
                .map_err(query_error)?
                .rows_affected();
        }

        for nft in &nfts {
            rows += sqlx::query(
                r#"
                INSERT INTO rmrk_nft (
                    id, symbol, transferable, collection, issuer, sn, metadata, owner_id, parent_id
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (id) DO UPDATE SET
                    owner_id = EXCLUDED.owner_id,
                    parent_id = EXCLUDED.parent_id
                "#,
            )
            .bind(&nft.id)
            .bind(&nft.symbol)
            .bind(nft.transferable)
            .bind(&nft.collection)
            .bind(&nft.issuer)
            .bind(&nft.sn)
            .bind(&nft.metadata)
            .bind(&nft.owner_id)
            .bind(&nft.parent_id)
            .execute(&mut *conn)
            .await
            .map_err(query_error)?
            .rows_affected();
        }

        if !burned.is_empty() {
            rows += sqlx::query("UPDATE rmrk_nft SET parent_id = NULL WHERE parent_id = ANY($1)")
                .bind(&burned)
                .execute(&mut *conn)
                .await
                .map_err(query_error)?
                .rows_affected();
            rows += sqlx::query("DELETE FROM rmrk_nft WHERE id = ANY($1)")
                .bind(&burned)
                .execute(&mut *conn)
                .await
                .map_err(query_error)?
                .rows_affected();
        }

        Ok(rows)
    }
}

/// SQL migrations for the remark bundle.
///
/// The parent reference is checked at commit so a batch may write a child
/// before its parent.
pub const MIGRATIONS: &[&str] = &[r#"
CREATE TABLE IF NOT EXISTS rmrk_account (
    id TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS rmrk_nft (
    id TEXT PRIMARY KEY,
    symbol TEXT,
    transferable BOOLEAN,
    collection TEXT NOT NULL,
    issuer TEXT,
    sn TEXT,
    metadata TEXT,
    owner_id TEXT REFERENCES rmrk_account(id),
    parent_id TEXT REFERENCES rmrk_nft(id) DEFERRABLE INITIALLY DEFERRED
);

CREATE INDEX IF NOT EXISTS idx_rmrk_nft_owner ON rmrk_nft(owner_id);
CREATE INDEX IF NOT EXISTS idx_rmrk_nft_parent ON rmrk_nft(parent_id);
"#];
