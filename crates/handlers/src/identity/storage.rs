//! Storage layer for the identity bundle.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use sluice_core::error::StorageResult;
use sluice_core::ports::HandlerOutputs;
use sluice_storage::OutputWriter;
use sluice_storage::postgres::{query_error, typed_outputs};

use super::models::IdentityAccount;
use super::{ACCOUNTS, BUNDLE};

/// Storage trait for identity data.
#[async_trait]
pub trait IdentityStorage: Send + Sync {
    /// Identities among `ids` already in the store.
    async fn get_identities(&self, ids: &[String]) -> StorageResult<Vec<IdentityAccount>>;

    async fn get_identity(&self, id: &str) -> StorageResult<Option<IdentityAccount>>;
}

/// PostgreSQL implementation of [`IdentityStorage`].
pub struct PgIdentityStorage {
    pool: PgPool,
}

impl PgIdentityStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStorage for PgIdentityStorage {
    async fn get_identities(&self, ids: &[String]) -> StorageResult<Vec<IdentityAccount>> {
        let rows: Vec<IdentityRow> = sqlx::query_as(
            "SELECT id, display, legal, web, riot, email, twitter FROM identity_account WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(rows.into_iter().map(IdentityAccount::from).collect())
    }

    async fn get_identity(&self, id: &str) -> StorageResult<Option<IdentityAccount>> {
        let row: Option<IdentityRow> = sqlx::query_as(
            "SELECT id, display, legal, web, riot, email, twitter FROM identity_account WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(row.map(IdentityAccount::from))
    }
}

/// Upserts identities inside the batch transaction.
pub struct IdentityWriter;

#[async_trait]
impl OutputWriter for IdentityWriter {
    fn name(&self) -> &'static str {
        BUNDLE
    }

    async fn write(&self, conn: &mut PgConnection, outputs: &HandlerOutputs) -> StorageResult<u64> {
        let accounts: Vec<IdentityAccount> = typed_outputs(outputs, BUNDLE, ACCOUNTS)?;
        let mut rows = 0;

        for account in &accounts {
            rows += sqlx::query(
                r#"
                INSERT INTO identity_account (id, display, legal, web, riot, email, twitter)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO UPDATE SET
                    display = EXCLUDED.display,
                    legal = EXCLUDED.legal,
                    web = EXCLUDED.web,
                    riot = EXCLUDED.riot,
                    email = EXCLUDED.email,
                    twitter = EXCLUDED.twitter
                "#,
            )
            .bind(&account.id)
            .bind(&account.display)
            .bind(&account.legal)
            .bind(&account.web)
            .bind(&account.riot)
            .bind(&account.email)
            .bind(&account.twitter)
            .execute(&mut *conn)
            .await
            .map_err(query_error)?
            .rows_affected();
        }

        Ok(rows)
    }
}

#[derive(sqlx::FromRow)]
struct IdentityRow {
    id: String,
    display: Option<String>,
    legal: Option<String>,
    web: Option<String>,
    riot: Option<String>,
    email: Option<String>,
    twitter: Option<String>,
}

impl From<IdentityRow> for IdentityAccount {
    fn from(row: IdentityRow) -> Self {
        Self {
            id: row.id,
            display: row.display,
            legal: row.legal,
            web: row.web,
            riot: row.riot,
            email: row.email,
            twitter: row.twitter,
        }
    }
}

/// SQL migrations for the identity bundle.
pub const MIGRATIONS: &[&str] = &[r#"
CREATE TABLE IF NOT EXISTS identity_account (
    id TEXT PRIMARY KEY,
    display TEXT,
    legal TEXT,
    web TEXT,
    riot TEXT,
    email TEXT,
    twitter TEXT
);
"#];
