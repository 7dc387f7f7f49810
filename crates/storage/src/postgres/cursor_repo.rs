//! Cursor repository implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use sluice_core::error::{StorageError, StorageResult};
use sluice_core::models::{BlockHash, ProcessorCursor};
use sluice_core::ports::CursorRepository;

use super::database::Database;
use super::helpers::{bytes_to_hash32, query_error};

/// PostgreSQL implementation of CursorRepository.
pub struct PgCursorRepository {
    pool: PgPool,
}

impl PgCursorRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl CursorRepository for PgCursorRepository {
    async fn get_cursor(&self, processor: &str) -> StorageResult<Option<ProcessorCursor>> {
        let row = sqlx::query_as::<_, CursorRow>(
            r#"
            SELECT processor, last_block, last_hash, updated_at
            FROM processor_cursor
            WHERE processor = $1
            "#,
        )
        .bind(processor)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.map(CursorRow::into_cursor).transpose()
    }

    async fn set_cursor(&self, cursor: &ProcessorCursor) -> StorageResult<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        upsert_cursor(&mut *conn, cursor).await
    }
}

/// Upsert a cursor on an open connection or transaction.
pub(crate) async fn upsert_cursor(
    conn: &mut PgConnection,
    cursor: &ProcessorCursor,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO processor_cursor (processor, last_block, last_hash, updated_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (processor) DO UPDATE SET
            last_block = EXCLUDED.last_block,
            last_hash = EXCLUDED.last_hash,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&cursor.processor)
    .bind(cursor.last_block as i64)
    .bind(&cursor.last_hash.0[..])
    .bind(cursor.updated_at)
    .execute(conn)
    .await
    .map_err(query_error)?;

    Ok(())
}

#[derive(sqlx::FromRow)]
struct CursorRow {
    processor: String,
    last_block: i64,
    last_hash: Vec<u8>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl CursorRow {
    fn into_cursor(self) -> StorageResult<ProcessorCursor> {
        Ok(ProcessorCursor {
            processor: self.processor,
            last_block: self.last_block as u64,
            last_hash: BlockHash(bytes_to_hash32(self.last_hash, "cursor.last_hash")?),
            updated_at: self.updated_at,
        })
    }
}
