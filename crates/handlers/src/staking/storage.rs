//! Storage layer for the staking bundle.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use sluice_core::error::{StorageError, StorageResult};
use sluice_core::ports::HandlerOutputs;
use sluice_storage::OutputWriter;
use sluice_storage::postgres::{parse_numeric, query_error, typed_outputs};

use super::models::{Era, EraValidator, Nomination};
use super::{BUNDLE, ERAS, ERA_VALIDATORS};

/// Storage trait for staking data.
#[async_trait]
pub trait StakingStorage: Send + Sync {
    async fn get_era(&self, index: u32) -> StorageResult<Option<Era>>;

    /// Validators of an era, ordered by total stake (largest first).
    async fn list_era_validators(&self, era: u32) -> StorageResult<Vec<EraValidator>>;
}

/// PostgreSQL implementation of [`StakingStorage`].
pub struct PgStakingStorage {
    pool: PgPool,
}

impl PgStakingStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StakingStorage for PgStakingStorage {
    async fn get_era(&self, index: u32) -> StorageResult<Option<Era>> {
        let row: Option<(String, i64, i64)> =
            sqlx::query_as("SELECT id, index, started_at FROM era WHERE index = $1")
                .bind(i64::from(index))
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error)?;

        row.map(|(id, index, started_at)| {
            Ok(Era {
                id,
                index: u32::try_from(index)
                    .map_err(|_| StorageError::SerializationError(format!("era.index {}", index)))?,
                started_at: started_at as u64,
            })
        })
        .transpose()
    }

    async fn list_era_validators(&self, era: u32) -> StorageResult<Vec<EraValidator>> {
        let rows: Vec<EraValidatorRow> = sqlx::query_as(
            r#"
            SELECT id, era_id, validator_id, self_bonded::TEXT AS self_bonded,
                   total_bonded::TEXT AS total_bonded, nominators
            FROM era_validator
            WHERE era_id = $1
            ORDER BY total_bonded DESC, id ASC
            "#,
        )
        .bind(era.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.into_iter().map(EraValidatorRow::into_era_validator).collect()
    }
}

/// Inserts eras and their validators; rows already present are kept.
pub struct StakingWriter;

#[async_trait]
impl OutputWriter for StakingWriter {
    fn name(&self) -> &'static str {
        BUNDLE
    }

    async fn write(&self, conn: &mut PgConnection, outputs: &HandlerOutputs) -> StorageResult<u64> {
        let eras: Vec<Era> = typed_outputs(outputs, BUNDLE, ERAS)?;
        let validators: Vec<EraValidator> = typed_outputs(outputs, BUNDLE, ERA_VALIDATORS)?;
        let mut rows = 0;

        for era in &eras {
            rows += sqlx::query(
                "INSERT INTO era (id, index, started_at) VALUES ($1, $2, $3) ON CONFLICT (id) DO NOTHING",
            )
            .bind(&era.id)
            .bind(i64::from(era.index))
            .bind(era.started_at as i64)
            .execute(&mut *conn)
            .await
            .map_err(query_error)?
            .rows_affected();
        }

        for validator in &validators {
            rows += sqlx::query(
                r#"
                INSERT INTO era_validator (
                    id, era_id, validator_id, self_bonded, total_bonded, nominators
                )
                VALUES ($1, $2, $3, $4::NUMERIC, $5::NUMERIC, $6)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&validator.id)
            .bind(&validator.era_id)
            .bind(&validator.validator_id)
            .bind(validator.self_bonded.to_string())
            .bind(validator.total_bonded.to_string())
            .bind(Json(&validator.nominators))
            .execute(&mut *conn)
            .await
            .map_err(query_error)?
            .rows_affected();
        }

        Ok(rows)
    }
}

#[derive(sqlx::FromRow)]
struct EraValidatorRow {
    id: String,
    era_id: String,
    validator_id: String,
    self_bonded: String,
    total_bonded: String,
    nominators: Json<Vec<Nomination>>,
}

impl EraValidatorRow {
    fn into_era_validator(self) -> StorageResult<EraValidator> {
        Ok(EraValidator {
            self_bonded: parse_numeric(&self.self_bonded, "era_validator.self_bonded")?,
            total_bonded: parse_numeric(&self.total_bonded, "era_validator.total_bonded")?,
            id: self.id,
            era_id: self.era_id,
            validator_id: self.validator_id,
            nominators: self.nominators.0,
        })
    }
}

/// SQL migrations for the staking bundle.
pub const MIGRATIONS: &[&str] = &[r#"
CREATE TABLE IF NOT EXISTS era (
    id TEXT PRIMARY KEY,
    index BIGINT NOT NULL,
    started_at BIGINT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_era_index ON era(index);

CREATE TABLE IF NOT EXISTS era_validator (
    id TEXT PRIMARY KEY,
    era_id TEXT NOT NULL REFERENCES era(id),
    validator_id TEXT NOT NULL,
    self_bonded NUMERIC(39, 0) NOT NULL,
    total_bonded NUMERIC(39, 0) NOT NULL,
    nominators JSONB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_era_validator_era ON era_validator(era_id);
CREATE INDEX IF NOT EXISTS idx_era_validator_validator ON era_validator(validator_id);
"#];
