//! Storage layer for Sluice processors.
//!
//! This crate provides the PostgreSQL implementation of the repository
//! traits defined in `sluice-core`: connection pooling, core migrations,
//! the processor cursor, and atomic batch persistence.
//!
//! Entity tables belong to bundles. Each bundle contributes an
//! [`OutputWriter`] that turns its slice of the batch outputs into SQL,
//! and [`PgRepositories`] runs all of them inside one transaction together
//! with the cursor update.
//!
//! # Usage
//!
//! ```ignore
//! use sluice_storage::{Database, DatabaseConfig, PgRepositories};
//!
//! let config = DatabaseConfig::for_processor(&database_url);
//! let db = Database::connect(&config).await?;
//! db.migrate().await?;
//!
//! let repositories = Arc::new(PgRepositories::new(Arc::new(db), writers));
//! ```

pub mod postgres;

pub use postgres::{
    Database, DatabaseConfig, OutputWriter, PgCursorRepository, PgRepositories, PurgeStats,
};
