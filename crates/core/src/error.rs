//! Error types for the processor domain layer.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`DomainError`] - Decoding and entity mapping errors
//! - [`StorageError`] - Database/repository errors
//! - [`ChainError`] - Node RPC errors
//! - [`ProcessorError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Domain Errors
// =============================================================================

/// Decoding and domain rule violations.
///
/// Every variant is fatal for the batch being processed: nothing of the
/// batch is persisted and the processor stops.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No known schema version matches the item's fingerprint.
    ///
    /// The set of handled versions is stale relative to chain history and
    /// the processor must be extended before it can make progress.
    #[error("Unknown schema version for {kind}: fingerprint {fingerprint}")]
    UnknownSchemaVersion {
        /// Item kind, e.g. `Balances.Transfer`.
        kind: String,
        /// Fingerprint observed on chain.
        fingerprint: String,
    },

    /// A call was expected to be signed by an account but was not.
    #[error("Unexpected origin: {0}")]
    UnexpectedOrigin(String),

    /// Account ID failed validation.
    #[error("Invalid account ID: {0}")]
    InvalidAccountId(String),

    /// Item arguments did not have the shape the schema version describes.
    #[error("Decoding error: {0}")]
    DecodingError(String),

    /// Generic validation error.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Reading chain state for a handler failed.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Database and repository errors.
///
/// These errors originate from storage operations like queries,
/// transactions, and data serialization.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to establish database connection.
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// SQL query execution failed.
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Requested record was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Database constraint was violated (unique, foreign key, etc.).
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Database migration failed.
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// Transaction commit/rollback failed.
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Data serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// =============================================================================
// Chain Errors
// =============================================================================

/// Node RPC and connectivity errors.
#[derive(Debug, Error)]
pub enum ChainError {
    /// WebSocket connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// RPC request failed.
    #[error("RPC error: {0}")]
    RpcError(String),

    /// Runtime metadata could not be fetched or parsed.
    #[error("Metadata error: {0}")]
    MetadataError(String),

    /// Block could not be fetched.
    #[error("Block fetch error at #{number}: {message}")]
    BlockFetchError {
        /// Height that failed to fetch.
        number: u64,
        /// Error details.
        message: String,
    },

    /// Storage entry could not be read or decoded.
    #[error("Storage read error for {entry}: {message}")]
    StorageReadError {
        /// `Pallet.Entry` being read.
        entry: String,
        /// Error details.
        message: String,
    },

    /// Operation timed out.
    #[error("Timeout: {0}")]
    Timeout(String),
}

// =============================================================================
// Processor Errors
// =============================================================================

/// Top-level processor orchestration errors.
///
/// This is the main error type returned by [`crate::services::BatchProcessor`].
/// It wraps all lower-level errors and adds processor-specific variants.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// Domain logic error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Storage/database error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Node connectivity error.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Connected chain doesn't match the configured genesis.
    ///
    /// This is a fatal error that requires manual intervention.
    #[error("Chain mismatch: connected to {connected} but processor expects {expected}")]
    ChainMismatch {
        /// Genesis hash of connected chain.
        connected: String,
        /// Genesis hash the processor was configured for.
        expected: String,
    },

    /// Graceful shutdown was requested.
    #[error("Processor shutdown requested")]
    ShutdownRequested,

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProcessorError {
    /// True when the error came out of decoding with an unmatched fingerprint.
    pub fn is_unknown_schema(&self) -> bool {
        matches!(
            self,
            ProcessorError::Domain(DomainError::UnknownSchemaVersion { .. })
        )
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for processor operations.
pub type ProcessorResult<T> = Result<T, ProcessorError>;

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
