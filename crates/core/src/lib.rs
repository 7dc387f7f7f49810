//! Core domain layer for Sluice processors.
//!
//! This crate contains the domain models, the versioned decoder dispatch,
//! port traits (interfaces), and the batch processing service. It follows
//! hexagonal architecture principles - this is the innermost layer with
//! no dependencies on infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      sluice (binary)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  sluice-graphql   │  sluice-handlers   │  sluice-substrate  │
//! │     (API)         │    (bundles)       │     (RPC)          │
//! ├───────────────────┴────────────────────┴────────────────────┤
//! │                     sluice-storage                          │
//! │                     (PostgreSQL)                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      sluice-core  ← YOU ARE HERE            │
//! │          (models, decoding, ports, services)                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Domain models (hashes, cursor, SS58, entity maps)
//! - [`decoding`] - Versioned schema dispatch
//! - [`ports`] - Interface traits for adapters to implement
//! - [`services`] - Core business logic (BatchProcessor)
//! - [`error`] - Domain error types
//! - [`metrics`] - Prometheus metrics definitions
//!
//! # Key Concepts
//!
//! ## Ports
//!
//! - [`ports::BatchSource`] - Fetch block ranges and read chain state
//! - [`ports::Repositories`] - Persist batches atomically
//! - [`ports::BatchHandler`] - Fold a batch's items into entities
//!
//! ## Versioned decoding
//!
//! Each item kind declares its known layouts as a closed enum implementing
//! [`decoding::VersionedSchema`]. The item's fingerprint selects exactly one
//! layout; no match is a fatal [`error::DomainError::UnknownSchemaVersion`].
//!
//! ## Processor Lifecycle
//!
//! 1. Resume from the cursor
//! 2. Fetch the next block range with the handlers' selection
//! 3. Run every handler over the batch
//! 4. Persist handler outputs and the cursor in one transaction

pub mod decoding;
pub mod error;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod services;
