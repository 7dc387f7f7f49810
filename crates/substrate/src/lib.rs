//! Substrate RPC adapter for Sluice processors.
//!
//! This crate implements the [`BatchSource`] port from `sluice-core`,
//! reading historical block ranges from an archive node over WebSocket RPC.
//!
//! # Features
//!
//! - Per-runtime metadata, loaded once per spec version
//! - Layout fingerprints computed from metadata types
//! - SCALE to JSON conversion for events, calls and storage values
//! - Calls nested in `Utility` batches and `Proxy.proxy`
//! - Extrinsic fee and result attribution from block events
//! - Dynamic storage reads and `eth_call` at a given block
//!
//! # Usage
//!
//! ```ignore
//! use sluice_substrate::{SubstrateClient, SubstrateClientConfig};
//!
//! let config = SubstrateClientConfig {
//!     ws_url: "wss://kusama-rpc.polkadot.io".to_string(),
//!     ..Default::default()
//! };
//!
//! let client = SubstrateClient::connect(config).await?;
//! let head = client.finalized_head().await?;
//! let blocks = client.fetch_batch(BlockRange::new(0, 99), &selection).await?;
//! ```
//!
//! [`BatchSource`]: sluice_core::ports::BatchSource

mod client;
pub mod descriptor;
mod json;
mod nested;
mod runtime;

pub use client::{SubstrateClient, SubstrateClientConfig};
