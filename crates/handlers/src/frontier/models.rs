//! Models for the frontier bundle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sluice_core::models::{Entity, u128_str};

/// The indexed ERC-721 contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// Lowercase 0x address.
    pub id: String,
    pub name: String,
    pub symbol: String,
    #[serde(with = "u128_str")]
    pub total_supply: u128,
}

impl Entity for Contract {
    fn id(&self) -> &str {
        &self.id
    }
}

/// An EVM address holding tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    /// Number of tokens held.
    pub balance: u64,
}

impl Owner {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            balance: 0,
        }
    }
}

impl Entity for Owner {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Token id in decimal.
    pub id: String,
    /// `tokenURI` at the block the token was first seen.
    pub uri: Option<String>,
    pub contract_id: String,
    pub owner_id: String,
}

impl Entity for Token {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A token transfer log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmTransfer {
    pub id: String,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
    /// Ethereum transaction hash, when the extrinsic reported one.
    pub transaction_hash: Option<String>,
    pub from_id: String,
    pub to_id: String,
    pub token_id: String,
}

impl Entity for EvmTransfer {
    fn id(&self) -> &str {
        &self.id
    }
}
