//! Models for the balances bundle.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use sluice_core::models::{Entity, option_u128_str, u128_str};

/// An account seen in a transfer, keyed by its SS58 address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
}

impl Entity for Account {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A balance transfer between two accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Event id: `{height}-{index}-{hash prefix}`.
    pub id: String,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
    /// Hash of the extrinsic that emitted the event.
    pub extrinsic_hash: Option<String>,
    /// `Pallet.call` of that extrinsic.
    pub call: Option<String>,
    pub from_id: String,
    pub to_id: String,
    #[serde(with = "u128_str")]
    pub amount: u128,
    /// Fee paid for the extrinsic.
    #[serde(with = "option_u128_str")]
    pub fee: Option<u128>,
}

impl Entity for Transfer {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Transfer volume of one UTC day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransfersDayData {
    pub day: NaiveDate,
    pub volume: u128,
    pub count: i64,
}
