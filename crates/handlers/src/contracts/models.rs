//! Models for the contracts bundle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sluice_core::models::{Entity, u128_str};

/// An account that sent or received contract tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InkAccount {
    pub id: String,
}

impl Entity for InkAccount {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A token transfer; `from_id` is empty on mint and `to_id` on burn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InkTransfer {
    pub id: String,
    pub from_id: Option<String>,
    pub to_id: Option<String>,
    #[serde(with = "u128_str")]
    pub amount: u128,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
}

impl Entity for InkTransfer {
    fn id(&self) -> &str {
        &self.id
    }
}
