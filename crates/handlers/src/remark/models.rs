//! Models for the remark bundle.

use serde::{Deserialize, Serialize};

use sluice_core::models::Entity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RmrkAccount {
    pub id: String,
}

impl Entity for RmrkAccount {
    fn id(&self) -> &str {
        &self.id
    }
}

/// An RMRK 2.0.0 NFT. `parent_id` is set when the NFT is owned by another NFT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RmrkNft {
    pub id: String,
    pub symbol: Option<String>,
    pub transferable: Option<bool>,
    pub collection: String,
    pub issuer: Option<String>,
    pub sn: Option<String>,
    pub metadata: Option<String>,
    pub owner_id: Option<String>,
    pub parent_id: Option<String>,
}

impl Entity for RmrkNft {
    fn id(&self) -> &str {
        &self.id
    }
}
