//! Models for the identity bundle.

use serde::{Deserialize, Serialize};

use sluice_core::models::Entity;

use super::versions::IdentityRecord;

/// On-chain identity of an account, keyed by SS58 address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityAccount {
    pub id: String,
    pub display: Option<String>,
    pub legal: Option<String>,
    pub web: Option<String>,
    pub riot: Option<String>,
    pub email: Option<String>,
    pub twitter: Option<String>,
}

impl IdentityAccount {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    /// Replace every field with the latest record.
    pub fn apply(&mut self, record: IdentityRecord) {
        self.display = record.display;
        self.legal = record.legal;
        self.web = record.web;
        self.riot = record.riot;
        self.email = record.email;
        self.twitter = record.twitter;
    }
}

impl Entity for IdentityAccount {
    fn id(&self) -> &str {
        &self.id
    }
}
