//! GraphQL types and queries for the identity bundle.

use std::sync::Arc;

use async_graphql::{Context, Object, Result};

use sluice_graphql::validate_id;

use super::models::IdentityAccount;
use super::storage::IdentityStorage;

/// Identity of an account.
#[derive(async_graphql::SimpleObject)]
pub struct Identity {
    /// Account address.
    pub id: String,
    pub display: Option<String>,
    pub legal: Option<String>,
    pub web: Option<String>,
    pub riot: Option<String>,
    pub email: Option<String>,
    pub twitter: Option<String>,
}

impl From<IdentityAccount> for Identity {
    fn from(a: IdentityAccount) -> Self {
        Self {
            id: a.id,
            display: a.display,
            legal: a.legal,
            web: a.web,
            riot: a.riot,
            email: a.email,
            twitter: a.twitter,
        }
    }
}

/// GraphQL query root for the identity bundle.
#[derive(Default)]
pub struct IdentityQuery;

#[Object]
impl IdentityQuery {
    /// Get the identity of an account by address.
    async fn identity<'ctx>(&self, ctx: &Context<'ctx>, id: String) -> Result<Option<Identity>> {
        validate_id(&id, "id")?;
        let identities = ctx.data::<Arc<dyn IdentityStorage>>()?;
        Ok(identities.get_identity(&id).await?.map(Identity::from))
    }
}
