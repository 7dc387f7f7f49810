//! GraphQL types and queries for the frontier bundle.

use std::sync::Arc;

use async_graphql::{Context, Object, Result};

use sluice_core::models::H160;
use sluice_graphql::validate_id;

use super::models::Token as TokenModel;
use super::storage::FrontierStorage;

/// An ERC-721 token.
#[derive(async_graphql::SimpleObject)]
pub struct Token {
    /// Token id in decimal.
    pub id: String,
    pub uri: Option<String>,
    pub contract_id: String,
    /// Current owner address.
    pub owner_id: String,
}

impl From<TokenModel> for Token {
    fn from(t: TokenModel) -> Self {
        Self {
            id: t.id,
            uri: t.uri,
            contract_id: t.contract_id,
            owner_id: t.owner_id,
        }
    }
}

/// GraphQL query root for the frontier bundle.
#[derive(Default)]
pub struct FrontierQuery;

#[Object]
impl FrontierQuery {
    /// Get a token by id.
    async fn token<'ctx>(&self, ctx: &Context<'ctx>, id: String) -> Result<Option<Token>> {
        validate_id(&id, "id")?;
        let frontier = ctx.data::<Arc<dyn FrontierStorage>>()?;
        Ok(frontier.get_token(&id).await?.map(Token::from))
    }

    /// Tokens held by an EVM address.
    async fn tokens_by_owner<'ctx>(&self, ctx: &Context<'ctx>, owner: String) -> Result<Vec<Token>> {
        let owner = H160::from_hex(&owner)
            .map_err(|e| async_graphql::Error::new(format!("Invalid owner address: {}", e)))?;
        let frontier = ctx.data::<Arc<dyn FrontierStorage>>()?;

        let tokens = frontier.list_tokens_by_owner(&owner.to_hex()).await?;
        Ok(tokens.into_iter().map(Token::from).collect())
    }
}
