//! GraphQL types and queries for the remark bundle.

use std::sync::Arc;

use async_graphql::{Context, Object, Result};

use sluice_graphql::validate_id;

use super::models::RmrkNft;
use super::storage::RemarkStorage;

/// An RMRK 2.0.0 NFT.
#[derive(async_graphql::SimpleObject)]
pub struct Nft {
    pub id: String,
    pub symbol: Option<String>,
    pub transferable: Option<bool>,
    pub collection: String,
    pub issuer: Option<String>,
    pub sn: Option<String>,
    pub metadata: Option<String>,
    pub owner_id: Option<String>,
    /// Set when the NFT is owned by another NFT.
    pub parent_id: Option<String>,
}

impl From<RmrkNft> for Nft {
    fn from(n: RmrkNft) -> Self {
        Self {
            id: n.id,
            symbol: n.symbol,
            transferable: n.transferable,
            collection: n.collection,
            issuer: n.issuer,
            sn: n.sn,
            metadata: n.metadata,
            owner_id: n.owner_id,
            parent_id: n.parent_id,
        }
    }
}

#[derive(Default)]
pub struct RemarkQuery;

#[Object]
impl RemarkQuery {
    async fn nft<'ctx>(&self, ctx: &Context<'ctx>, id: String) -> Result<Option<Nft>> {
        validate_id(&id, "id")?;
        let remark = ctx.data::<Arc<dyn RemarkStorage>>()?;
        Ok(remark.get_nft(&id).await?.map(Nft::from))
    }

    /// NFTs directly owned by an account.
    async fn nfts_by_owner<'ctx>(&self, ctx: &Context<'ctx>, owner: String) -> Result<Vec<Nft>> {
        validate_id(&owner, "owner")?;
        let remark = ctx.data::<Arc<dyn RemarkStorage>>()?;
        let nfts = remark.list_nfts_by_owner(&owner).await?;
        Ok(nfts.into_iter().map(Nft::from).collect())
    }
}
