//! Batch handler for RMRK 2.0.0 remarks.
//!
//! Remarks are parsed in block order and folded into the batch's NFT map.
//! A remark that claims to be RMRK 2.0.0 but can't be parsed is logged and
//! skipped: anyone can post one and it says nothing about the runtime.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use sluice_core::decoding::{VersionedSchema, decode_versioned};
use sluice_core::error::DomainResult;
use sluice_core::models::{EntityMap, Ss58Codec};
use sluice_core::ports::{BatchContext, BatchHandler, HandlerOutputs, ItemSelector, Selection};

use super::models::{RmrkAccount, RmrkNft};
use super::rmrk::{self, RmrkMessage};
use super::storage::RemarkStorage;
use super::versions::RemarkCall;
use super::{ACCOUNTS, BUNDLE, BURNED, NFTS};

/// Where a `MINT`, `SEND` or `BUY` recipient points.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Recipient {
    Account(String),
    Nft(String),
}

impl Recipient {
    /// Any valid address is an account, re-encoded for the chain; anything
    /// else names an NFT.
    fn parse(ss58: &Ss58Codec, value: &str) -> Self {
        match Ss58Codec::decode_any(value) {
            Ok((_, account)) => Self::Account(ss58.encode(&account)),
            Err(_) => Self::Nft(value.to_string()),
        }
    }
}

struct Interaction {
    block: u64,
    signer: String,
    message: RmrkMessage,
}

pub struct RemarkHandler {
    storage: Arc<dyn RemarkStorage>,
    from_block: u64,
}

impl RemarkHandler {
    pub fn new(storage: Arc<dyn RemarkStorage>, from_block: u64) -> Self {
        Self { storage, from_block }
    }

    fn interactions(&self, ctx: &BatchContext<'_>) -> DomainResult<Vec<Interaction>> {
        let selection = self.selection();
        let mut interactions = Vec::new();

        for (block, call) in ctx.calls(&selection) {
            if block.number < self.from_block {
                continue;
            }
            let Some(origin) = &call.origin else { continue };
            let signer = ctx.ss58.encode(origin.signer()?);
            let remark = decode_versioned::<RemarkCall>(&call.fingerprint, &call.args)?;

            match rmrk::parse(&String::from_utf8_lossy(&remark)) {
                Ok(Some(message)) => interactions.push(Interaction {
                    block: block.number,
                    signer,
                    message,
                }),
                Ok(None) => {}
                Err(e) => {
                    warn!(block = block.number, extrinsic = call.extrinsic.index, error = %e, "⚠️ Skipping malformed RMRK remark");
                }
            }
        }
        Ok(interactions)
    }
}

#[async_trait]
impl BatchHandler for RemarkHandler {
    fn name(&self) -> &'static str {
        BUNDLE
    }

    fn selection(&self) -> Selection {
        Selection::new().with(ItemSelector::call(RemarkCall::KIND))
    }

    async fn handle_batch(&self, ctx: &BatchContext<'_>) -> DomainResult<HandlerOutputs> {
        let interactions = self.interactions(ctx)?;
        let mut outputs = HandlerOutputs::new();
        if interactions.is_empty() {
            return Ok(outputs);
        }

        let mut account_ids = BTreeSet::new();
        let mut nft_ids = BTreeSet::new();
        for i in &interactions {
            match &i.message {
                RmrkMessage::Mint { recipient, .. } => match recipient.as_deref().map(|r| Recipient::parse(&ctx.ss58, r)) {
                    Some(Recipient::Nft(parent)) => {
                        nft_ids.insert(parent);
                        account_ids.insert(i.signer.clone());
                    }
                    Some(Recipient::Account(owner)) => {
                        account_ids.insert(owner);
                    }
                    None => {
                        account_ids.insert(i.signer.clone());
                    }
                },
                RmrkMessage::Send { id, recipient } => {
                    nft_ids.insert(id.clone());
                    match Recipient::parse(&ctx.ss58, recipient) {
                        Recipient::Account(owner) => account_ids.insert(owner),
                        Recipient::Nft(parent) => nft_ids.insert(parent),
                    };
                }
                RmrkMessage::Buy { id, recipient } => {
                    nft_ids.insert(id.clone());
                    match recipient.as_deref().map(|r| Recipient::parse(&ctx.ss58, r)) {
                        Some(Recipient::Account(owner)) => account_ids.insert(owner),
                        Some(Recipient::Nft(parent)) => nft_ids.insert(parent),
                        None => account_ids.insert(i.signer.clone()),
                    };
                }
                RmrkMessage::Burn { id } => {
                    nft_ids.insert(id.clone());
                }
            }
        }
        let account_ids: Vec<String> = account_ids.into_iter().collect();
        let nft_ids: Vec<String> = nft_ids.into_iter().collect();

        let mut accounts = EntityMap::from_existing(self.storage.get_accounts(&account_ids).await?);
        let mut nfts = EntityMap::from_existing(self.storage.get_nfts(&nft_ids).await?);
        let mut burned: Vec<String> = Vec::new();

        for Interaction { block, signer, message } in interactions {
            match message {
                RmrkMessage::Mint { nft, recipient } => {
                    let (owner, parent) = match recipient.map(|r| Recipient::parse(&ctx.ss58, &r)) {
                        Some(Recipient::Account(owner)) => (owner, None),
                        Some(Recipient::Nft(parent)) => (signer.clone(), Some(parent)),
                        None => (signer.clone(), None),
                    };
                    accounts.get_or_insert_with(&owner, || RmrkAccount { id: owner.clone() });

                    let id = nft.id(block);
                    let parent_id = parent.filter(|p| nfts.contains(p));
                    burned.retain(|b| *b != id);
                    nfts.insert(RmrkNft {
                        id,
                        symbol: nft.symbol,
                        transferable: nft.transferable,
                        collection: nft.collection,
                        issuer: Some(signer),
                        sn: nft.sn,
                        metadata: nft.metadata,
                        owner_id: Some(owner),
                        parent_id,
                    });
                }
                RmrkMessage::Send { id, recipient } => {
                    let recipient = Recipient::parse(&ctx.ss58, &recipient);
                    if let Recipient::Nft(parent) = &recipient {
                        if !nfts.contains(parent) || *parent == id {
                            debug!(nft = %id, parent = %parent, "SEND to an unknown NFT, ignored");
                            continue;
                        }
                    }
                    let Some(nft) = nfts.get_mut(&id) else {
                        debug!(nft = %id, "SEND of an unknown NFT, ignored");
                        continue;
                    };
                    match recipient {
                        Recipient::Account(owner) => {
                            nft.owner_id = Some(owner.clone());
                            nft.parent_id = None;
                            accounts.get_or_insert_with(&owner, || RmrkAccount { id: owner.clone() });
                        }
                        Recipient::Nft(parent) => nft.parent_id = Some(parent),
                    }
                }
                RmrkMessage::Buy { id, recipient } => {
                    let recipient = match recipient {
                        Some(r) => Recipient::parse(&ctx.ss58, &r),
                        None => Recipient::Account(signer),
                    };
                    if let Recipient::Nft(parent) = &recipient {
                        if !nfts.contains(parent) || *parent == id {
                            debug!(nft = %id, parent = %parent, "BUY into an unknown NFT, ignored");
                            continue;
                        }
                    }
                    let Some(nft) = nfts.get_mut(&id) else {
                        debug!(nft = %id, "BUY of an unknown NFT, ignored");
                        continue;
                    };
                    match recipient {
                        Recipient::Account(owner) => {
                            nft.owner_id = Some(owner.clone());
                            nft.parent_id = None;
                            accounts.get_or_insert_with(&owner, || RmrkAccount { id: owner.clone() });
                        }
                        // Bought straight into another NFT: the parent holds it.
                        Recipient::Nft(parent) => {
                            nft.owner_id = None;
                            nft.parent_id = Some(parent);
                        }
                    }
                }
                RmrkMessage::Burn { id } => {
                    nfts.remove(&id);
                    for child in nfts.values_mut() {
                        if child.parent_id.as_deref() == Some(id.as_str()) {
                            child.parent_id = None;
                        }
                    }
                    burned.push(id);
                }
            }
        }

        debug!(
            nfts = nfts.len(),
            accounts = accounts.len(),
            burned = burned.len(),
            "Folded RMRK interactions"
        );

        outputs.extend(BUNDLE, ACCOUNTS, accounts.into_values())?;
        outputs.extend(BUNDLE, NFTS, nfts.into_values())?;
        outputs.extend(BUNDLE, BURNED, burned)?;
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use sluice_core::error::{DomainError, StorageResult};
    use sluice_core::ports::{CallOrigin, RawItem};

    use crate::testing::{FakeSource, account, block, call};

    #[derive(Default)]
    struct KnownNfts(Vec<RmrkNft>);

    #[async_trait]
    impl RemarkStorage for KnownNfts {
        async fn get_accounts(&self, _: &[String]) -> StorageResult<Vec<RmrkAccount>> {
            Ok(Vec::new())
        }

        async fn get_nfts(&self, ids: &[String]) -> StorageResult<Vec<RmrkNft>> {
            Ok(self.0.iter().filter(|n| ids.contains(&n.id)).cloned().collect())
        }

        async fn get_nft(&self, _: &str) -> StorageResult<Option<RmrkNft>> {
            Ok(None)
        }

        async fn list_nfts_by_owner(&self, _: &str) -> StorageResult<Vec<RmrkNft>> {
            Ok(Vec::new())
        }
    }

    const BLOCK: u64 = 13_000_001;

    fn kusama() -> Ss58Codec {
        Ss58Codec::for_network("kusama").unwrap()
    }

    fn remark(ext: u32, signer: u8, text: &str) -> RawItem {
        call(
            ext,
            ("System", "remark"),
            RemarkCall::V1020.fingerprint(),
            json!({"remark": format!("0x{}", hex::encode(text))}),
            Some(CallOrigin::Signed(account(signer))),
        )
    }

    fn mint(sn: &str, recipient: Option<&str>) -> String {
        let nft = format!(
            r#"{{"collection":"C","symbol":"S","transferable":1,"sn":"{}","metadata":"ipfs://m"}}"#,
            sn
        );
        let mut msg = format!("RMRK::MINT::2.0.0::{}", urlencoding::encode(&nft));
        if let Some(r) = recipient {
            msg.push_str("::");
            msg.push_str(r);
        }
        msg
    }

    fn nft_id(sn: &str) -> String {
        format!("{}-C-S-{}", BLOCK, sn)
    }

    async fn run(handler: &RemarkHandler, items: Vec<RawItem>) -> DomainResult<HandlerOutputs> {
        let blocks = vec![block(BLOCK, items)];
        let source = FakeSource::new();
        let ctx = BatchContext::new(&blocks, &source, kusama());
        handler.handle_batch(&ctx).await
    }

    fn nfts_of(outputs: &HandlerOutputs) -> Vec<RmrkNft> {
        outputs.get_typed(BUNDLE, NFTS).unwrap()
    }

    #[tokio::test]
    async fn test_mint_send_and_nest() {
        let alice = kusama().encode(&account(1));
        let bob = kusama().encode(&account(2));
        let handler = RemarkHandler::new(Arc::new(KnownNfts::default()), 0);

        let outputs = run(
            &handler,
            vec![
                remark(1, 1, &mint("1", None)),
                remark(2, 1, &mint("2", Some(&nft_id("1")))),
                remark(3, 1, &format!("RMRK::SEND::2.0.0::{}::{}", nft_id("1"), bob)),
            ],
        )
        .await
        .unwrap();

        let nfts = nfts_of(&outputs);
        let first = nfts.iter().find(|n| n.id == nft_id("1")).unwrap();
        assert_eq!(first.owner_id.as_deref(), Some(bob.as_str()));
        assert_eq!(first.issuer.as_deref(), Some(alice.as_str()));

        let second = nfts.iter().find(|n| n.id == nft_id("2")).unwrap();
        assert_eq!(second.parent_id, Some(nft_id("1")));
        assert_eq!(second.owner_id.as_deref(), Some(alice.as_str()));

        let accounts: Vec<RmrkAccount> = outputs.get_typed(BUNDLE, ACCOUNTS).unwrap();
        assert_eq!(accounts.len(), 2);
    }

    #[tokio::test]
    async fn test_burn_detaches_children() {
        let child = RmrkNft {
            id: "1-C-S-2".into(),
            symbol: Some("S".into()),
            transferable: Some(true),
            collection: "C".into(),
            issuer: None,
            sn: Some("2".into()),
            metadata: None,
            owner_id: None,
            parent_id: Some(nft_id("1")),
        };
        let handler = RemarkHandler::new(Arc::new(KnownNfts(vec![child])), 0);

        let outputs = run(
            &handler,
            vec![
                remark(1, 1, &mint("1", None)),
                remark(2, 1, "RMRK::SEND::2.0.0::1-C-S-2::13000001-C-S-1"),
                remark(3, 1, &format!("RMRK::BURN::2.0.0::{}", nft_id("1"))),
            ],
        )
        .await
        .unwrap();

        let nfts = nfts_of(&outputs);
        assert_eq!(nfts.len(), 1);
        assert_eq!(nfts[0].id, "1-C-S-2");
        assert!(nfts[0].parent_id.is_none());

        let burned: Vec<String> = outputs.get_typed(BUNDLE, BURNED).unwrap();
        assert_eq!(burned, vec![nft_id("1")]);
    }

    #[tokio::test]
    async fn test_buy_defaults_to_signer() {
        let bought = RmrkNft {
            id: "5-C-S-1".into(),
            symbol: None,
            transferable: None,
            collection: "C".into(),
            issuer: None,
            sn: None,
            metadata: None,
            owner_id: Some("seller".into()),
            parent_id: None,
        };
        let handler = RemarkHandler::new(Arc::new(KnownNfts(vec![bought])), 0);

        let outputs = run(&handler, vec![remark(1, 3, "RMRK::BUY::2.0.0::5-C-S-1")]).await.unwrap();

        let nfts = nfts_of(&outputs);
        assert_eq!(nfts[0].owner_id, Some(kusama().encode(&account(3))));
    }

    fn listed(id: &str) -> RmrkNft {
        RmrkNft {
            id: id.into(),
            symbol: Some("S".into()),
            transferable: Some(true),
            collection: "C".into(),
            issuer: None,
            sn: None,
            metadata: None,
            owner_id: Some("seller".into()),
            parent_id: None,
        }
    }

    #[tokio::test]
    async fn test_buy_into_nft_sets_parent() {
        let handler = RemarkHandler::new(Arc::new(KnownNfts(vec![listed("5-C-S-1"), listed("5-C-S-9")])), 0);

        let outputs = run(&handler, vec![remark(1, 3, "RMRK::BUY::2.0.0::5-C-S-1::5-C-S-9")])
            .await
            .unwrap();

        let nfts = nfts_of(&outputs);
        let bought = nfts.iter().find(|n| n.id == "5-C-S-1").unwrap();
        assert_eq!(bought.parent_id.as_deref(), Some("5-C-S-9"));
        assert!(bought.owner_id.is_none());

        // L'id de la NFT ne devient pas un compte
        let accounts: Vec<RmrkAccount> = outputs.get_typed(BUNDLE, ACCOUNTS).unwrap();
        assert!(accounts.is_empty());
    }

    #[tokio::test]
    async fn test_buy_into_unknown_nft_is_ignored() {
        let handler = RemarkHandler::new(Arc::new(KnownNfts(vec![listed("5-C-S-1")])), 0);

        let outputs = run(&handler, vec![remark(1, 3, "RMRK::BUY::2.0.0::5-C-S-1::5-C-S-404")])
            .await
            .unwrap();

        let nfts = nfts_of(&outputs);
        assert_eq!(nfts[0].owner_id.as_deref(), Some("seller"));
        assert!(nfts[0].parent_id.is_none());
    }

    #[tokio::test]
    async fn test_buy_for_account_is_reencoded() {
        let mut nested = listed("5-C-S-1");
        nested.parent_id = Some("5-C-S-9".into());
        let handler = RemarkHandler::new(Arc::new(KnownNfts(vec![nested])), 0);

        // Adresse générique (préfixe 42), ré-encodée pour Kusama
        let generic = Ss58Codec::for_network("substrate").unwrap().encode(&account(4));
        let outputs = run(&handler, vec![remark(1, 3, &format!("RMRK::BUY::2.0.0::5-C-S-1::{}", generic))])
            .await
            .unwrap();

        let expected = kusama().encode(&account(4));
        let nfts = nfts_of(&outputs);
        assert_eq!(nfts[0].owner_id.as_deref(), Some(expected.as_str()));
        assert!(nfts[0].parent_id.is_none());

        let accounts: Vec<RmrkAccount> = outputs.get_typed(BUNDLE, ACCOUNTS).unwrap();
        assert_eq!(accounts, vec![RmrkAccount { id: expected }]);
    }

    #[tokio::test]
    async fn test_noise_and_early_blocks_are_ignored() {
        let handler = RemarkHandler::new(Arc::new(KnownNfts::default()), 0);
        let outputs = run(
            &handler,
            vec![
                remark(1, 1, "gm"),
                remark(2, 1, "RMRK::SEND::2.0.0::missing-recipient"),
                remark(3, 1, "RMRK::SEND::2.0.0::unknown::HxYz"),
            ],
        )
        .await
        .unwrap();
        assert!(nfts_of(&outputs).is_empty());

        // Avant le bloc de départ rien n'est lu
        let late = RemarkHandler::new(Arc::new(KnownNfts::default()), BLOCK + 1);
        let outputs = run(&late, vec![remark(1, 1, &mint("1", None))]).await.unwrap();
        assert!(outputs.is_empty());
    }

    #[tokio::test]
    async fn test_root_origin_is_unexpected() {
        let handler = RemarkHandler::new(Arc::new(KnownNfts::default()), 0);
        let item = call(
            1,
            ("System", "remark"),
            RemarkCall::V1020.fingerprint(),
            json!({"remark": "0x"}),
            Some(CallOrigin::Root),
        );
        let err = run(&handler, vec![item]).await.unwrap_err();
        assert!(matches!(err, DomainError::UnexpectedOrigin(_)));
    }
}
