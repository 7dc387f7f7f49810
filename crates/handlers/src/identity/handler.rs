//! Batch handler for the identity calls.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use sluice_core::decoding::{VersionedSchema, decode_versioned};
use sluice_core::error::{DomainError, DomainResult};
use sluice_core::models::EntityMap;
use sluice_core::ports::{BatchContext, BatchHandler, HandlerOutputs, ItemSelector, Selection};

use super::models::IdentityAccount;
use super::storage::IdentityStorage;
use super::versions::{ClearIdentityCall, IdentityRecord, SetIdentityCall};
use super::{ACCOUNTS, BUNDLE};

/// Keeps the latest identity of every account that set or cleared one.
pub struct IdentityHandler {
    storage: Arc<dyn IdentityStorage>,
}

impl IdentityHandler {
    pub fn new(storage: Arc<dyn IdentityStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl BatchHandler for IdentityHandler {
    fn name(&self) -> &'static str {
        BUNDLE
    }

    fn selection(&self) -> Selection {
        Selection::new()
            .with(ItemSelector::call(SetIdentityCall::KIND))
            .with(ItemSelector::call(ClearIdentityCall::KIND))
    }

    async fn handle_batch(&self, ctx: &BatchContext<'_>) -> DomainResult<HandlerOutputs> {
        let selection = self.selection();
        let mut updates: Vec<(String, IdentityRecord)> = Vec::new();

        for (block, call) in ctx.calls(&selection) {
            let Some(origin) = &call.origin else {
                trace!(block = block.number, call = %call.name, "Skipping unsigned identity call");
                continue;
            };
            let id = ctx.ss58.encode(origin.signer()?);

            let record = if SetIdentityCall::KIND.matches(&call.pallet, &call.name) {
                decode_versioned::<SetIdentityCall>(&call.fingerprint, &call.args)?
            } else if ClearIdentityCall::KIND.matches(&call.pallet, &call.name) {
                decode_versioned::<ClearIdentityCall>(&call.fingerprint, &call.args)?;
                IdentityRecord::default()
            } else {
                return Err(DomainError::ValidationError(format!(
                    "unexpected call {}.{}",
                    call.pallet, call.name
                )));
            };
            updates.push((id, record));
        }

        let mut outputs = HandlerOutputs::new();
        if updates.is_empty() {
            return Ok(outputs);
        }

        let ids: Vec<String> = updates
            .iter()
            .map(|(id, _)| id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut accounts = EntityMap::from_existing(self.storage.get_identities(&ids).await?);

        for (id, record) in updates {
            accounts
                .get_or_insert_with(&id, || IdentityAccount::new(&id))
                .apply(record);
        }

        debug!(accounts = accounts.len(), "Folded identity updates");
        outputs.extend(BUNDLE, ACCOUNTS, accounts.into_values())?;
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use sluice_core::error::StorageResult;
    use sluice_core::models::Ss58Codec;
    use sluice_core::ports::CallOrigin;

    use crate::testing::{FakeSource, account, block, call};

    struct KnownIdentity(IdentityAccount);

    #[async_trait]
    impl IdentityStorage for KnownIdentity {
        async fn get_identities(&self, ids: &[String]) -> StorageResult<Vec<IdentityAccount>> {
            Ok(ids
                .iter()
                .filter(|id| **id == self.0.id)
                .map(|_| self.0.clone())
                .collect())
        }

        async fn get_identity(&self, _: &str) -> StorageResult<Option<IdentityAccount>> {
            Ok(None)
        }
    }

    fn kusama() -> Ss58Codec {
        Ss58Codec::for_network("kusama").unwrap()
    }

    fn handler() -> IdentityHandler {
        let mut known = IdentityAccount::new(&kusama().encode(&account(2)));
        known.display = Some("old".into());
        known.web = Some("https://old.example".into());
        IdentityHandler::new(Arc::new(KnownIdentity(known)))
    }

    fn set_identity(ext: u32, origin: Option<CallOrigin>, display: &str) -> sluice_core::ports::RawItem {
        let mut raw = serde_json::Map::new();
        raw.insert(format!("Raw{}", display.len()), json!(format!("0x{}", hex::encode(display))));
        call(
            ext,
            ("Identity", "set_identity"),
            SetIdentityCall::V1032.fingerprint(),
            json!({"info": {
                "display": raw,
                "legal": null, "web": null, "riot": null, "email": null,
                "twitter": {"Sha256": format!("0x{}", "11".repeat(32))},
            }}),
            origin,
        )
    }

    #[tokio::test]
    async fn test_set_then_clear_in_one_batch() {
        let blocks = vec![
            block(
                1,
                vec![
                    set_identity(1, Some(CallOrigin::Signed(account(1))), "alice"),
                    set_identity(2, None, "ghost"),
                ],
            ),
            block(
                2,
                vec![
                    set_identity(1, Some(CallOrigin::Signed(account(2))), "bob"),
                    call(
                        2,
                        ("Identity", "clear_indentity"),
                        ClearIdentityCall::V1030.fingerprint(),
                        json!([]),
                        Some(CallOrigin::Signed(account(1))),
                    ),
                ],
            ),
        ];
        let source = FakeSource::new();
        let ctx = BatchContext::new(&blocks, &source, kusama());

        let outputs = handler().handle_batch(&ctx).await.unwrap();
        let accounts: Vec<IdentityAccount> = outputs.get_typed(BUNDLE, ACCOUNTS).unwrap();
        assert_eq!(accounts.len(), 2);

        let alice = accounts.iter().find(|a| a.id == kusama().encode(&account(1))).unwrap();
        // clear_indentity efface tous les champs
        assert_eq!(*alice, IdentityAccount::new(&alice.id));

        let bob = accounts.iter().find(|a| a.id == kusama().encode(&account(2))).unwrap();
        assert_eq!(bob.display.as_deref(), Some("bob"));
        assert!(bob.web.is_none());
        assert!(bob.twitter.is_none());
    }

    #[tokio::test]
    async fn test_root_origin_is_rejected() {
        let blocks = vec![block(1, vec![set_identity(1, Some(CallOrigin::Root), "root")])];
        let source = FakeSource::new();
        let ctx = BatchContext::new(&blocks, &source, kusama());

        let err = handler().handle_batch(&ctx).await.unwrap_err();
        assert!(matches!(err, DomainError::UnexpectedOrigin(_)));
    }

    #[tokio::test]
    async fn test_failed_calls_are_not_selected() {
        let mut item = set_identity(1, Some(CallOrigin::Signed(account(1))), "alice");
        if let sluice_core::ports::RawItem::Call(c) = &mut item {
            c.extrinsic.success = false;
        }
        let blocks = vec![block(1, vec![item])];
        let source = FakeSource::new();
        let ctx = BatchContext::new(&blocks, &source, kusama());

        assert!(handler().handle_batch(&ctx).await.unwrap().is_empty());
    }
}
