//! Metadata of every runtime version met while processing.
//!
//! Historical blocks must be decoded with the metadata of the runtime that
//! produced them, so one client is kept per spec version.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use subxt::{Metadata, OnlineClient, PolkadotConfig};

use sluice_core::decoding::ItemClass;
use sluice_core::error::{ChainError, ChainResult};
use sluice_core::models::SchemaFingerprint;

use crate::descriptor::{fields_fingerprint, type_descriptor};

/// A client bound to one runtime version.
pub struct RuntimeView {
    pub spec_version: u32,
    pub client: OnlineClient<PolkadotConfig>,
    fingerprints: Mutex<HashMap<(ItemClass, String, String), SchemaFingerprint>>,
}

impl RuntimeView {
    pub fn new(spec_version: u32, client: OnlineClient<PolkadotConfig>) -> Self {
        Self {
            spec_version,
            client,
            fingerprints: Mutex::new(HashMap::new()),
        }
    }

    pub fn metadata(&self) -> Metadata {
        self.client.metadata()
    }

    /// Fingerprint of an event layout, looked up by variant index.
    pub fn event_fingerprint(&self, pallet: &str, variant_index: u8) -> ChainResult<SchemaFingerprint> {
        self.cached(ItemClass::Event, pallet, &variant_index.to_string(), |metadata| {
            let variant = metadata
                .pallet_by_name(pallet)
                .and_then(|p| p.event_variant_by_index(variant_index))
                .ok_or_else(|| missing(pallet, &format!("event #{}", variant_index)))?;
            Ok(fields_fingerprint(metadata.types(), &variant.fields))
        })
    }

    /// Fingerprint of a call layout, looked up by name so that calls
    /// nested in batches resolve the same way as top-level ones.
    pub fn call_fingerprint(&self, pallet: &str, name: &str) -> ChainResult<SchemaFingerprint> {
        self.cached(ItemClass::Call, pallet, name, |metadata| {
            let variant = metadata
                .pallet_by_name(pallet)
                .and_then(|p| p.call_variant_by_name(name))
                .ok_or_else(|| missing(pallet, name))?;
            Ok(fields_fingerprint(metadata.types(), &variant.fields))
        })
    }

    /// Fingerprint of a storage value type, or None if the entry does not
    /// exist in this runtime.
    pub fn storage_fingerprint(&self, pallet: &str, entry: &str) -> Option<SchemaFingerprint> {
        self.cached(ItemClass::Storage, pallet, entry, |metadata| {
            let value_ty = metadata
                .pallet_by_name(pallet)
                .and_then(|p| p.storage())
                .and_then(|s| s.entry_by_name(entry))
                .map(|e| e.entry_type().value_ty())
                .ok_or_else(|| missing(pallet, entry))?;
            Ok(SchemaFingerprint::of_descriptor(&type_descriptor(
                metadata.types(),
                value_ty,
            )))
        })
        .ok()
    }

    fn cached(
        &self,
        class: ItemClass,
        pallet: &str,
        item: &str,
        compute: impl FnOnce(&Metadata) -> ChainResult<SchemaFingerprint>,
    ) -> ChainResult<SchemaFingerprint> {
        let key = (class, pallet.to_string(), item.to_string());
        if let Some(found) = self.lock().get(&key) {
            return Ok(*found);
        }
        let fingerprint = compute(&self.metadata())?;
        self.lock().insert(key, fingerprint);
        Ok(fingerprint)
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<(ItemClass, String, String), SchemaFingerprint>> {
        // A poisoned cache only loses memoized values
        self.fingerprints
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn missing(pallet: &str, item: &str) -> ChainError {
    ChainError::MetadataError(format!("{}.{} not found in metadata", pallet, item))
}

/// Runtime views keyed by spec version.
#[derive(Default)]
pub struct RuntimeCache {
    views: tokio::sync::RwLock<HashMap<u32, Arc<RuntimeView>>>,
}

impl RuntimeCache {
    pub async fn get(&self, spec_version: u32) -> Option<Arc<RuntimeView>> {
        self.views.read().await.get(&spec_version).cloned()
    }

    /// Insert a view, keeping the existing one if another task won the race.
    pub async fn insert(&self, view: RuntimeView) -> Arc<RuntimeView> {
        let mut views = self.views.write().await;
        views
            .entry(view.spec_version)
            .or_insert_with(|| Arc::new(view))
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.views.read().await.len()
    }
}
