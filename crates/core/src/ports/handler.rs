//! Port trait for batch handlers.
//!
//! This is the main extensibility point for processors. Each bundle
//! implements [`BatchHandler`] to fold a batch's items into entities.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{DomainError, DomainResult};
use crate::models::{BlockRange, Ss58Codec};
use crate::ports::batch_source::{BatchSource, RawBlock, RawCall, RawEvent, RawItem, Selection};

/// Everything a handler sees while processing one batch.
pub struct BatchContext<'a> {
    /// Blocks of the batch in ascending order.
    pub blocks: &'a [RawBlock],
    /// Source for state reads at a given block.
    pub source: &'a dyn BatchSource,
    /// Address codec of the indexed network.
    pub ss58: Ss58Codec,
}

impl<'a> BatchContext<'a> {
    pub fn new(blocks: &'a [RawBlock], source: &'a dyn BatchSource, ss58: Ss58Codec) -> Self {
        Self {
            blocks,
            source,
            ss58,
        }
    }

    /// Range covered by the batch.
    pub fn range(&self) -> Option<BlockRange> {
        let first = self.blocks.first()?;
        let last = self.blocks.last()?;
        Some(BlockRange::new(first.number, last.number))
    }

    /// All items in block order.
    pub fn items(&self) -> impl Iterator<Item = (&'a RawBlock, &'a RawItem)> + use<'a> {
        self.blocks
            .iter()
            .flat_map(|block| block.items.iter().map(move |item| (block, item)))
    }

    /// Events passing `selection`, in block order.
    pub fn events<'s>(
        &self,
        selection: &'s Selection,
    ) -> impl Iterator<Item = (&'a RawBlock, &'a RawEvent)> + use<'a, 's> {
        self.items().filter_map(move |(block, item)| match item {
            RawItem::Event(event) if selection.matches_event(event) => Some((block, event)),
            _ => None,
        })
    }

    /// Calls passing `selection`, in block order.
    pub fn calls<'s>(
        &self,
        selection: &'s Selection,
    ) -> impl Iterator<Item = (&'a RawBlock, &'a RawCall)> + use<'a, 's> {
        self.items().filter_map(move |(block, item)| match item {
            RawItem::Call(call) if selection.matches_call(call) => Some((block, call)),
            _ => None,
        })
    }
}

/// Default maximum size for handler outputs (50 MB).
pub const DEFAULT_HANDLER_OUTPUTS_MAX_SIZE: usize = 50 * 1024 * 1024;

/// Accumulated outputs from pallet handlers.
#[derive(Debug)]
pub struct HandlerOutputs {
    /// Generic key-value storage for handler outputs.
    /// Key format: "bundle:entity_type" (e.g., "balances:transfers")
    pub data: HashMap<String, Vec<serde_json::Value>>,
    /// Approximate current size in bytes.
    current_size: usize,
    /// Maximum allowed size in bytes.
    max_size: usize,
}

impl Default for HandlerOutputs {
    fn default() -> Self {
        Self {
            data: HashMap::new(),
            current_size: 0,
            max_size: DEFAULT_HANDLER_OUTPUTS_MAX_SIZE,
        }
    }
}

impl HandlerOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with a custom size limit.
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            data: HashMap::new(),
            current_size: 0,
            max_size,
        }
    }

    /// Add an output entity.
    /// Returns an error if serialization fails or if the size limit would be exceeded.
    pub fn add<T: serde::Serialize>(
        &mut self,
        bundle: &str,
        entity_type: &str,
        value: T,
    ) -> DomainResult<()> {
        let json = serde_json::to_value(value).map_err(|e| {
            DomainError::DecodingError(format!(
                "Failed to serialize handler output for {}:{}: {}",
                bundle, entity_type, e
            ))
        })?;

        // Estimate the size of the JSON value
        let value_size = estimate_json_size(&json);

        // Check if adding this would exceed the limit
        if self.current_size + value_size > self.max_size {
            return Err(DomainError::ValidationError(format!(
                "Handler outputs size limit exceeded: {} + {} > {} bytes",
                self.current_size, value_size, self.max_size
            )));
        }

        let key = format!("{}:{}", bundle, entity_type);
        self.data.entry(key).or_default().push(json);
        self.current_size += value_size;

        Ok(())
    }

    /// Get the current approximate size in bytes.
    pub fn current_size(&self) -> usize {
        self.current_size
    }

    /// Add every item of an iterator under the same key.
    pub fn extend<T: serde::Serialize>(
        &mut self,
        bundle: &str,
        entity_type: &str,
        values: impl IntoIterator<Item = T>,
    ) -> DomainResult<()> {
        for value in values {
            self.add(bundle, entity_type, value)?;
        }
        Ok(())
    }

    /// Get outputs for a specific bundle and entity type.
    pub fn get(&self, bundle: &str, entity_type: &str) -> Option<&Vec<serde_json::Value>> {
        let key = format!("{}:{}", bundle, entity_type);
        self.data.get(&key)
    }

    /// Get typed outputs, failing on the first value that does not deserialize.
    pub fn get_typed<T: serde::de::DeserializeOwned>(
        &self,
        bundle: &str,
        entity_type: &str,
    ) -> DomainResult<Vec<T>> {
        let Some(values) = self.get(bundle, entity_type) else {
            return Ok(Vec::new());
        };
        values
            .iter()
            .map(|v| {
                serde_json::from_value(v.clone()).map_err(|e| {
                    DomainError::DecodingError(format!(
                        "Invalid handler output for {}:{}: {}",
                        bundle, entity_type, e
                    ))
                })
            })
            .collect()
    }

    /// Total number of values across all keys.
    pub fn len(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge another outputs into this one.
    /// Note: This does not check size limits; each handler's outputs were
    /// already bounded when built. The size is still tracked for monitoring.
    pub fn merge(&mut self, other: HandlerOutputs) {
        for (key, values) in other.data {
            self.data.entry(key).or_default().extend(values);
        }
        self.current_size += other.current_size;
    }
}

/// Estimate the size of a JSON value in bytes.
/// This is an approximation for memory tracking purposes.
fn estimate_json_size(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Null => 4,
        serde_json::Value::Bool(_) => 5,
        serde_json::Value::Number(n) => n.to_string().len(),
        serde_json::Value::String(s) => s.len() + 2, // quotes
        serde_json::Value::Array(arr) => {
            2 + arr.iter().map(estimate_json_size).sum::<usize>() + arr.len().saturating_sub(1) // commas
        }
        serde_json::Value::Object(obj) => {
            2 + obj
                .iter()
                .map(|(k, v)| k.len() + 3 + estimate_json_size(v)) // key + quotes + colon
                .sum::<usize>()
                + obj.len().saturating_sub(1) // commas
        }
    }
}

/// Trait for batch handlers.
///
/// A handler declares the items it needs, then turns each batch into
/// entity rows. Handlers must not write to the store themselves: the rows
/// they return are persisted together with the cursor in one transaction.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    /// Unique handler name (e.g., "balances").
    fn name(&self) -> &'static str;

    /// Items this handler wants delivered.
    fn selection(&self) -> Selection;

    /// Process one batch.
    ///
    /// Any error aborts the batch; nothing it produced is persisted.
    async fn handle_batch(&self, ctx: &BatchContext<'_>) -> DomainResult<HandlerOutputs>;

    /// Priority for handler execution (higher = earlier).
    fn priority(&self) -> i32 {
        0
    }
}

/// Registry for batch handlers.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn BatchHandler>>,
    ordered_handlers: Vec<Arc<dyn BatchHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            ordered_handlers: Vec::new(),
        }
    }

    /// Register a handler.
    pub fn register(&mut self, handler: Arc<dyn BatchHandler>) {
        let name = handler.name().to_string();
        self.handlers.insert(name, handler.clone());
        self.ordered_handlers.push(handler);
        // Sort by priority (descending)
        self.ordered_handlers
            .sort_by_key(|b| std::cmp::Reverse(b.priority()));
    }

    /// Get a handler by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn BatchHandler>> {
        self.handlers.get(name)
    }

    /// Get all handlers in priority order.
    pub fn all(&self) -> &[Arc<dyn BatchHandler>] {
        &self.ordered_handlers
    }

    /// Union of every handler's selection.
    pub fn selection(&self) -> Selection {
        let mut selection = Selection::new();
        for handler in &self.ordered_handlers {
            selection.merge(handler.selection());
        }
        selection
    }

    pub fn is_empty(&self) -> bool {
        self.ordered_handlers.is_empty()
    }

    /// List all registered handler names.
    pub fn registered(&self) -> Vec<&str> {
        self.ordered_handlers.iter().map(|h| h.name()).collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoding::ItemKind;
    use crate::ports::batch_source::ItemSelector;

    // Test critique: sérialisation/désérialisation roundtrip des outputs
    #[test]
    fn test_handler_outputs_typed_roundtrip() {
        #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
        struct Transfer { from: String, to: String, amount: u64 }

        let mut outputs = HandlerOutputs::new();
        let transfer = Transfer { from: "alice".into(), to: "bob".into(), amount: 100 };

        outputs.add("balances", "transfers", &transfer).unwrap();

        let retrieved: Vec<Transfer> = outputs.get_typed("balances", "transfers").unwrap();
        assert_eq!(retrieved[0], transfer);
        assert!(outputs.get_typed::<Transfer>("balances", "accounts").unwrap().is_empty());
    }

    #[test]
    fn test_handler_outputs_typed_mismatch_is_error() {
        let mut outputs = HandlerOutputs::new();
        outputs.add("balances", "transfers", "not a transfer").unwrap();
        assert!(outputs.get_typed::<Vec<u8>>("balances", "transfers").is_err());
    }

    // Test critique: protection contre les DoS via outputs trop volumineux
    #[test]
    fn test_handler_outputs_size_limit_enforced() {
        let mut outputs = HandlerOutputs::with_max_size(100);

        assert!(outputs.add("test", "data", "small").is_ok());

        let large = "x".repeat(200);
        let result = outputs.add("test", "data", &large);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("size limit"));
    }

    #[test]
    fn test_handler_outputs_merge_preserves_all() {
        let mut outputs1 = HandlerOutputs::new();
        outputs1.add("bundle1", "type1", "v1").unwrap();

        let mut outputs2 = HandlerOutputs::new();
        outputs2.extend("bundle1", "type1", ["v2"]).unwrap();
        outputs2.add("bundle2", "type2", "v3").unwrap();

        outputs1.merge(outputs2);

        let type1: Vec<String> = outputs1.get_typed("bundle1", "type1").unwrap();
        assert_eq!(type1, vec!["v1", "v2"]);
        assert_eq!(outputs1.len(), 3);
    }

    // Test critique: les handlers sont triés par priorité (décroissante)
    #[test]
    fn test_handler_registry_priority_order_and_selection() {
        struct MockHandler(&'static str, i32);

        #[async_trait]
        impl BatchHandler for MockHandler {
            fn name(&self) -> &'static str { self.0 }
            fn priority(&self) -> i32 { self.1 }
            fn selection(&self) -> Selection {
                Selection::new().with(ItemSelector::event(ItemKind::event("Balances", "Transfer")))
            }
            async fn handle_batch(&self, _: &BatchContext<'_>) -> DomainResult<HandlerOutputs> {
                Ok(HandlerOutputs::new())
            }
        }

        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(MockHandler("low", -10)));
        registry.register(Arc::new(MockHandler("high", 100)));
        registry.register(Arc::new(MockHandler("medium", 50)));

        assert_eq!(registry.registered(), vec!["high", "medium", "low"]);
        assert!(registry.get("medium").is_some());
        // Sélections identiques fusionnées
        assert_eq!(registry.selection().items.len(), 1);
    }
}
