//! Per-batch entity maps.
//!
//! An [`EntityMap`] is created at the start of a batch from the rows already
//! in the store, mutated while the batch's records are folded in, and drained
//! into handler outputs at the end. It never outlives the batch.

use std::collections::BTreeMap;

/// A record keyed by a string primary key.
pub trait Entity {
    fn id(&self) -> &str;
}

/// Identity-keyed arena for one batch.
///
/// Iteration order is by id, so outputs are deterministic for a given batch.
#[derive(Debug, Clone)]
pub struct EntityMap<E> {
    entries: BTreeMap<String, E>,
}

impl<E> Default for EntityMap<E> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<E: Entity> EntityMap<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the map with rows loaded from the store.
    pub fn from_existing(existing: impl IntoIterator<Item = E>) -> Self {
        let entries = existing
            .into_iter()
            .map(|e| (e.id().to_string(), e))
            .collect();
        Self { entries }
    }

    pub fn get(&self, id: &str) -> Option<&E> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut E> {
        self.entries.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Return the entity with `id`, creating it with `create` on first use.
    pub fn get_or_insert_with(&mut self, id: &str, create: impl FnOnce() -> E) -> &mut E {
        self.entries
            .entry(id.to_string())
            .or_insert_with(create)
    }

    /// Insert or replace.
    pub fn insert(&mut self, entity: E) {
        self.entries.insert(entity.id().to_string(), entity);
    }

    pub fn remove(&mut self, id: &str) -> Option<E> {
        self.entries.remove(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &E> {
        self.entries.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut E> {
        self.entries.values_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_values(self) -> Vec<E> {
        self.entries.into_values().collect()
    }
}
