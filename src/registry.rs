//! Work item registry.
//!
//! Ordered mapping from hash to the current item. Order is session order and
//! is never changed by updates. Items are stored behind `Arc`; an update
//! builds a new item and swaps the pointer, so any reader still holding the
//! old `Arc` keeps a consistent snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{Hash, WorkItem};

#[derive(Debug, Default, Clone)]
pub struct Registry {
    items: Vec<Arc<WorkItem>>,
    index: HashMap<Hash, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a target list. Later duplicates of a hash are dropped.
    pub fn from_items(items: impl IntoIterator<Item = WorkItem>) -> Self {
        let mut registry = Self::new();
        for item in items {
            let hash = item.hash.clone();
            if !registry.insert(item) {
                tracing::warn!(%hash, "duplicate hash in target list, keeping first occurrence");
            }
        }
        registry
    }

    /// Append an item. Returns false if the hash is already present.
    pub fn insert(&mut self, item: WorkItem) -> bool {
        if self.index.contains_key(&item.hash) {
            return false;
        }
        self.index.insert(item.hash.clone(), self.items.len());
        self.items.push(Arc::new(item));
        true
    }

    pub fn get(&self, hash: &Hash) -> Option<Arc<WorkItem>> {
        self.index.get(hash).map(|&i| Arc::clone(&self.items[i]))
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.index.contains_key(hash)
    }

    /// Replace the item with `hash` by `mutation(current)`.
    ///
    /// No-op (returns false) when the hash is absent. The mutation must keep
    /// the hash; identity is not allowed to change through an update.
    pub fn upsert<F>(&mut self, hash: &Hash, mutation: F) -> bool
    where
        F: FnOnce(&WorkItem) -> WorkItem,
    {
        let Some(&i) = self.index.get(hash) else {
            return false;
        };
        let next = mutation(&self.items[i]);
        debug_assert_eq!(&next.hash, hash, "registry update changed item identity");
        self.items[i] = Arc::new(next);
        true
    }

    /// All items in session order.
    pub fn all(&self) -> impl Iterator<Item = &Arc<WorkItem>> {
        self.items.iter()
    }

    /// Owned snapshot of every item in session order.
    pub fn snapshot(&self) -> Vec<Arc<WorkItem>> {
        self.items.clone()
    }

    /// First item in session order matching `pred`.
    pub fn find(&self, pred: impl Fn(&WorkItem) -> bool) -> Option<&Arc<WorkItem>> {
        self.items.iter().find(|item| pred(item))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.index.clear();
    }
}
