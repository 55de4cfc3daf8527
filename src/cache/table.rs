//! Item cache implementation
//!
//! HashMap-based cache with RwLock for concurrency.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::Record;
use crate::host::Item;

/// Id → item map, holding items with their original labels restored
pub struct ItemCache {
    entries: RwLock<HashMap<String, Item>>,
}

impl ItemCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Get a clone of the cached item (read lock)
    pub fn get(&self, id: &str) -> Option<Item> {
        self.entries.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Insert or replace an item (write lock)
    ///
    /// Returns the previous item, if any
    pub fn insert(&self, id: String, item: Item) -> Option<Item> {
        self.entries.write().insert(id, item)
    }

    /// Remove an item (write lock)
    pub fn remove(&self, id: &str) -> Option<Item> {
        self.entries.write().remove(id)
    }

    /// Remove a set of ids, returning those that were present
    pub fn remove_many<'a, I>(&self, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut entries = self.entries.write();
        ids.into_iter()
            .filter(|id| entries.remove(id.as_str()).is_some())
            .cloned()
            .collect()
    }

    /// Snapshot of all records
    pub fn snapshot(&self) -> Vec<Record> {
        self.entries
            .read()
            .iter()
            .map(|(id, item)| Record {
                id: id.clone(),
                item: item.clone(),
            })
            .collect()
    }

    /// Snapshot of all ids
    pub fn ids(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for ItemCache {
    fn default() -> Self {
        Self::new()
    }
}
