//! In-process item store.
//!
//! Used by the CLI to serve JSON fixtures and by tests that need to observe
//! exactly how many store reads a construction performed.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use domain::{DomainError, DomainResult, Item, ItemId, PATH_SEPARATOR};

use super::ItemStore;

/// Read/write counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub reads: u64,
    pub writes: u64,
}

/// Thread-safe in-memory store keeping items in insertion order.
#[derive(Default)]
pub struct InMemoryStore {
    items: RwLock<IndexMap<ItemId, Item>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

/// JSON fixture layout: `{ "items": [ ... ] }`
#[derive(Debug, Deserialize, Serialize)]
struct Fixture {
    items: Vec<Item>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with items
    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        let store = Self::new();
        for item in items {
            store.insert(item);
        }
        store
    }

    /// Parse a JSON fixture document
    pub fn from_json(json: &str) -> DomainResult<Self> {
        let fixture: Fixture = serde_json::from_str(json)
            .map_err(|e| DomainError::store(format!("Invalid store fixture: {}", e)))?;
        Ok(Self::with_items(fixture.items))
    }

    /// Load a JSON fixture file
    pub fn from_json_file(path: impl AsRef<Path>) -> DomainResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            DomainError::store(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Insert or replace an item
    pub fn insert(&self, item: Item) {
        self.items.write().insert(item.id, item);
    }

    /// Snapshot of an item without counting it as a read
    pub fn peek(&self, id: ItemId) -> Option<Item> {
        self.items.read().get(&id).cloned()
    }

    /// Number of items held
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether the store holds no items
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current read/write counters
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    /// Reset read/write counters to zero
    pub fn reset_stats(&self) {
        self.reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
    }

    fn count_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }
}

impl ItemStore for InMemoryStore {
    fn get_item(&self, id: ItemId) -> DomainResult<Option<Item>> {
        self.count_read();
        Ok(self.items.read().get(&id).cloned())
    }

    fn item_by_path(&self, path: &str) -> DomainResult<Option<ItemId>> {
        self.count_read();
        let wanted = path.trim_end_matches(PATH_SEPARATOR);
        Ok(self
            .items
            .read()
            .values()
            .find(|item| item.path.eq_ignore_ascii_case(wanted))
            .map(|item| item.id))
    }

    fn read_field(&self, id: ItemId, field: &str) -> DomainResult<Option<String>> {
        self.count_read();
        let items = self.items.read();
        let item = items
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("item {}", id)))?;
        Ok(item.field(field).map(str::to_string))
    }

    fn write_field(&self, id: ItemId, field: &str, value: &str) -> DomainResult<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut items = self.items.write();
        let item = items
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("item {}", id)))?;
        item.set_field(field, value);
        Ok(())
    }

    fn children(&self, id: ItemId) -> DomainResult<Vec<ItemId>> {
        self.count_read();
        Ok(self
            .items
            .read()
            .values()
            .filter(|item| item.parent_id == Some(id))
            .map(|item| item.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (InMemoryStore, ItemId, ItemId) {
        let home = Item::new(ItemId::new_random(), "home", ItemId::NULL);
        let news = Item::new(ItemId::new_random(), "News", ItemId::NULL)
            .with_parent(&home)
            .with_field("Title", "Latest");
        let (home_id, news_id) = (home.id, news.id);
        (InMemoryStore::with_items([home, news]), home_id, news_id)
    }

    #[test]
    fn test_reads_are_counted() {
        let (store, _, news) = store();
        assert_eq!(
            store.read_field(news, "Title").unwrap().as_deref(),
            Some("Latest")
        );
        assert!(store.read_field(news, "Missing").unwrap().is_none());
        assert!(store.peek(news).is_some());
        assert_eq!(store.stats(), StoreStats { reads: 2, writes: 0 });

        store.reset_stats();
        assert_eq!(store.stats().reads, 0);
    }

    #[test]
    fn test_path_lookup_ignores_case_and_trailing_slash() {
        let (store, _, news) = store();
        assert_eq!(store.item_by_path("/HOME/news/").unwrap(), Some(news));
        assert_eq!(store.item_by_path("/home/missing").unwrap(), None);
    }

    #[test]
    fn test_children_in_insertion_order() {
        let (store, home, news) = store();
        let extra = Item::new(ItemId::new_random(), "Events", ItemId::NULL)
            .with_parent(&store.peek(home).unwrap());
        let extra_id = extra.id;
        store.insert(extra);
        assert_eq!(store.children(home).unwrap(), vec![news, extra_id]);
    }

    #[test]
    fn test_write_to_missing_item_fails() {
        let (store, _, news) = store();
        store.write_field(news, "Title", "Updated").unwrap();
        assert_eq!(store.peek(news).unwrap().field("Title"), Some("Updated"));

        let err = store
            .write_field(ItemId::new_random(), "Title", "x")
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn test_fixture_parsing() {
        let json = r#"{ "items": [
            { "id": "{6F1C2B9E-4D1A-4C3B-9A55-0E2F7A1B3C4D}", "name": "home", "path": "/home",
              "fields": { "Title": "Welcome" } }
        ] }"#;
        let store = InMemoryStore::from_json(json).unwrap();
        assert_eq!(store.len(), 1);
        assert!(InMemoryStore::from_json("{").is_err());
    }
}
