//! Backing store collaborator.
//!
//! The mapper only ever talks to content through [`ItemStore`]: whole-item
//! snapshots for eager construction, single-field reads for lazy proxies and
//! single-field writes for saving.

mod memory;

pub use memory::{InMemoryStore, StoreStats};

use domain::{DomainResult, Item, ItemId};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Backing store trait for dependency injection.
///
/// Implementations own consistency and concurrency of their data; the
/// mapper performs no retries and no cross-field transactions.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
pub trait ItemStore: Send + Sync {
    /// Load an item with all of its raw fields
    fn get_item(&self, id: ItemId) -> DomainResult<Option<Item>>;

    /// Resolve an absolute item path to an id
    fn item_by_path(&self, path: &str) -> DomainResult<Option<ItemId>>;

    /// Read one raw field of an item
    fn read_field(&self, id: ItemId, field: &str) -> DomainResult<Option<String>>;

    /// Write one raw field of an item
    fn write_field(&self, id: ItemId, field: &str, value: &str) -> DomainResult<()>;

    /// Ids of the direct children of an item, in store order
    fn children(&self, id: ItemId) -> DomainResult<Vec<ItemId>>;
}
