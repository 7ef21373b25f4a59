//! Item Catalog
//!
//! The caller-owned `id → MusicItem` map the retrieval engine resolves store
//! hits against.
//!
//! - [`ItemCache`]: read side used by the engine
//! - [`ItemCatalog`]: read/write side used by the indexer
//! - [`MemoryCatalog`]: in-memory map
//! - [`SqliteCatalog`]: persistent SQLite catalog (JSON rows, WAL)

mod migrations;
mod sqlite;

pub use migrations::MIGRATIONS;
pub use sqlite::{SqliteCatalog, CATALOG_FILE};

use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::MusicItem;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Catalog error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Stored row could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

// ============================================================================
// TRAITS
// ============================================================================

/// Lookup of full items by id. A missing id is `Ok(None)`.
pub trait ItemCache: Send + Sync {
    fn get_item(&self, id: &str) -> Result<Option<MusicItem>, CatalogError>;
}

/// Writable catalogue of items
pub trait ItemCatalog: ItemCache {
    /// Insert or replace an item
    fn put_item(&self, item: &MusicItem) -> Result<(), CatalogError>;

    /// Insert or replace several items
    fn put_items(&self, items: &[MusicItem]) -> Result<(), CatalogError> {
        items.iter().try_for_each(|item| self.put_item(item))
    }

    /// Delete an item, returning whether it existed
    fn remove_item(&self, id: &str) -> Result<bool, CatalogError>;

    /// Number of items
    fn count(&self) -> Result<usize, CatalogError>;

    /// Every item, ordered by id
    fn list_items(&self) -> Result<Vec<MusicItem>, CatalogError>;
}

impl ItemCache for HashMap<String, MusicItem> {
    fn get_item(&self, id: &str) -> Result<Option<MusicItem>, CatalogError> {
        Ok(self.get(id).cloned())
    }
}

// ============================================================================
// MEMORY CATALOG
// ============================================================================

/// Thread-safe in-memory catalog
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    items: RwLock<HashMap<String, MusicItem>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ItemCache for MemoryCatalog {
    fn get_item(&self, id: &str) -> Result<Option<MusicItem>, CatalogError> {
        let items = self
            .items
            .read()
            .map_err(|e| CatalogError::LockPoisoned(e.to_string()))?;
        Ok(items.get(id).cloned())
    }
}

impl ItemCatalog for MemoryCatalog {
    fn put_item(&self, item: &MusicItem) -> Result<(), CatalogError> {
        let mut items = self
            .items
            .write()
            .map_err(|e| CatalogError::LockPoisoned(e.to_string()))?;
        items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    fn remove_item(&self, id: &str) -> Result<bool, CatalogError> {
        let mut items = self
            .items
            .write()
            .map_err(|e| CatalogError::LockPoisoned(e.to_string()))?;
        Ok(items.remove(id).is_some())
    }

    fn count(&self) -> Result<usize, CatalogError> {
        let items = self
            .items
            .read()
            .map_err(|e| CatalogError::LockPoisoned(e.to_string()))?;
        Ok(items.len())
    }

    fn list_items(&self) -> Result<Vec<MusicItem>, CatalogError> {
        let items = self
            .items
            .read()
            .map_err(|e| CatalogError::LockPoisoned(e.to_string()))?;
        let mut all: Vec<MusicItem> = items.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashmap_cache() {
        let mut map = HashMap::new();
        map.insert("a".to_string(), MusicItem::new("a", "T", "A"));
        assert!(map.get_item("a").unwrap().is_some());
        assert!(map.get_item("b").unwrap().is_none());
    }

    #[test]
    fn test_memory_catalog() {
        let catalog = MemoryCatalog::new();
        catalog
            .put_items(&[MusicItem::new("b", "B", "X"), MusicItem::new("a", "A", "X")])
            .unwrap();
        assert_eq!(catalog.count().unwrap(), 2);

        let ids: Vec<String> = catalog.list_items().unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["a", "b"]);

        // Replace
        catalog.put_item(&MusicItem::new("a", "A2", "X")).unwrap();
        assert_eq!(catalog.get_item("a").unwrap().unwrap().title, "A2");
        assert_eq!(catalog.count().unwrap(), 2);

        assert!(catalog.remove_item("a").unwrap());
        assert!(!catalog.remove_item("a").unwrap());
        assert_eq!(catalog.count().unwrap(), 1);
    }
}
