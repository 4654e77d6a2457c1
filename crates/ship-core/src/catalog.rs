//! Item lookups used by staging.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Broad item category. Only [`ItemCategory::Product`] can be shipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemCategory {
    Product,
    Ingredient,
    Equipment,
    Other,
}

/// What the catalog knows about an item id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub name: String,
    pub category: ItemCategory,
    /// Quality/packaging variant, when the item has one.
    #[serde(default)]
    pub variant_id: Option<String>,
}

impl CatalogItem {
    pub fn product(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: ItemCategory::Product,
            variant_id: None,
        }
    }
}

/// The catalog itself failed (as opposed to not knowing an item).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("catalog lookup for `{item_id}` failed: {reason}")]
pub struct CatalogError {
    pub item_id: String,
    pub reason: String,
}

/// Resolves item ids to catalog entries.
pub trait ItemCatalog {
    /// `Ok(None)` means the id is unknown.
    fn resolve(&self, item_id: &str) -> Result<Option<CatalogItem>, CatalogError>;
}

/// In-memory catalog, typically loaded from a YAML file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticCatalog {
    items: BTreeMap<String, CatalogItem>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, item_id: impl Into<String>, item: CatalogItem) -> Self {
        self.insert(item_id, item);
        self
    }

    pub fn insert(&mut self, item_id: impl Into<String>, item: CatalogItem) {
        self.items.insert(item_id.into(), item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ids of every shippable item, in id order.
    pub fn product_ids(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter(|(_, item)| item.category == ItemCategory::Product)
            .map(|(id, _)| id.as_str())
    }
}

impl ItemCatalog for StaticCatalog {
    fn resolve(&self, item_id: &str) -> Result<Option<CatalogItem>, CatalogError> {
        Ok(self.items.get(item_id).cloned())
    }
}
