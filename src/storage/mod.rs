//! Storage layer for collection persistence.
//!
//! This module defines the [`Collection`] record, the [`CollectionStore`]
//! trait the hierarchy engine reads through, and a SQLite-backed
//! implementation of it.
//!
//! Every write validates the structural invariants before committing:
//! no collection may be its own parent, a parent change may not close a
//! structural cycle, and `parent_id` / `reference` must name existing
//! collections. Deleting a collection that is still a parent or a reference
//! target is rejected.

mod sqlite;


pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;

/// A named node in the classification hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Unique collection identifier.
    pub id: String,
    /// Display label.
    pub name: String,
    /// Structural parent; `None` for a tree root.
    pub parent_id: Option<String>,
    /// Marks a computed/filtered view rather than a primary node.
    #[serde(rename = "virtual", default)]
    pub is_virtual: bool,
    /// Aliased collection whose subtree stands in for this node's children.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Search query selecting the records of this collection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Attached facet descriptors, in display order.
    #[serde(default)]
    pub facets: Vec<FacetDescriptor>,
    /// When the collection was created.
    pub created_at: DateTime<Utc>,
    /// When the collection was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Facet attached to a collection.
///
/// The hierarchy engine never inspects facets; they travel with the
/// collection through every traversal result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetDescriptor {
    /// Facet name as understood by the facet subsystem.
    pub name: String,
    /// Optional facet-specific settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,
}

impl Collection {
    /// Create a new root collection with a fresh id.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            parent_id: None,
            is_virtual: false,
            reference: None,
            query: None,
            facets: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Place the collection under a parent.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Make the collection an alias of another collection.
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Set the search query.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Append a facet.
    pub fn with_facet(mut self, facet: FacetDescriptor) -> Self {
        self.facets.push(facet);
        self
    }

    /// Flag the collection as virtual.
    pub fn as_virtual(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    /// True when the collection has no structural parent.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// True when the collection aliases another collection.
    pub fn is_alias(&self) -> bool {
        self.reference.is_some()
    }
}

impl FacetDescriptor {
    /// Create a facet descriptor without settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: None,
        }
    }

    /// Attach facet settings.
    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = Some(settings);
        self
    }
}

/// Storage trait for collection persistence.
///
/// Reads return live data; nothing is cached between calls. Writes are
/// transactional: a rejected edit leaves the store untouched.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Create a new collection.
    async fn create_collection(&self, collection: &Collection) -> StorageResult<()>;
    /// Get a collection by ID.
    async fn get_collection(&self, id: &str) -> StorageResult<Option<Collection>>;
    /// Get the direct structural children of a collection, in insertion order.
    async fn get_children(&self, parent_id: &str) -> StorageResult<Vec<Collection>>;
    /// Get all collections, in insertion order.
    async fn list_collections(&self) -> StorageResult<Vec<Collection>>;
    /// Count all collections.
    async fn count_collections(&self) -> StorageResult<u64>;
    /// Get the first collection with the given name, in insertion order.
    async fn find_by_name(&self, name: &str) -> StorageResult<Option<Collection>>;
    /// Get the collections that alias the given collection.
    async fn get_referrers(&self, id: &str) -> StorageResult<Vec<Collection>>;
    /// Update an existing collection, replacing its facets.
    async fn update_collection(&self, collection: &Collection) -> StorageResult<()>;
    /// Delete a collection by ID.
    async fn delete_collection(&self, id: &str) -> StorageResult<()>;
}
