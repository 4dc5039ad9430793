//! Hierarchy engine over the collection store.
//!
//! - [`root_of`] walks `parent_id` links up to the root of a collection's tree.
//! - [`path_to_root`] yields the same walk lazily, start first, root last.
//! - [`drilldown_tree`] materializes the subtree below a collection,
//!   substituting referenced subtrees for aliases.
//! - [`get_tree`] is `drilldown_tree` applied to `root_of`.
//!
//! Every operation takes the store handle explicitly and only reads from it.
//!
//! # Consistency
//!
//! Traversals do not read from a snapshot. Each lookup sees the store as it
//! is at that moment, so a traversal running alongside a structural edit can
//! observe part of the edit: a child may appear in one branch and be missing
//! from another. Traversals still terminate. Walks upward are bounded by the
//! collection count and tree builds refuse to re-enter a collection already
//! on the active path.

mod drilldown;
mod path;
mod tree;

pub use drilldown::{drilldown_tree, get_tree};
pub use path::{path_to_root, root_of, PathToRoot};
pub use tree::{Iter, TreeNode};

use crate::error::{HierarchyError, HierarchyResult};
use crate::storage::{Collection, CollectionStore};

impl Collection {
    /// Materialize the subtree below this collection.
    pub async fn drilldown_tree<S>(&self, store: &S) -> HierarchyResult<TreeNode>
    where
        S: CollectionStore + ?Sized,
    {
        drilldown_tree(store, &self.id).await
    }

    /// Materialize the whole tree this collection belongs to.
    pub async fn get_tree<S>(&self, store: &S) -> HierarchyResult<TreeNode>
    where
        S: CollectionStore + ?Sized,
    {
        get_tree(store, &self.id).await
    }

    /// Walk from this collection up to its root.
    pub fn path_to_root<'a, S>(&self, store: &'a S) -> PathToRoot<'a, S>
    where
        S: CollectionStore + ?Sized,
    {
        path_to_root(store, self.id.clone())
    }

    /// Root of this collection's tree.
    pub async fn root<S>(&self, store: &S) -> HierarchyResult<Collection>
    where
        S: CollectionStore + ?Sized,
    {
        root_of(store, &self.id).await
    }

    /// Structural parent, if any.
    pub async fn parent<S>(&self, store: &S) -> HierarchyResult<Option<Collection>>
    where
        S: CollectionStore + ?Sized,
    {
        match &self.parent_id {
            Some(parent_id) => self.resolve(store, parent_id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Direct structural children, ignoring any reference.
    pub async fn children<S>(&self, store: &S) -> HierarchyResult<Vec<Collection>>
    where
        S: CollectionStore + ?Sized,
    {
        Ok(store.get_children(&self.id).await?)
    }

    /// The collection this alias references, if any.
    pub async fn referenced_collection<S>(&self, store: &S) -> HierarchyResult<Option<Collection>>
    where
        S: CollectionStore + ?Sized,
    {
        match &self.reference {
            Some(reference) => self.resolve(store, reference).await.map(Some),
            None => Ok(None),
        }
    }

    async fn resolve<S>(&self, store: &S, id: &str) -> HierarchyResult<Collection>
    where
        S: CollectionStore + ?Sized,
    {
        store
            .get_collection(id)
            .await?
            .ok_or_else(|| HierarchyError::NotFound {
                collection_id: id.to_string(),
                referenced_by: Some(self.id.clone()),
                path: vec![self.id.clone()],
            })
    }
}
