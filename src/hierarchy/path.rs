use tracing::{debug, warn};

use crate::error::{HierarchyError, HierarchyResult};
use crate::storage::{Collection, CollectionStore};

/// Lazy walk from a collection up to its root along `parent_id` links.
///
/// Yields the start collection first and the root last. Reference edges are
/// never followed. Each step reads the store afresh; [`PathToRoot::restart`]
/// rewinds the walk so the next step re-reads the start collection.
///
/// The walk fails with [`HierarchyError::CycleDetected`] once it would yield
/// more collections than the store holds, and with
/// [`HierarchyError::NotFound`] when a link points nowhere. Either error
/// carries the ids yielded before the failure. After an error the walk is
/// exhausted.
pub struct PathToRoot<'a, S: ?Sized> {
    store: &'a S,
    start_id: String,
    state: Step,
    trail: Vec<String>,
    bound: Option<u64>,
}

enum Step {
    Start,
    Parent { id: String, child_id: String },
    Done,
}

/// Begin a path-to-root walk at `id`.
pub fn path_to_root<'a, S>(store: &'a S, id: impl Into<String>) -> PathToRoot<'a, S>
where
    S: CollectionStore + ?Sized,
{
    PathToRoot {
        store,
        start_id: id.into(),
        state: Step::Start,
        trail: Vec::new(),
        bound: None,
    }
}

/// Find the root of the structural tree containing `id`.
pub async fn root_of<S>(store: &S, id: &str) -> HierarchyResult<Collection>
where
    S: CollectionStore + ?Sized,
{
    let mut walk = path_to_root(store, id);
    let mut last = None;
    while let Some(step) = walk.next().await {
        last = Some(step?);
    }

    let root = last.ok_or_else(|| HierarchyError::NotFound {
        collection_id: id.to_string(),
        referenced_by: None,
        path: Vec::new(),
    })?;
    debug!(collection_id = %id, root_id = %root.id, "Resolved root");
    Ok(root)
}

impl<'a, S> PathToRoot<'a, S>
where
    S: CollectionStore + ?Sized,
{
    /// Advance to the next collection on the path, or `None` past the root.
    pub async fn next(&mut self) -> Option<HierarchyResult<Collection>> {
        let step = match std::mem::replace(&mut self.state, Step::Done) {
            Step::Done => return None,
            Step::Start => self.fetch(self.start_id.clone(), None).await,
            Step::Parent { id, child_id } => self.climb(id, child_id).await,
        };

        match step {
            Ok(collection) => {
                self.trail.push(collection.id.clone());
                if let Some(parent_id) = &collection.parent_id {
                    self.state = Step::Parent {
                        id: parent_id.clone(),
                        child_id: collection.id.clone(),
                    };
                }
                Some(Ok(collection))
            }
            Err(e) => Some(Err(e)),
        }
    }

    /// Rewind to the start collection.
    pub fn restart(&mut self) {
        self.state = Step::Start;
        self.trail.clear();
        self.bound = None;
    }

    /// Drain the remaining walk into a vector.
    pub async fn collect(mut self) -> HierarchyResult<Vec<Collection>> {
        let mut path = Vec::new();
        while let Some(step) = self.next().await {
            path.push(step?);
        }
        Ok(path)
    }

    /// Ids yielded so far, start first.
    pub fn visited(&self) -> &[String] {
        &self.trail
    }

    async fn climb(&mut self, id: String, child_id: String) -> HierarchyResult<Collection> {
        let bound = match self.bound {
            Some(bound) => bound,
            None => {
                let bound = self.store.count_collections().await?;
                self.bound = Some(bound);
                bound
            }
        };

        if self.trail.len() as u64 >= bound {
            warn!(
                collection_id = %id,
                start_id = %self.start_id,
                hops = self.trail.len(),
                "Parent chain longer than the store; structural cycle"
            );
            return Err(HierarchyError::CycleDetected {
                collection_id: id,
                path: self.trail.clone(),
            });
        }

        self.fetch(id, Some(child_id)).await
    }

    async fn fetch(&self, id: String, referenced_by: Option<String>) -> HierarchyResult<Collection> {
        match self.store.get_collection(&id).await? {
            Some(collection) => Ok(collection),
            None => {
                if let Some(child_id) = &referenced_by {
                    warn!(
                        collection_id = %id,
                        child_id = %child_id,
                        start_id = %self.start_id,
                        "Parent link points to a missing collection"
                    );
                }
                Err(HierarchyError::NotFound {
                    collection_id: id,
                    referenced_by,
                    path: self.trail.clone(),
                })
            }
        }
    }
}
