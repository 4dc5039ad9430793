use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};

use super::path::root_of;
use super::tree::TreeNode;
use crate::error::{HierarchyError, HierarchyResult};
use crate::storage::{Collection, CollectionStore};

/// Materialize the full subtree below `id`.
///
/// An alias (a collection with `reference` set) keeps its own node but takes
/// the children of the collection it references, following chained
/// references. Children come in store order. A collection reached again
/// while it is still on the active path, by descent or by reference, fails
/// the whole build with [`HierarchyError::CycleDetected`].
pub async fn drilldown_tree<S>(store: &S, id: &str) -> HierarchyResult<TreeNode>
where
    S: CollectionStore + ?Sized,
{
    let start = store
        .get_collection(id)
        .await?
        .ok_or_else(|| HierarchyError::NotFound {
            collection_id: id.to_string(),
            referenced_by: None,
            path: Vec::new(),
        })?;

    build(store, start).await
}

/// Materialize the whole tree that contains `id`, starting from its root.
pub async fn get_tree<S>(store: &S, id: &str) -> HierarchyResult<TreeNode>
where
    S: CollectionStore + ?Sized,
{
    let root = root_of(store, id).await?;
    build(store, root).await
}

/// Ids on the path from the build's start down to the frame being expanded,
/// alias targets included.
#[derive(Default)]
struct ActivePath {
    ids: Vec<String>,
    members: HashSet<String>,
}

impl ActivePath {
    fn enter(&mut self, id: &str) -> HierarchyResult<()> {
        if !self.members.insert(id.to_string()) {
            warn!(collection_id = %id, depth = self.ids.len(), "Cycle in collection tree");
            return Err(HierarchyError::CycleDetected {
                collection_id: id.to_string(),
                path: self.ids.clone(),
            });
        }
        self.ids.push(id.to_string());
        Ok(())
    }

    fn leave(&mut self, count: usize) {
        for _ in 0..count {
            if let Some(id) = self.ids.pop() {
                self.members.remove(&id);
            }
        }
    }
}

struct Frame {
    node: Collection,
    pending: VecDeque<Collection>,
    children: Vec<TreeNode>,
    entered: usize,
}

async fn open<S>(store: &S, path: &mut ActivePath, node: Collection) -> HierarchyResult<Frame>
where
    S: CollectionStore + ?Sized,
{
    path.enter(&node.id)?;
    let mut entered = 1;

    let mut source_id = node.id.clone();
    let mut target_id = node.reference.clone();
    while let Some(id) = target_id {
        let target = store
            .get_collection(&id)
            .await?
            .ok_or_else(|| HierarchyError::NotFound {
                collection_id: id.clone(),
                referenced_by: Some(source_id.clone()),
                path: path.ids.clone(),
            })?;
        path.enter(&target.id)?;
        entered += 1;
        source_id = target.id;
        target_id = target.reference;
    }

    let pending = store.get_children(&source_id).await?.into();
    Ok(Frame {
        node,
        pending,
        children: Vec::new(),
        entered,
    })
}

async fn build<S>(store: &S, start: Collection) -> HierarchyResult<TreeNode>
where
    S: CollectionStore + ?Sized,
{
    let start_id = start.id.clone();
    let mut path = ActivePath::default();
    let mut current = open(store, &mut path, start).await?;
    let mut stack: Vec<Frame> = Vec::new();
    let mut expanded = 1usize;

    // `current` is the frame being expanded; `stack` holds its open ancestors.
    loop {
        if let Some(child) = current.pending.pop_front() {
            let frame = open(store, &mut path, child).await?;
            stack.push(std::mem::replace(&mut current, frame));
            expanded += 1;
            continue;
        }

        path.leave(current.entered);
        match stack.pop() {
            Some(parent) => {
                let done = std::mem::replace(&mut current, parent);
                current
                    .children
                    .push(TreeNode::with_children(done.node, done.children));
            }
            None => {
                debug!(collection_id = %start_id, nodes = expanded, "Built drilldown tree");
                return Ok(TreeNode::with_children(current.node, current.children));
            }
        }
    }
}
