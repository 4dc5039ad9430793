use serde::{Deserialize, Serialize};

use crate::storage::Collection;

/// One node of a materialized drilldown tree.
///
/// Equality is structural: two trees are equal when their node ids match and
/// their children are equal element-wise, in order. Other collection fields
/// (name, timestamps, facets) do not take part, so an alias subtree compares
/// equal to the subtree it stands in for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    /// The collection at this position.
    pub node: Collection,
    /// Materialized children, in sibling order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl PartialEq for TreeNode {
    fn eq(&self, other: &Self) -> bool {
        self.node.id == other.node.id && self.children == other.children
    }
}

impl Eq for TreeNode {}

impl TreeNode {
    /// Create a leaf.
    pub fn leaf(node: Collection) -> Self {
        Self {
            node,
            children: Vec::new(),
        }
    }

    /// Create a node with the given children.
    pub fn with_children(node: Collection, children: Vec<TreeNode>) -> Self {
        Self { node, children }
    }

    /// True when the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of nodes in the tree, this one included.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Always false: a tree holds at least its own node.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Number of levels below this node; a leaf has depth 0.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 0usize)];
        while let Some((tree, level)) = stack.pop() {
            deepest = deepest.max(level);
            stack.extend(tree.children.iter().map(|child| (child, level + 1)));
        }
        deepest
    }

    /// Pre-order iterator over the tree.
    pub fn iter(&self) -> Iter<'_> {
        Iter { stack: vec![self] }
    }

    /// First node with the given collection id, in pre-order.
    pub fn find(&self, id: &str) -> Option<&TreeNode> {
        self.iter().find(|tree| tree.node.id == id)
    }

    /// Collection ids in pre-order.
    pub fn ids(&self) -> Vec<&str> {
        self.iter().map(|tree| tree.node.id.as_str()).collect()
    }
}

/// Pre-order iterator returned by [`TreeNode::iter`].
pub struct Iter<'a> {
    stack: Vec<&'a TreeNode>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a TreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.stack.pop()?;
        self.stack.extend(tree.children.iter().rev());
        Some(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> (TreeNode, Vec<Collection>) {
        let root = Collection::new("root");
        let left = Collection::new("left").with_parent(&root.id);
        let right = Collection::new("right").with_parent(&root.id);
        let deep = Collection::new("deep").with_parent(&left.id);

        let tree = TreeNode::with_children(
            root.clone(),
            vec![
                TreeNode::with_children(left.clone(), vec![TreeNode::leaf(deep.clone())]),
                TreeNode::leaf(right.clone()),
            ],
        );
        (tree, vec![root, left, right, deep])
    }

    #[test]
    fn test_len_depth_and_leaf() {
        let (tree, _) = sample();
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.depth(), 2);
        assert!(!tree.is_leaf());
        assert!(!tree.is_empty());
        assert!(tree.children[1].is_leaf());
        assert_eq!(tree.children[1].depth(), 0);
    }

    #[test]
    fn test_ids_are_pre_order() {
        let (tree, nodes) = sample();
        let expected: Vec<&str> = vec![&nodes[0].id, &nodes[1].id, &nodes[3].id, &nodes[2].id]
            .into_iter()
            .map(String::as_str)
            .collect();
        assert_eq!(tree.ids(), expected);
    }

    #[test]
    fn test_find() {
        let (tree, nodes) = sample();
        let found = tree.find(&nodes[3].id).unwrap();
        assert_eq!(found.node.name, "deep");
        assert!(tree.find("missing").is_none());
    }

    #[test]
    fn test_equality_ignores_non_identity_fields() {
        let (tree, _) = sample();
        let mut renamed = tree.clone();
        renamed.node.name = "renamed".to_string();
        renamed.children[0].node.is_virtual = true;
        assert_eq!(tree, renamed);
    }

    #[test]
    fn test_equality_is_order_sensitive() {
        let (tree, _) = sample();
        let mut swapped = tree.clone();
        swapped.children.swap(0, 1);
        assert_ne!(tree, swapped);
    }

    #[test]
    fn test_equality_compares_nested_children() {
        let (tree, _) = sample();
        let mut pruned = tree.clone();
        pruned.children[0].children.clear();
        assert_ne!(tree, pruned);
    }

    #[test]
    fn test_serialize_omits_leaf_children() {
        let (tree, _) = sample();
        let value = serde_json::to_value(&tree).unwrap();
        assert_eq!(value["node"]["name"], "root");
        assert_eq!(value["children"].as_array().unwrap().len(), 2);
        assert!(value["children"][1].get("children").is_none());
    }
}
