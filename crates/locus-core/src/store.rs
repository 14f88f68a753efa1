//! Node store: the single source of truth for node attributes, keyed by id.
//!
//! The store tolerates dangling parent references. A child may arrive before
//! its parent; nothing here checks that `parent_id` resolves.

use std::collections::BTreeMap;

use crate::model::node::{Node, NodeId};
use crate::model::patch::{ContentPatch, Placement};

/// In-memory map from node id to node record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeStore {
    nodes: BTreeMap<NodeId, Node>,
}

impl NodeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a list of records. Later duplicates win.
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All records in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Records whose `parent_id` equals `parent_id`, in id order.
    pub fn children_of<'a>(&'a self, parent_id: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .values()
            .filter(move |n| n.parent_id.as_ref().is_some_and(|p| p.as_str() == parent_id))
    }

    /// Apply a patch onto the record for `id`, creating it if absent.
    ///
    /// `updated_at` becomes `max(existing, stamp)`, so it never decreases.
    pub fn put(
        &mut self,
        id: &NodeId,
        content: &ContentPatch,
        placement: &Placement,
        stamp: i64,
    ) -> &Node {
        let node = self
            .nodes
            .entry(id.clone())
            .or_insert_with(|| Node::new(id.clone(), None, 0.0));
        placement.apply(node);
        content.apply(node);
        node.updated_at = node.updated_at.max(stamp);
        node
    }

    /// Replace the record for `node.id` wholesale, returning the previous one.
    pub fn replace(&mut self, node: Node) -> Option<Node> {
        self.nodes.insert(node.id.clone(), node)
    }

    /// Delete the record for `id`.
    pub fn remove(&mut self, id: &str) -> Option<Node> {
        self.nodes.remove(id)
    }

    /// Drop every record except `keep`.
    pub fn retain_only(&mut self, keep: &str) {
        self.nodes.retain(|id, _| id.as_str() == keep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_creates_missing_record() {
        let mut store = NodeStore::new();
        let content = ContentPatch {
            text: Some("hello".to_string()),
            ..ContentPatch::default()
        };
        let placement = Placement::Create {
            parent_id: NodeId::from("home"),
            pos: 3.0,
        };
        let node = store.put(&NodeId::from("a"), &content, &placement, 10);
        assert_eq!(node.text, "hello");
        assert_eq!(node.parent_id, Some(NodeId::from("home")));
        assert!((node.pos - 3.0).abs() < f64::EPSILON);
        assert_eq!(node.updated_at, 10);
    }

    #[test]
    fn put_merges_onto_existing_record() {
        let mut store = NodeStore::from_nodes([Node::new("a", Some("home".into()), 1.0)
            .with_text("old")
            .with_updated_at(5)]);
        let content = ContentPatch {
            checked: Some(true),
            ..ContentPatch::default()
        };
        let node = store.put(&NodeId::from("a"), &content, &Placement::Keep, 7);
        assert_eq!(node.text, "old");
        assert!(node.checked);
        assert_eq!(node.updated_at, 7);
    }

    #[test]
    fn put_never_moves_timestamp_backwards() {
        let mut store =
            NodeStore::from_nodes([Node::new("a", Some("home".into()), 1.0).with_updated_at(100)]);
        let node = store.put(&NodeId::from("a"), &ContentPatch::default(), &Placement::Keep, 40);
        assert_eq!(node.updated_at, 100);
    }

    #[test]
    fn children_of_tolerates_dangling_parents() {
        let store = NodeStore::from_nodes([
            Node::new("a", Some("ghost".into()), 1.0),
            Node::new("b", Some("home".into()), 1.0),
        ]);
        let ids: Vec<_> = store.children_of("ghost").map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn retain_only_keeps_root() {
        let mut store = NodeStore::from_nodes([
            Node::new("home", None, 0.0),
            Node::new("a", Some("home".into()), 1.0),
        ]);
        store.retain_only("home");
        assert_eq!(store.len(), 1);
        assert!(store.contains("home"));
    }

    #[test]
    fn remove_returns_record() {
        let mut store = NodeStore::from_nodes([Node::new("a", None, 0.0)]);
        assert!(store.remove("a").is_some());
        assert!(store.remove("a").is_none());
        assert!(store.is_empty());
    }
}
