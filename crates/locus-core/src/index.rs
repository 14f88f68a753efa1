//! Child index: parent id to ordered child ids.
//!
//! Derived from the [`NodeStore`]; never authoritative. Every entry lists the
//! ids whose `parent_id` is that parent, sorted by [`Node::sibling_order`].
//! Mutation is crate-private so only the reconciler can touch it.
//!
//! [`Node::sibling_order`]: crate::model::node::Node::sibling_order

use serde::Serialize;
use std::collections::BTreeMap;

use crate::model::node::NodeId;
use crate::store::NodeStore;

/// Derived parent → ordered children mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChildIndex {
    entries: BTreeMap<NodeId, Vec<NodeId>>,
}

impl ChildIndex {
    /// Build the full index from scratch.
    #[must_use]
    pub fn build(store: &NodeStore) -> Self {
        let mut entries: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        for node in store.iter() {
            if let Some(parent_id) = &node.parent_id {
                entries.entry(parent_id.clone()).or_default().push(node.id.clone());
            }
        }
        for ids in entries.values_mut() {
            sort_siblings(ids, store);
        }
        Self { entries }
    }

    /// An index holding only an empty entry for `root_id`.
    #[must_use]
    pub fn rooted(root_id: &NodeId) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(root_id.clone(), Vec::new());
        Self { entries }
    }

    /// Ordered children of `parent_id`; empty when there is no entry.
    #[must_use]
    pub fn children(&self, parent_id: &str) -> &[NodeId] {
        self.entries.get(parent_id).map_or(&[], Vec::as_slice)
    }

    /// The entry for `parent_id`, if one exists.
    #[must_use]
    pub fn get(&self, parent_id: &str) -> Option<&[NodeId]> {
        self.entries.get(parent_id).map(Vec::as_slice)
    }

    /// All entries in parent-id order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &[NodeId])> {
        self.entries.iter().map(|(p, c)| (p, c.as_slice()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recompute the entry for `parent_id` by scanning the store.
    pub(crate) fn rebuild_for(&mut self, parent_id: &NodeId, store: &NodeStore) {
        let mut ids: Vec<NodeId> = store
            .children_of(parent_id.as_str())
            .map(|n| n.id.clone())
            .collect();
        sort_siblings(&mut ids, store);
        self.entries.insert(parent_id.clone(), ids);
    }

    /// Add `id` under `parent_id` (creating the entry), dedupe, and re-sort.
    pub(crate) fn insert_sorted(&mut self, parent_id: &NodeId, id: &NodeId, store: &NodeStore) {
        let ids = self.entries.entry(parent_id.clone()).or_default();
        if !ids.contains(id) {
            ids.push(id.clone());
        }
        sort_siblings(ids, store);
    }

    /// Remove `id` from the entry for `parent_id`, keeping the (possibly empty) entry.
    pub(crate) fn detach(&mut self, parent_id: &str, id: &str) {
        if let Some(ids) = self.entries.get_mut(parent_id) {
            ids.retain(|c| c.as_str() != id);
        }
    }

    /// Drop everything and start over with an empty `root_id` entry.
    pub(crate) fn reset_to_root(&mut self, root_id: &NodeId) {
        *self = Self::rooted(root_id);
    }
}

/// Sort ids by their records' sibling order, dropping ids with no record.
fn sort_siblings(ids: &mut Vec<NodeId>, store: &NodeStore) {
    ids.retain(|id| store.contains(id.as_str()));
    ids.sort_by(|a, b| match (store.get(a.as_str()), store.get(b.as_str())) {
        (Some(na), Some(nb)) => na.sibling_order(nb),
        _ => a.cmp(b),
    });
    ids.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::Node;

    fn store() -> NodeStore {
        NodeStore::from_nodes([
            Node::new("home", None, 0.0),
            Node::new("c", Some("home".into()), 3.0),
            Node::new("a", Some("home".into()), 1.0),
            Node::new("b", Some("home".into()), 2.0),
            Node::new("x", Some("a".into()), 1.0),
        ])
    }

    fn ids(slice: &[NodeId]) -> Vec<&str> {
        slice.iter().map(NodeId::as_str).collect()
    }

    #[test]
    fn build_sorts_by_pos() {
        let index = ChildIndex::build(&store());
        assert_eq!(ids(index.children("home")), vec!["a", "b", "c"]);
        assert_eq!(ids(index.children("a")), vec!["x"]);
        assert!(index.get("x").is_none());
    }

    #[test]
    fn rebuild_for_creates_empty_entry() {
        let mut index = ChildIndex::default();
        index.rebuild_for(&NodeId::from("b"), &store());
        assert_eq!(index.get("b"), Some(&[][..]));
    }

    #[test]
    fn insert_sorted_dedupes() {
        let store = store();
        let mut index = ChildIndex::rooted(&NodeId::from("home"));
        index.insert_sorted(&"home".into(), &"c".into(), &store);
        index.insert_sorted(&"home".into(), &"a".into(), &store);
        index.insert_sorted(&"home".into(), &"c".into(), &store);
        assert_eq!(ids(index.children("home")), vec!["a", "c"]);
    }

    #[test]
    fn detach_keeps_entry() {
        let mut index = ChildIndex::build(&store());
        index.detach("a", "x");
        assert_eq!(index.get("a"), Some(&[][..]));
    }

    #[test]
    fn equal_positions_fall_back_to_id() {
        let store = NodeStore::from_nodes([
            Node::new("z", Some("home".into()), 1.0),
            Node::new("m", Some("home".into()), 1.0),
        ]);
        let index = ChildIndex::build(&store);
        assert_eq!(ids(index.children("home")), vec!["m", "z"]);
    }

    #[test]
    fn reset_to_root_clears_everything_else() {
        let mut index = ChildIndex::build(&store());
        index.reset_to_root(&NodeId::from("home"));
        assert_eq!(index.len(), 1);
        assert!(index.children("home").is_empty());
    }
}
