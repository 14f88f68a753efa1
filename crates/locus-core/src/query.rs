//! Read-only hierarchy queries over a [`Tree`].
//!
//! - Which rows does the outline render (collapsed nodes hide their subtree)?
//! - What is a node's checklist progress (checked/total children)?
//! - What are a node's ancestors and its full subtree?
//! - Which nodes are pinned to the dashboard, and in what order?
//! - Would moving a node under a new parent create a cycle?
//!
//! Traversals keep a visited set, so a parent cycle that slipped in from a
//! remote snapshot ends the walk instead of looping forever.

use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::fmt;

use crate::model::node::{Node, NodeId};
use crate::tree::Tree;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One rendered outline line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlineRow<'a> {
    /// Nesting depth below the starting node (direct children are 0).
    pub depth: usize,
    pub node: &'a Node,
    /// True when the node is collapsed and has children hidden beneath it.
    pub has_hidden_children: bool,
}

/// Checked vs. total counts for a node's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChecklistProgress {
    pub checked: u32,
    pub total: u32,
}

impl ChecklistProgress {
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            checked: 0,
            total: 0,
        }
    }

    /// Percentage checked, in `0.0..=100.0`. An empty list counts as complete.
    #[must_use]
    pub fn percent_complete(&self) -> f32 {
        if self.total == 0 {
            return 100.0;
        }
        (self.checked as f32 / self.total as f32) * 100.0
    }

    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.total == 0 || self.checked == self.total
    }

    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.checked)
    }
}

impl fmt::Display for ChecklistProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({:.0}%)",
            self.checked,
            self.total,
            self.percent_complete()
        )
    }
}

/// Reasons a move is refused by [`validate_move`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("node not found: '{0}'")]
    NodeNotFound(NodeId),
    #[error("target parent not found: '{0}'")]
    ParentNotFound(NodeId),
    #[error("the root node '{0}' cannot be moved")]
    MovingRoot(NodeId),
    #[error("moving '{node}' under '{proposed_parent}' would create a cycle")]
    CycleDetected {
        node: NodeId,
        proposed_parent: NodeId,
    },
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Depth-first outline rows below `from`, in sibling order.
///
/// Children of collapsed nodes are skipped.
#[must_use]
pub fn visible_rows<'a>(tree: &'a Tree, from: &str) -> Vec<OutlineRow<'a>> {
    let mut rows = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(from);

    let mut stack: Vec<(usize, &NodeId)> = tree.children(from).iter().rev().map(|c| (0, c)).collect();
    while let Some((depth, id)) = stack.pop() {
        if !visited.insert(id.as_str()) {
            continue;
        }
        let Some(node) = tree.node(id.as_str()) else {
            continue;
        };
        let children = tree.children(id.as_str());
        rows.push(OutlineRow {
            depth,
            node,
            has_hidden_children: node.collapsed && !children.is_empty(),
        });
        if !node.collapsed {
            stack.extend(children.iter().rev().map(|c| (depth + 1, c)));
        }
    }
    rows
}

/// Every descendant of `id` in breadth-first order, excluding `id` itself.
#[must_use]
pub fn subtree(tree: &Tree, id: &str) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(id);

    let mut queue: VecDeque<&NodeId> = tree.children(id).iter().collect();
    while let Some(child) = queue.pop_front() {
        if !visited.insert(child.as_str()) {
            continue;
        }
        out.push(child.clone());
        queue.extend(tree.children(child.as_str()));
    }
    out
}

/// Ancestors of `id`, nearest first, stopping at the root or a missing parent.
#[must_use]
pub fn ancestors(tree: &Tree, id: &str) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(id);

    let mut current = tree.node(id).and_then(|n| n.parent_id.as_ref());
    while let Some(parent_id) = current {
        if !visited.insert(parent_id.as_str()) {
            break;
        }
        out.push(parent_id.clone());
        current = tree.node(parent_id.as_str()).and_then(|n| n.parent_id.as_ref());
    }
    out
}

/// Non-root nodes whose parent is absent from the store.
#[must_use]
pub fn orphans(tree: &Tree) -> Vec<&Node> {
    tree.store()
        .iter()
        .filter(|n| n.id != *tree.root_id())
        .filter(|n| match &n.parent_id {
            Some(parent_id) => !tree.store().contains(parent_id.as_str()),
            None => true,
        })
        .collect()
}

/// Checklist progress over the direct children of `id`.
#[must_use]
pub fn direct_progress(tree: &Tree, id: &str) -> ChecklistProgress {
    tally(tree.children(id).iter().filter_map(|c| tree.node(c.as_str())))
}

/// Checklist progress over every leaf in the subtree of `id`.
///
/// Intermediate nodes with children roll up through their leaves and do not
/// count themselves.
#[must_use]
pub fn nested_progress(tree: &Tree, id: &str) -> ChecklistProgress {
    tally(
        subtree(tree, id)
            .iter()
            .filter(|d| tree.children(d.as_str()).is_empty())
            .filter_map(|d| tree.node(d.as_str())),
    )
}

fn tally<'a>(nodes: impl Iterator<Item = &'a Node>) -> ChecklistProgress {
    let mut progress = ChecklistProgress::zero();
    for node in nodes {
        progress.total += 1;
        if node.checked {
            progress.checked += 1;
        }
    }
    progress
}

/// Nodes pinned to the dashboard, ordered by `pinned_pos` then id.
#[must_use]
pub fn pinned(tree: &Tree) -> Vec<&Node> {
    let mut nodes: Vec<&Node> = tree
        .store()
        .iter()
        .filter(|n| n.pinned_pos.is_some())
        .collect();
    nodes.sort_by(|a, b| {
        let pa = a.pinned_pos.unwrap_or(f64::INFINITY);
        let pb = b.pinned_pos.unwrap_or(f64::INFINITY);
        pa.total_cmp(&pb).then_with(|| a.id.cmp(&b.id))
    });
    nodes
}

/// Check that `id` may move under `new_parent`.
///
/// # Errors
///
/// Returns a [`MoveError`] if either node is missing, `id` is the root, or
/// `new_parent` is `id` itself or one of its descendants.
pub fn validate_move(tree: &Tree, id: &str, new_parent: &str) -> Result<(), MoveError> {
    if !tree.store().contains(id) {
        return Err(MoveError::NodeNotFound(NodeId::from(id)));
    }
    if id == tree.root_id().as_str() {
        return Err(MoveError::MovingRoot(NodeId::from(id)));
    }
    if !tree.store().contains(new_parent) {
        return Err(MoveError::ParentNotFound(NodeId::from(new_parent)));
    }
    if id == new_parent || subtree(tree, id).iter().any(|d| d.as_str() == new_parent) {
        return Err(MoveError::CycleDetected {
            node: NodeId::from(id),
            proposed_parent: NodeId::from(new_parent),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::FetchStatus;

    fn node(id: &str, parent: &str, pos: f64) -> Node {
        Node::new(id, Some(parent.into()), pos)
    }

    /// home
    /// ├── a (collapsed)
    /// │   ├── a1 ✓
    /// │   └── a2
    /// └── b ✓
    ///     └── b1 ✓
    fn sample() -> Tree {
        let mut a = node("a", "home", 1.0);
        a.collapsed = true;
        let mut a1 = node("a1", "a", 1.0);
        a1.checked = true;
        let mut b = node("b", "home", 2.0);
        b.checked = true;
        b.pinned_pos = Some(2.0);
        let mut b1 = node("b1", "b", 1.0);
        b1.checked = true;
        b1.pinned_pos = Some(1.0);
        Tree::from_parts(
            NodeId::from("home"),
            [
                Node::new("home", None, 0.0),
                a,
                a1,
                node("a2", "a", 2.0),
                b,
                b1,
            ],
            None,
            FetchStatus::default(),
        )
    }

    fn ids(v: &[NodeId]) -> Vec<&str> {
        v.iter().map(NodeId::as_str).collect()
    }

    #[test]
    fn visible_rows_skip_collapsed_subtrees() {
        let tree = sample();
        let rows = visible_rows(&tree, "home");
        let shown: Vec<_> = rows.iter().map(|r| (r.depth, r.node.id.as_str())).collect();
        assert_eq!(shown, vec![(0, "a"), (0, "b"), (1, "b1")]);
        assert!(rows[0].has_hidden_children);
        assert!(!rows[1].has_hidden_children);
    }

    #[test]
    fn subtree_is_breadth_first() {
        let tree = sample();
        assert_eq!(ids(&subtree(&tree, "home")), vec!["a", "b", "a1", "a2", "b1"]);
        assert!(subtree(&tree, "a2").is_empty());
    }

    #[test]
    fn ancestors_nearest_first() {
        let tree = sample();
        assert_eq!(ids(&ancestors(&tree, "a1")), vec!["a", "home"]);
        assert!(ancestors(&tree, "home").is_empty());
    }

    #[test]
    fn progress_direct_and_nested() {
        let tree = sample();
        assert_eq!(
            direct_progress(&tree, "a"),
            ChecklistProgress {
                checked: 1,
                total: 2
            }
        );
        // Leaves under home: a1 ✓, a2, b1 ✓
        let nested = nested_progress(&tree, "home");
        assert_eq!(nested.checked, 2);
        assert_eq!(nested.total, 3);
        assert_eq!(nested.remaining(), 1);
        assert_eq!(nested.to_string(), "2/3 (67%)");
    }

    #[test]
    fn empty_progress_is_complete() {
        let progress = direct_progress(&sample(), "a2");
        assert!(progress.is_complete());
        assert!((progress.percent_complete() - 100.0).abs() < f32::EPSILON);
    }

    #[test]
    fn pinned_sorted_by_pinned_pos() {
        let tree = sample();
        let pinned: Vec<_> = pinned(&tree).iter().map(|n| n.id.as_str()).collect();
        assert_eq!(pinned, vec!["b1", "b"]);
    }

    #[test]
    fn orphans_lists_dangling_nodes() {
        let tree = Tree::from_parts(
            NodeId::from("home"),
            [Node::new("home", None, 0.0), node("lost", "ghost", 1.0)],
            None,
            FetchStatus::default(),
        );
        let found: Vec<_> = orphans(&tree).iter().map(|n| n.id.as_str()).collect();
        assert_eq!(found, vec!["lost"]);
    }

    #[test]
    fn validate_move_rejects_cycles() {
        let tree = sample();
        assert!(validate_move(&tree, "b1", "a").is_ok());
        assert_eq!(
            validate_move(&tree, "a", "a1"),
            Err(MoveError::CycleDetected {
                node: NodeId::from("a"),
                proposed_parent: NodeId::from("a1"),
            })
        );
        assert!(matches!(
            validate_move(&tree, "a", "a"),
            Err(MoveError::CycleDetected { .. })
        ));
        assert_eq!(
            validate_move(&tree, "home", "a"),
            Err(MoveError::MovingRoot(NodeId::from("home")))
        );
        assert_eq!(
            validate_move(&tree, "zz", "a"),
            Err(MoveError::NodeNotFound(NodeId::from("zz")))
        );
        assert_eq!(
            validate_move(&tree, "a", "zz"),
            Err(MoveError::ParentNotFound(NodeId::from("zz")))
        );
    }

    #[test]
    fn traversal_survives_parent_cycle() {
        let tree = Tree::from_parts(
            NodeId::from("home"),
            [
                Node::new("home", None, 0.0),
                node("x", "y", 1.0),
                node("y", "x", 1.0),
            ],
            None,
            FetchStatus::default(),
        );
        assert_eq!(ids(&subtree(&tree, "x")), vec!["y"]);
        assert_eq!(ids(&ancestors(&tree, "x")), vec!["y"]);
    }
}
