//! Child-index consistency checks.
//!
//! For every parent `p` with an index entry, `children(p)` must hold exactly
//! the ids whose record has `parent_id == p`, in sibling order. Conversely,
//! every record with a parent must be listed under that parent's entry.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::index::ChildIndex;
use crate::model::node::NodeId;
use crate::tree::Tree;

/// A single broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexViolation {
    /// The entry for `parent` lists an id that has no record.
    MissingRecord { parent: NodeId, child: NodeId },
    /// The entry for `parent` lists an id whose record points elsewhere.
    WrongParent {
        parent: NodeId,
        child: NodeId,
        actual: Option<NodeId>,
    },
    /// A record with `parent_id == parent` is absent from the entry.
    Unlisted { parent: NodeId, child: NodeId },
    /// The entry lists the same id twice.
    Duplicate { parent: NodeId, child: NodeId },
    /// The entry is not sorted by sibling order.
    OutOfOrder { parent: NodeId },
}

impl fmt::Display for IndexViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRecord { parent, child } => {
                write!(f, "'{parent}' lists '{child}', which has no record")
            }
            Self::WrongParent {
                parent,
                child,
                actual,
            } => match actual {
                Some(actual) => write!(f, "'{parent}' lists '{child}', whose parent is '{actual}'"),
                None => write!(f, "'{parent}' lists '{child}', which has no parent"),
            },
            Self::Unlisted { parent, child } => {
                write!(f, "'{child}' has parent '{parent}' but is not listed there")
            }
            Self::Duplicate { parent, child } => write!(f, "'{parent}' lists '{child}' twice"),
            Self::OutOfOrder { parent } => write!(f, "children of '{parent}' are not sorted by pos"),
        }
    }
}

/// Collect every index violation in `tree`. Empty means consistent.
#[must_use]
pub fn check_index(tree: &Tree) -> Vec<IndexViolation> {
    let store = tree.store();
    let index: &ChildIndex = tree.index();
    let mut violations = Vec::new();

    for (parent, children) in index.iter() {
        let mut seen: BTreeSet<&NodeId> = BTreeSet::new();
        for child in children {
            if !seen.insert(child) {
                violations.push(IndexViolation::Duplicate {
                    parent: parent.clone(),
                    child: child.clone(),
                });
                continue;
            }
            match store.get(child.as_str()) {
                None => violations.push(IndexViolation::MissingRecord {
                    parent: parent.clone(),
                    child: child.clone(),
                }),
                Some(node) if node.parent_id.as_ref() != Some(parent) => {
                    violations.push(IndexViolation::WrongParent {
                        parent: parent.clone(),
                        child: child.clone(),
                        actual: node.parent_id.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        let sorted = children.windows(2).all(|pair| {
            match (store.get(pair[0].as_str()), store.get(pair[1].as_str())) {
                (Some(a), Some(b)) => a.sibling_order(b).is_le(),
                _ => true,
            }
        });
        if !sorted {
            violations.push(IndexViolation::OutOfOrder {
                parent: parent.clone(),
            });
        }
    }

    for node in store.iter() {
        if let Some(parent) = &node.parent_id
            && !index.children(parent.as_str()).contains(&node.id)
        {
            violations.push(IndexViolation::Unlisted {
                parent: parent.clone(),
                child: node.id.clone(),
            });
        }
    }

    violations
}
