//! Outline node records.
//!
//! A [`Node`] is one entry in the outline tree: a task, a note reference, or
//! a file reference. Nodes are keyed by a stable [`NodeId`] and ordered among
//! their siblings by the fractional `pos` key.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// Stable identifier of an outline node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap a raw identifier.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for NodeId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// One outline item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique stable identifier.
    pub id: NodeId,
    /// Containing node, or `None` for the root.
    pub parent_id: Option<NodeId>,
    /// Display label.
    #[serde(default)]
    pub text: String,
    /// Completion flag.
    #[serde(default)]
    pub checked: bool,
    /// UI-only expand/collapse flag.
    #[serde(default)]
    pub collapsed: bool,
    /// Ordering key among siblings.
    pub pos: f64,
    /// Associated rich note, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<String>,
    /// Associated file, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    /// Logical timestamp in milliseconds since the Unix epoch.
    pub updated_at: i64,
    /// Ordering key on the pinned dashboard, when pinned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_pos: Option<f64>,
}

impl Node {
    /// A blank node with the given placement and a zero timestamp.
    pub fn new(id: impl Into<NodeId>, parent_id: Option<NodeId>, pos: f64) -> Self {
        Self {
            id: id.into(),
            parent_id,
            text: String::new(),
            checked: false,
            collapsed: false,
            pos,
            note_id: None,
            file_id: None,
            updated_at: 0,
            pinned_pos: None,
        }
    }

    /// Builder-style text setter.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Builder-style timestamp setter.
    #[must_use]
    pub const fn with_updated_at(mut self, updated_at: i64) -> Self {
        self.updated_at = updated_at;
        self
    }

    /// Whether this node is the root of a tree (has no parent).
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Sibling order: ascending `pos`, ties broken by ascending id.
    ///
    /// `total_cmp` keeps NaN positions sortable; they sort after every
    /// finite position.
    #[must_use]
    pub fn sibling_order(&self, other: &Self) -> Ordering {
        self.pos
            .total_cmp(&other.pos)
            .then_with(|| self.id.cmp(&other.id))
    }
}
