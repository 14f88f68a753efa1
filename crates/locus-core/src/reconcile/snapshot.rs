//! Server snapshot payloads.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::clock::timestamp::{iso_to_millis, millis_to_iso};
use crate::model::node::{Node, NodeId};

/// A node as delivered by the server, with an ISO-8601 `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub id: NodeId,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(default)]
    pub pos: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_pos: Option<f64>,
}

impl SnapshotNode {
    /// The millisecond timestamp used for conflict resolution, or `None`
    /// when `updated_at` is missing or unparseable.
    ///
    /// A node without a usable timestamp loses to any existing local record
    /// and is only accepted for ids not yet known. It is stored at `0`.
    #[must_use]
    pub fn updated_at_millis(&self) -> Option<i64> {
        let raw = self.updated_at.as_deref()?;
        match iso_to_millis(raw) {
            Ok(millis) => Some(millis),
            Err(err) => {
                warn!(id = %self.id, raw, error = %err, "malformed updated_at on snapshot node");
                None
            }
        }
    }

    /// Convert to a store record.
    #[must_use]
    pub fn to_node(&self) -> Node {
        self.to_node_stamped(self.updated_at_millis().unwrap_or(0))
    }

    pub(crate) fn to_node_stamped(&self, updated_at: i64) -> Node {
        Node {
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            text: self.text.clone(),
            checked: self.checked,
            collapsed: self.collapsed,
            pos: self.pos,
            note_id: self.note_id.clone(),
            file_id: self.file_id.clone(),
            updated_at,
            pinned_pos: self.pinned_pos,
        }
    }
}

impl From<&Node> for SnapshotNode {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            parent_id: node.parent_id.clone(),
            text: node.text.clone(),
            checked: node.checked,
            collapsed: node.collapsed,
            pos: node.pos,
            updated_at: Some(millis_to_iso(node.updated_at)),
            note_id: node.note_id.clone(),
            file_id: node.file_id.clone(),
            pinned_pos: node.pinned_pos,
        }
    }
}

/// Fetch-success event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchSuccess {
    pub nodes: Vec<SnapshotNode>,
    /// First fetch of the session; a multi-node payload supersedes local data.
    #[serde(default)]
    pub is_initial_fetch: bool,
    /// Streamed batch; loading/error flags are left alone.
    #[serde(default)]
    pub partial: bool,
    /// Server time of the snapshot, in milliseconds.
    pub st: i64,
}

/// Fetch-failure event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub error: String,
}

/// What a snapshot merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    /// Incoming nodes written to the store.
    pub applied: usize,
    /// Incoming nodes dropped because the local record was newer.
    pub stale: usize,
    /// Whether local data was wiped by an initial fetch.
    pub reset: bool,
}
