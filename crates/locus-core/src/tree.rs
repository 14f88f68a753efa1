//! The tree aggregate: node store, child index, selection, and fetch status.
//!
//! A [`Tree`] is a plain state value. Outside the crate it is read-only; the
//! [`Reconciler`](crate::reconcile::Reconciler) owns it and is its only writer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::TreeConfig;
use crate::index::ChildIndex;
use crate::model::node::{Node, NodeId};
use crate::store::NodeStore;

/// Loading/error indicators for the most recent fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchStatus {
    pub fetch_in_progress: bool,
    pub fetch_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_error_message: Option<String>,
    /// Server timestamp of the last complete (non-partial) snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_call_time: Option<i64>,
}

/// Node store plus derived child index, rooted at a synthetic node.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    pub(crate) root_id: NodeId,
    pub(crate) store: NodeStore,
    pub(crate) index: ChildIndex,
    pub(crate) selected_list_id: Option<NodeId>,
    pub(crate) fetch: FetchStatus,
}

impl Tree {
    /// A tree holding only a root node.
    pub fn empty(root_id: impl Into<NodeId>, root_text: &str) -> Self {
        let root_id = root_id.into();
        let root = Node::new(root_id.clone(), None, 0.0).with_text(root_text);
        let store = NodeStore::from_nodes([root]);
        let index = ChildIndex::rooted(&root_id);
        Self {
            root_id,
            store,
            index,
            selected_list_id: None,
            fetch: FetchStatus::default(),
        }
    }

    /// The start-of-session tree: the root plus, if configured, one sample child.
    ///
    /// Seed records carry `updated_at = 0` so any timestamped server copy supersedes them.
    #[must_use]
    pub fn seeded(config: &TreeConfig) -> Self {
        let mut tree = Self::empty(config.root_id.as_str(), &config.root_text);
        if config.seed_sample {
            let sample = Node::new(
                config.sample_id.as_str(),
                Some(tree.root_id.clone()),
                1.0,
            )
            .with_text(config.sample_text.as_str());
            tree.store.replace(sample);
            tree.index = ChildIndex::build(&tree.store);
        }
        tree.selected_list_id = Some(tree.root_id.clone());
        tree
    }

    /// Reassemble a tree from stored records. The child index is rebuilt.
    pub fn from_parts(
        root_id: NodeId,
        nodes: impl IntoIterator<Item = Node>,
        selected_list_id: Option<NodeId>,
        fetch: FetchStatus,
    ) -> Self {
        let store = NodeStore::from_nodes(nodes);
        let mut index = ChildIndex::build(&store);
        if index.get(root_id.as_str()).is_none() {
            index.rebuild_for(&root_id, &store);
        }
        Self {
            root_id,
            store,
            index,
            selected_list_id,
            fetch,
        }
    }

    #[must_use]
    pub const fn root_id(&self) -> &NodeId {
        &self.root_id
    }

    #[must_use]
    pub const fn store(&self) -> &NodeStore {
        &self.store
    }

    #[must_use]
    pub const fn index(&self) -> &ChildIndex {
        &self.index
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.store.get(id)
    }

    /// Ordered child ids of `parent_id`.
    #[must_use]
    pub fn children(&self, parent_id: &str) -> &[NodeId] {
        self.index.children(parent_id)
    }

    #[must_use]
    pub const fn selected_list_id(&self) -> Option<&NodeId> {
        self.selected_list_id.as_ref()
    }

    #[must_use]
    pub const fn fetch_status(&self) -> &FetchStatus {
        &self.fetch
    }

    /// Read-only view in the shape the rendering layer consumes.
    #[must_use]
    pub fn view(&self) -> TreeView<'_> {
        TreeView {
            node_db_map: self.store.iter().map(|n| (&n.id, n)).collect(),
            node_ui_map: self
                .index
                .iter()
                .map(|(parent, children)| (parent, UiEntry { children }))
                .collect(),
            selected_list_id: self.selected_list_id.as_ref(),
            fetch: &self.fetch,
        }
    }
}

/// Serialized tree snapshot for rendering consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeView<'a> {
    #[serde(rename = "nodeDBMap")]
    pub node_db_map: BTreeMap<&'a NodeId, &'a Node>,
    #[serde(rename = "nodeUIMap")]
    pub node_ui_map: BTreeMap<&'a NodeId, UiEntry<'a>>,
    pub selected_list_id: Option<&'a NodeId>,
    #[serde(flatten)]
    pub fetch: &'a FetchStatus,
}

/// One `nodeUIMap` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UiEntry<'a> {
    pub children: &'a [NodeId],
}
