//! Save and load a [`Tree`] as a JSON document.
//!
//! Only node records, the selection, and fetch status are written. The child
//! index is derived and is rebuilt on load.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::model::node::{Node, NodeId};
use crate::tree::{FetchStatus, Tree};

/// Current document format version.
pub const FORMAT_VERSION: u32 = 1;

/// On-disk form of a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeDocument {
    pub version: u32,
    pub root_id: NodeId,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub selected_list_id: Option<NodeId>,
    #[serde(default)]
    pub fetch: FetchStatus,
}

impl TreeDocument {
    #[must_use]
    pub fn from_tree(tree: &Tree) -> Self {
        Self {
            version: FORMAT_VERSION,
            root_id: tree.root_id().clone(),
            nodes: tree.store().iter().cloned().collect(),
            selected_list_id: tree.selected_list_id().cloned(),
            fetch: tree.fetch_status().clone(),
        }
    }

    /// Rebuild the tree, including its child index.
    ///
    /// # Errors
    ///
    /// Fails for an unknown format version or when the root record is missing.
    pub fn into_tree(self) -> Result<Tree> {
        if self.version != FORMAT_VERSION {
            bail!(
                "unsupported tree document version {} (expected {FORMAT_VERSION})",
                self.version
            );
        }
        if !self.nodes.iter().any(|n| n.id == self.root_id) {
            bail!("tree document has no record for root '{}'", self.root_id);
        }
        Ok(Tree::from_parts(
            self.root_id,
            self.nodes,
            self.selected_list_id,
            self.fetch,
        ))
    }
}

/// Write `tree` to `path`, creating parent directories.
///
/// The document is written to a sibling temp file and renamed into place.
pub fn save(tree: &Tree, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let doc = TreeDocument::from_tree(tree);
    let json = serde_json::to_string_pretty(&doc).context("Failed to serialize tree")?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;

    debug!(path = %path.display(), nodes = doc.nodes.len(), "saved tree");
    Ok(())
}

/// Read a tree saved by [`save`].
pub fn load(path: &Path) -> Result<Tree> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let doc: TreeDocument = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    doc.into_tree()
        .with_context(|| format!("Invalid tree document {}", path.display()))
}

/// Load `path` if it exists, otherwise return `fallback()`.
pub fn load_or_else(path: &Path, fallback: impl FnOnce() -> Tree) -> Result<Tree> {
    if path.exists() {
        load(path)
    } else {
        Ok(fallback())
    }
}
