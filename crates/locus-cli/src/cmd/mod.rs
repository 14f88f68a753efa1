//! Subcommand handlers.
//!
//! Each module exposes `run_*(args, output, &workspace)`.

pub mod pinned;
pub mod replay;
pub mod show;
pub mod sim;
pub mod verify;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use locus_core::config::{EffectiveConfig, resolve_config};
use locus_core::error::ErrorCode;
use locus_core::{Tree, persist};

/// Resolved configuration plus the state file every command reads.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub config: EffectiveConfig,
    pub state_path: PathBuf,
}

impl Workspace {
    /// Load project and user config for `project_root`.
    ///
    /// `state_override` replaces the configured state file.
    pub fn open(project_root: &Path, state_override: Option<PathBuf>, json: bool) -> Result<Self> {
        let config = resolve_config(project_root, json).context(ErrorCode::ConfigParseError)?;
        let state_path = state_override.unwrap_or_else(|| config.state_path.clone());
        Ok(Self { config, state_path })
    }

    /// The saved tree, or a freshly seeded one when nothing is saved yet.
    pub fn load_tree(&self) -> Result<Tree> {
        persist::load_or_else(&self.state_path, || self.seeded_tree())
            .context(ErrorCode::StateReadFailed)
    }

    #[must_use]
    pub fn seeded_tree(&self) -> Tree {
        Tree::seeded(&self.config.project.tree)
    }

    pub fn save_tree(&self, tree: &Tree) -> Result<()> {
        persist::save(tree, &self.state_path).context(ErrorCode::StateWriteFailed)
    }
}
