use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::clock::skew::DEFAULT_SKEW_THRESHOLD_MS;

/// Project-local directory holding config and the persisted tree.
pub const PROJECT_DIR: &str = ".locus";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub tree: TreeConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// How a fresh tree is seeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    #[serde(default = "default_root_id")]
    pub root_id: String,
    #[serde(default = "default_root_text")]
    pub root_text: String,
    #[serde(default = "default_true")]
    pub seed_sample: bool,
    #[serde(default = "default_sample_id")]
    pub sample_id: String,
    #[serde(default)]
    pub sample_text: String,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            root_id: default_root_id(),
            root_text: default_root_text(),
            seed_sample: default_true(),
            sample_id: default_sample_id(),
            sample_text: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Incoming timestamps further ahead of local time than this are logged.
    #[serde(default = "default_skew_threshold_ms")]
    pub skew_threshold_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            skew_threshold_ms: default_skew_threshold_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
    /// Overrides the default `.locus/tree.json` state file.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
    pub state_path: PathBuf,
}

pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(PROJECT_DIR).join("config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("locus/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Default location of the persisted tree for a project.
#[must_use]
pub fn default_state_path(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_DIR).join("tree.json")
}

pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.clone(), env_format);
    let state_path = user
        .state_path
        .clone()
        .unwrap_or_else(|| default_state_path(project_root));

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
        state_path,
    })
}

fn resolve_output(cli_json: bool, user_output: Option<String>, env_format: Option<String>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

const fn default_true() -> bool {
    true
}

fn default_root_id() -> String {
    "home".to_string()
}

fn default_root_text() -> String {
    "Home".to_string()
}

fn default_sample_id() -> String {
    "init".to_string()
}

const fn default_skew_threshold_ms() -> u64 {
    DEFAULT_SKEW_THRESHOLD_MS
}
