//! Configuration handling for tasktree
//!
//! Configuration is stored in `.tasktree/config.toml` (workspace) and
//! `~/.config/tasktree/config.toml` (global). Both files are optional.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::TransitionPolicy;

/// Name of the workspace directory
pub const WORKSPACE_DIR: &str = ".tasktree";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Sibling limit for one depth level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLimit {
    pub depth: u32,
    pub max_tasks: usize,
}

/// Structural limits on the task tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyLimits {
    /// Deepest allowed depth (roots are depth 0)
    pub max_depth: u32,

    /// Sibling limit for depths without an override
    pub max_tasks_per_depth: usize,

    /// Per-depth sibling limits
    #[serde(rename = "depth", skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<DepthLimit>,
}

impl Default for HierarchyLimits {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_tasks_per_depth: 100,
            overrides: Vec::new(),
        }
    }
}

impl HierarchyLimits {
    /// Returns the sibling limit at `depth`
    pub fn max_tasks_at(&self, depth: u32) -> usize {
        self.overrides
            .iter()
            .find(|o| o.depth == depth)
            .map(|o| o.max_tasks)
            .unwrap_or(self.max_tasks_per_depth)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tasks_per_depth == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_tasks_per_depth must be at least 1".into(),
            ));
        }
        if let Some(o) = self.overrides.iter().find(|o| o.max_tasks == 0) {
            return Err(ConfigError::Invalid(format!(
                "limits.depth override for depth {} must allow at least 1 task",
                o.depth
            )));
        }
        Ok(())
    }
}

/// Workspace-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: HierarchyLimits,
    pub transitions: TransitionPolicy,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate()?;
        let threshold = self.transitions.breakdown_threshold;
        if !(1..=10).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "transitions.breakdown_threshold must be between 1 and 10, got {threshold}"
            )));
        }
        Ok(())
    }
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,
}

/// Combined configuration (global + workspace)
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub engine: EngineConfig,
    pub global: GlobalConfig,
    pub workspace_root: Option<PathBuf>,
}

impl Config {
    /// Loads configuration for a specific workspace
    pub fn for_workspace(workspace_root: &Path) -> Result<Self> {
        let global = Self::load_global()?;
        let engine = Self::load_engine_config(workspace_root)?;

        Ok(Self {
            engine,
            global,
            workspace_root: Some(workspace_root.to_path_buf()),
        })
    }

    /// Loads only the global configuration, for commands run outside a workspace
    pub fn global_only() -> Result<Self> {
        Ok(Self {
            global: Self::load_global()?,
            ..Self::default()
        })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "tasktree", "tasktree").map(|dirs| dirs.config_dir().to_path_buf())
    }

    fn load_global() -> Result<GlobalConfig> {
        match Self::global_config_dir() {
            Some(dir) => read_toml_or_default(&dir.join("config.toml"), "global"),
            None => Ok(GlobalConfig::default()),
        }
    }

    /// Loads and validates `.tasktree/config.toml` under `workspace_root`
    pub fn load_engine_config(workspace_root: &Path) -> Result<EngineConfig> {
        let config_path = workspace_root.join(WORKSPACE_DIR).join("config.toml");
        let config: EngineConfig = read_toml_or_default(&config_path, "workspace")?;

        config
            .validate()
            .with_context(|| format!("Invalid workspace config: {}", config_path.display()))?;
        Ok(config)
    }

    /// Finds the nearest directory at or above `start` that holds `.tasktree/`
    pub fn find_workspace_root_from(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .find(|dir| dir.join(WORKSPACE_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Finds the workspace root from the current directory
    pub fn find_workspace_root() -> Option<PathBuf> {
        let cwd = std::env::current_dir().ok()?;
        Self::find_workspace_root_from(&cwd)
    }
}

/// A missing file yields the default value
fn read_toml_or_default<T: DeserializeOwned + Default>(path: &Path, label: &str) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {label} config: {}", path.display()))?;
    toml::from_str(&content)
        .map_err(|e| ConfigError::Parse(e.to_string()))
        .with_context(|| format!("Failed to parse {label} config: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ValidationMode;
    use tempfile::TempDir;

    #[test]
    fn default_config() {
        let config = Config::default();

        assert_eq!(config.engine.limits.max_depth, 5);
        assert_eq!(config.engine.limits.max_tasks_per_depth, 100);
        assert_eq!(config.engine.transitions.breakdown_threshold, 8);
        assert_eq!(config.engine.transitions.mode, ValidationMode::Strict);
        assert_eq!(config.global.default_format, OutputFormat::Text);
    }

    #[test]
    fn parse_engine_config() {
        let toml = r#"
[limits]
max_depth = 3
max_tasks_per_depth = 20

[[limits.depth]]
depth = 0
max_tasks = 4

[transitions]
mode = "lenient"
breakdown_threshold = 6
allow_direct_completion = true
"#;

        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.limits.max_depth, 3);
        assert_eq!(config.limits.max_tasks_at(0), 4);
        assert_eq!(config.limits.max_tasks_at(1), 20);
        assert_eq!(config.transitions.mode, ValidationMode::Lenient);
        assert_eq!(config.transitions.breakdown_threshold, 6);
        assert!(config.transitions.allow_direct_completion);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: EngineConfig = toml::from_str("[limits]\nmax_depth = 2\n").unwrap();

        assert_eq!(config.limits.max_depth, 2);
        assert_eq!(config.limits.max_tasks_per_depth, 100);
        assert_eq!(config.transitions.breakdown_threshold, 8);
    }

    #[test]
    fn rejects_invalid_limits() {
        let zero: EngineConfig = toml::from_str("[limits]\nmax_tasks_per_depth = 0\n").unwrap();
        assert!(zero.validate().is_err());

        let threshold: EngineConfig =
            toml::from_str("[transitions]\nbreakdown_threshold = 11\n").unwrap();
        assert!(threshold.validate().is_err());
    }

    #[test]
    fn parse_global_config() {
        let config: GlobalConfig = toml::from_str("default_format = \"json\"\n").unwrap();
        assert_eq!(config.default_format, OutputFormat::Json);
    }

    #[test]
    fn find_workspace_root_walks_up() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(WORKSPACE_DIR)).unwrap();

        let sub_dir = dir.path().join("sub").join("dir");
        fs::create_dir_all(&sub_dir).unwrap();

        let root = Config::find_workspace_root_from(&sub_dir);
        assert_eq!(root.as_deref(), Some(dir.path()));
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_engine_config(dir.path()).unwrap();
        assert_eq!(config.limits, HierarchyLimits::default());
    }

    #[test]
    fn malformed_config_names_the_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(WORKSPACE_DIR)).unwrap();
        fs::write(dir.path().join(WORKSPACE_DIR).join("config.toml"), "[limits\n").unwrap();

        let err = Config::load_engine_config(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse workspace config"));
    }
}
