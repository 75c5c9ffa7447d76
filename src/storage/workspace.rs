//! Workspace management
//!
//! A workspace is a directory containing `.tasktree/`. Opening one loads its
//! configuration and takes an exclusive lock on `.tasktree/lock` that is held
//! until the [`Workspace`] is dropped.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use thiserror::Error;
use tracing::debug;

use super::config::{Config, WORKSPACE_DIR};
use super::sqlite::SqliteRepository;

const DATABASE_FILE: &str = "tasktree.db";
const LOCK_FILE: &str = "lock";

const DEFAULT_CONFIG: &str = r#"# tasktree workspace configuration

[limits]
# Deepest allowed task depth (root tasks are depth 0)
max_depth = 5

# Maximum number of sibling tasks at any depth
max_tasks_per_depth = 100

# Per-depth overrides
# [[limits.depth]]
# depth = 0
# max_tasks = 20

[transitions]
# "strict" or "lenient"
mode = "strict"

# Tasks at or above this complexity must be broken down before starting
breakdown_threshold = 8

# Allow pending -> completed without passing through in-progress
allow_direct_completion = false
"#;

const DEFAULT_GITIGNORE: &str = r#"# Local database and lock
tasktree.db
tasktree.db-wal
tasktree.db-shm
lock
"#;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Not in a tasktree workspace. Run 'tasktree init' first.")]
    NotInWorkspace,
}

/// An open tasktree workspace
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    config: Config,
    _lock: File,
}

impl Workspace {
    /// Opens an existing workspace at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let dir = root.join(WORKSPACE_DIR);

        if !dir.is_dir() {
            return Err(WorkspaceError::NotInWorkspace.into());
        }

        let lock_path = dir.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;
        lock.lock_exclusive()
            .context("Failed to acquire workspace lock")?;

        let config = Config::for_workspace(&root)?;
        debug!(root = %root.display(), "opened workspace");

        Ok(Self {
            root,
            config,
            _lock: lock,
        })
    }

    /// Opens the workspace at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_workspace_root().ok_or(WorkspaceError::NotInWorkspace)?;

        Self::open(root)
    }

    /// Initializes a new workspace at the given path
    ///
    /// Existing files are left alone, so running this twice is harmless.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let dir = root.join(WORKSPACE_DIR);

        fs::create_dir_all(&dir).with_context(|| {
            format!("Failed to create {WORKSPACE_DIR} directory: {}", dir.display())
        })?;

        let config_path = dir.join("config.toml");
        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let gitignore_path = dir.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(&gitignore_path, DEFAULT_GITIGNORE).with_context(|| {
                format!("Failed to write .gitignore: {}", gitignore_path.display())
            })?;
        }

        let workspace = Self::open(root)?;
        workspace.open_repository()?;
        Ok(workspace)
    }

    /// Returns the workspace root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the `.tasktree` directory path
    pub fn dir(&self) -> PathBuf {
        self.root.join(WORKSPACE_DIR)
    }

    /// Returns the database file path
    pub fn database_path(&self) -> PathBuf {
        self.dir().join(DATABASE_FILE)
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Opens the workspace database, creating it if needed
    pub fn open_repository(&self) -> Result<SqliteRepository> {
        let path = self.database_path();
        SqliteRepository::open(&path)
            .with_context(|| format!("Failed to open database: {}", path.display()))
    }
}
