//! # Storage Layer
//!
//! Persistence for tasktree behind the [`Repository`] contract.
//!
//! ## Backends
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`InMemoryRepository`] | Tests and embedding; state lives behind one `RwLock` |
//! | [`SqliteRepository`] | The CLI; `.tasktree/tasktree.db` |
//!
//! ## Workspace Structure
//!
//! ```text
//! .tasktree/
//! ├── config.toml     # Limits and transition policy
//! ├── tasktree.db     # SQLite database
//! ├── lock            # Exclusive lock held by the running process
//! └── .gitignore      # Ignores database and lock
//! ```

mod config;
mod memory;
mod repository;
mod sqlite;
mod workspace;

pub use config::{
    Config, ConfigError, DepthLimit, EngineConfig, GlobalConfig, HierarchyLimits, OutputFormat,
    WORKSPACE_DIR,
};
pub use memory::InMemoryRepository;
pub use repository::{ProgressReport, Repository, StorageError, StorageResult};
pub use sqlite::SqliteRepository;
pub use workspace::{Workspace, WorkspaceError};
