//! tasktree - hierarchical task graphs with dependencies
//!
//! Projects hold trees of tasks. Tasks can depend on other tasks in the same
//! project, state changes pass through a rule-driven validator, and deletion
//! takes two confirmations. [`TaskManager`] is the entry point; it works over
//! any [`Repository`], in memory or SQLite-backed.

pub mod cli;
pub mod domain;
pub mod engine;
pub mod storage;

pub use domain::{Priority, Project, ProjectId, Task, TaskId, TaskState};
pub use engine::{EngineError, ErrorKind, NewTask, TaskManager};
pub use storage::{InMemoryRepository, Repository, SqliteRepository};
