//! Storage contract shared by all backends
//!
//! A [`Repository`] durably stores projects, tasks, dependency edges and the
//! selected-project pointer. It owns no business rules: depth limits,
//! cycle checks and state transitions live in the engine.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::domain::{AuditStamp, Project, ProjectId, Task, TaskFilter, TaskId, TaskState};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Project already exists: {0}")]
    DuplicateProject(ProjectId),

    #[error("Task already exists: {0}")]
    DuplicateTask(TaskId),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt record: {0}")]
    Serialization(String),

    #[error("Storage lock poisoned: {0}")]
    LockPoisoned(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Aggregate task counts for a project
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressReport {
    pub project_id: Option<ProjectId>,
    pub total: usize,
    pub by_state: BTreeMap<TaskState, usize>,
    pub by_depth: BTreeMap<u32, usize>,
    /// Completed tasks as a percentage of all non-cancelled tasks
    pub completion_percent: f64,
}

impl ProgressReport {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id: Some(project_id),
            ..Self::default()
        }
    }

    /// Adds `count` tasks in `state` at `depth`
    pub fn record(&mut self, state: TaskState, depth: u32, count: usize) {
        self.total += count;
        *self.by_state.entry(state).or_default() += count;
        *self.by_depth.entry(depth).or_default() += count;

        let completed = self.count(TaskState::Completed);
        let countable = self.total - self.count(TaskState::Cancelled);
        self.completion_percent = if countable == 0 {
            0.0
        } else {
            completed as f64 * 100.0 / countable as f64
        };
    }

    pub fn count(&self, state: TaskState) -> usize {
        self.by_state.get(&state).copied().unwrap_or(0)
    }
}

/// Durable storage for projects and tasks
///
/// Implementations must give read-after-write consistency within a process
/// and be safe to call from several threads. Missing records are reported
/// as [`StorageError::ProjectNotFound`] or [`StorageError::TaskNotFound`].
///
/// Task lists are ordered by creation time, then identifier.
pub trait Repository: Send + Sync {
    fn create_project(&self, project: &Project) -> StorageResult<()>;

    fn get_project(&self, id: &ProjectId) -> StorageResult<Project>;

    fn update_project(&self, project: &Project) -> StorageResult<()>;

    /// Removes the project and all of its tasks, clearing the selection if it
    /// pointed at this project
    fn delete_project(&self, id: &ProjectId) -> StorageResult<()>;

    fn list_projects(&self) -> StorageResult<Vec<Project>>;

    /// Inserts a task together with any dependencies it already carries
    fn create_task(&self, task: &Task) -> StorageResult<()>;

    fn get_task(&self, id: &TaskId) -> StorageResult<Task>;

    /// Persists a task's fields. Dependency edges are left untouched; use
    /// [`Repository::add_dependency`] and [`Repository::remove_dependency`].
    fn update_task(&self, task: &Task) -> StorageResult<()>;

    /// Removes a task and every dependency edge that mentions it
    fn delete_task(&self, id: &TaskId) -> StorageResult<()> {
        self.delete_tasks(std::slice::from_ref(id))
    }

    /// Removes every task in `ids` and their edges as one write. If any ID
    /// is unknown, nothing is removed.
    fn delete_tasks(&self, ids: &[TaskId]) -> StorageResult<()>;

    fn list_tasks(&self, project: &ProjectId) -> StorageResult<Vec<Task>>;

    /// Direct children of `parent`, or the project's root tasks for `None`
    fn list_children(&self, project: &ProjectId, parent: Option<&TaskId>)
        -> StorageResult<Vec<Task>>;

    fn find_tasks(&self, project: &ProjectId, filter: &TaskFilter) -> StorageResult<Vec<Task>>;

    /// Records that `task` depends on `depends_on`, returning false if the
    /// edge already existed. A new edge touches the dependent task's audit fields.
    fn add_dependency(
        &self,
        task: &TaskId,
        depends_on: &TaskId,
        stamp: &AuditStamp,
    ) -> StorageResult<bool>;

    /// Removes an edge, returning false if it was absent
    fn remove_dependency(
        &self,
        task: &TaskId,
        depends_on: &TaskId,
        stamp: &AuditStamp,
    ) -> StorageResult<bool>;

    /// Tasks that `task` depends on, in insertion order
    fn dependencies_of(&self, task: &TaskId) -> StorageResult<Vec<TaskId>>;

    /// Tasks that depend on `task`
    fn dependents_of(&self, task: &TaskId) -> StorageResult<Vec<TaskId>>;

    fn progress(&self, project: &ProjectId) -> StorageResult<ProgressReport>;

    fn selected_project(&self) -> StorageResult<Option<ProjectId>>;

    fn set_selected_project(&self, id: &ProjectId) -> StorageResult<()>;

    fn clear_selected_project(&self) -> StorageResult<()>;
}
