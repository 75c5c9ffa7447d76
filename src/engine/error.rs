//! Engine error taxonomy

use thiserror::Error;

use crate::domain::{GraphError, ProjectId, TaskId, TaskState, TransitionError, ValidationError};
use crate::storage::StorageError;

/// Failure classes callers can branch on without matching messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidTransition,
    CircularDependency,
    DepthExceeded,
    FanOutExceeded,
    HasChildren,
    Validation,
    NoSelection,
    Storage,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Parent task not found: {0}")]
    ParentNotFound(TaskId),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("Task {task} is in state {state}; use delete to remove it")]
    DeletionOnly { task: TaskId, state: TaskState },

    #[error("Adding dependency {task} -> {depends_on} would create a cycle")]
    CircularDependency { task: TaskId, depends_on: TaskId },

    #[error("Depth {depth} exceeds the maximum of {max}")]
    DepthExceeded { depth: u32, max: u32 },

    #[error("Too many tasks at depth {depth}: {count} would exceed the maximum of {max}")]
    FanOutExceeded { depth: u32, count: usize, max: usize },

    #[error("Task {task} has {children} child task(s); use a cascading delete")]
    HasChildren { task: TaskId, children: usize },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("No project selected. Select one with 'tasktree project select <id>'.")]
    NoSelection,

    #[error("Dependency graph is corrupt: {0}")]
    CorruptGraph(GraphError),

    #[error(transparent)]
    Storage(StorageError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::ProjectNotFound(_)
            | EngineError::TaskNotFound(_)
            | EngineError::ParentNotFound(_) => ErrorKind::NotFound,
            EngineError::InvalidTransition(_) | EngineError::DeletionOnly { .. } => {
                ErrorKind::InvalidTransition
            }
            EngineError::CircularDependency { .. } => ErrorKind::CircularDependency,
            EngineError::DepthExceeded { .. } => ErrorKind::DepthExceeded,
            EngineError::FanOutExceeded { .. } => ErrorKind::FanOutExceeded,
            EngineError::HasChildren { .. } => ErrorKind::HasChildren,
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::NoSelection => ErrorKind::NoSelection,
            EngineError::CorruptGraph(_) | EngineError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ProjectNotFound(id) => EngineError::ProjectNotFound(id),
            StorageError::TaskNotFound(id) => EngineError::TaskNotFound(id),
            other => EngineError::Storage(other),
        }
    }
}

impl From<GraphError> for EngineError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::CycleDetected(task, depends_on) => {
                EngineError::CircularDependency { task, depends_on }
            }
            GraphError::TaskNotFound(id) => EngineError::TaskNotFound(id),
            other => EngineError::CorruptGraph(other),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
