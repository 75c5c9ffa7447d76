//! Domain models for tasktree
//!
//! Contains the core business logic without any I/O concerns.

mod graph;
mod id;
mod project;
mod task;
mod transition;
mod validation;

pub use graph::{DependencyGraph, GraphError};
pub use id::{IdError, ProjectId, TaskId};
pub use project::{Project, ProjectState};
pub use task::{Complexity, Priority, Task, TaskFilter, TaskState};
pub use transition::{
    standard_rules, RuleSeverity, StateValidator, TransitionError, TransitionPolicy,
    TransitionRequest, TransitionRule, TransitionTable, ValidationMode,
};
pub use validation::{
    validate_description, validate_title, AuditStamp, ValidationError, MAX_DESCRIPTION_LEN,
    MAX_TITLE_LEN,
};
