//! Task domain model
//!
//! Tasks are the units of work within a project. They form a tree via
//! `parent_id` and a DAG via `dependencies`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::id::{ProjectId, TaskId};
use super::validation::{validate_description, validate_title, AuditStamp, ValidationError};

/// Lifecycle state of a task
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    #[default]
    Pending,
    InProgress,
    Completed,
    Blocked,
    Cancelled,
    PendingDeletion,
}

impl TaskState {
    /// All states, in lifecycle order
    pub const ALL: [TaskState; 6] = [
        TaskState::Pending,
        TaskState::InProgress,
        TaskState::Completed,
        TaskState::Blocked,
        TaskState::Cancelled,
        TaskState::PendingDeletion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::InProgress => "in-progress",
            TaskState::Completed => "completed",
            TaskState::Blocked => "blocked",
            TaskState::Cancelled => "cancelled",
            TaskState::PendingDeletion => "pending-deletion",
        }
    }

    /// Returns true if this status represents completion
    pub fn is_complete(&self) -> bool {
        matches!(self, TaskState::Completed)
    }

    /// Returns true for states that still represent outstanding work
    /// (pending or in-progress)
    pub fn is_active(&self) -> bool {
        matches!(self, TaskState::Pending | TaskState::InProgress)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        TaskState::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownState(s.to_string()))
    }
}

/// Task priority
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(ValidationError::UnknownPriority(s.to_string())),
        }
    }
}

/// Task complexity on a 1-10 scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Complexity(u8);

impl Complexity {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: u8) -> Result<Self, ValidationError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ValidationError::ComplexityOutOfRange(value))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for Complexity {
    fn default() -> Self {
        Self(5)
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for Complexity {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Complexity> for u8 {
    fn from(c: Complexity) -> Self {
        c.0
    }
}

/// A task within a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Owning project
    pub project_id: ProjectId,

    /// Parent task, `None` for roots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,

    /// Human-readable title
    pub title: String,

    #[serde(default)]
    pub description: String,

    pub complexity: Complexity,

    pub priority: Priority,

    /// Current lifecycle state
    pub state: TaskState,

    /// Number of ancestor links to the project root (0 for roots)
    pub depth: u32,

    /// Tasks this task depends on, in insertion order, without duplicates
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<TaskId>,

    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl Task {
    /// Creates a new root task in `pending` state
    pub fn new(project_id: ProjectId, title: impl Into<String>, stamp: &AuditStamp) -> Self {
        let title = title.into();
        Self {
            id: TaskId::new(&title, stamp.at),
            project_id,
            parent_id: None,
            title,
            description: String::new(),
            complexity: Complexity::default(),
            priority: Priority::default(),
            state: TaskState::Pending,
            depth: 0,
            dependencies: Vec::new(),
            created_at: stamp.at,
            created_by: stamp.by.clone(),
            updated_at: stamp.at,
            updated_by: stamp.by.clone(),
        }
    }

    /// Places this task under `parent`, deriving its depth
    pub fn with_parent(mut self, parent: &Task) -> Self {
        self.parent_id = Some(parent.id.clone());
        self.depth = parent.depth + 1;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Validate the task's fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)?;
        validate_description(&self.description)
    }

    /// Returns true if this task has no parent
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Records a modification
    pub fn touch(&mut self, stamp: &AuditStamp) {
        self.updated_at = stamp.at;
        self.updated_by = stamp.by.clone();
    }

    /// Adds a dependency, returning false if it was already present
    pub fn add_dependency(&mut self, task_id: TaskId) -> bool {
        if self.dependencies.contains(&task_id) {
            return false;
        }
        self.dependencies.push(task_id);
        true
    }

    /// Removes a dependency, returning false if it was not present
    pub fn remove_dependency(&mut self, task_id: &TaskId) -> bool {
        let len_before = self.dependencies.len();
        self.dependencies.retain(|d| d != task_id);
        self.dependencies.len() != len_before
    }

    pub fn depends_on(&self, task_id: &TaskId) -> bool {
        self.dependencies.contains(task_id)
    }

    /// Returns true if every dependency is completed
    ///
    /// A task without dependencies is always ready. A dependency that is
    /// missing from `task_states` counts as not completed.
    pub fn is_ready(&self, task_states: &HashMap<TaskId, TaskState>) -> bool {
        self.dependencies.iter().all(|dep_id| {
            task_states
                .get(dep_id)
                .map(|s| s.is_complete())
                .unwrap_or(false)
        })
    }

    /// Returns true if this task is outstanding work waiting on at least one dependency
    pub fn is_blocked(&self, task_states: &HashMap<TaskId, TaskState>) -> bool {
        self.state.is_active() && !self.dependencies.is_empty() && !self.is_ready(task_states)
    }
}

/// Structured predicate over tasks for repository queries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    /// Accepted states; empty means any state
    pub states: Vec<TaskState>,
    pub min_depth: Option<u32>,
    pub max_depth: Option<u32>,
    pub min_complexity: Option<u8>,
    pub max_complexity: Option<u8>,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(mut self, state: TaskState) -> Self {
        if !self.states.contains(&state) {
            self.states.push(state);
        }
        self
    }

    pub fn with_depth(mut self, min: Option<u32>, max: Option<u32>) -> Self {
        self.min_depth = min;
        self.max_depth = max;
        self
    }

    pub fn with_complexity(mut self, min: Option<u8>, max: Option<u8>) -> Self {
        self.min_complexity = min;
        self.max_complexity = max;
        self
    }

    /// Returns true if `task` satisfies every set criterion
    pub fn matches(&self, task: &Task) -> bool {
        let complexity = task.complexity.value();
        (self.states.is_empty() || self.states.contains(&task.state))
            && self.min_depth.map_or(true, |min| task.depth >= min)
            && self.max_depth.map_or(true, |max| task.depth <= max)
            && self.min_complexity.map_or(true, |min| complexity >= min)
            && self.max_complexity.map_or(true, |max| complexity <= max)
    }
}
