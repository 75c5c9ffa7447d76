//! Project domain model
//!
//! A project owns a set of tasks by reference. Projects have a two-state
//! lifecycle: `active`, then `pending-deletion` until deletion is confirmed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::id::ProjectId;
use super::validation::{validate_description, validate_title, AuditStamp, ValidationError};

/// Lifecycle state of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectState {
    #[default]
    Active,
    PendingDeletion,
}

impl ProjectState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectState::Active => "active",
            ProjectState::PendingDeletion => "pending-deletion",
        }
    }
}

impl fmt::Display for ProjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "active" => Ok(ProjectState::Active),
            "pending-deletion" => Ok(ProjectState::PendingDeletion),
            _ => Err(ValidationError::UnknownState(s.to_string())),
        }
    }
}

/// A project grouping tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub state: ProjectState,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl Project {
    /// Creates a new active project
    pub fn new(title: impl Into<String>, stamp: &AuditStamp) -> Self {
        let title = title.into();
        Self {
            id: ProjectId::new(&title, stamp.at),
            title,
            description: String::new(),
            state: ProjectState::Active,
            created_at: stamp.at,
            created_by: stamp.by.clone(),
            updated_at: stamp.at,
            updated_by: stamp.by.clone(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)?;
        validate_description(&self.description)
    }

    pub fn is_pending_deletion(&self) -> bool {
        self.state == ProjectState::PendingDeletion
    }

    /// Records a modification
    pub fn touch(&mut self, stamp: &AuditStamp) {
        self.updated_at = stamp.at;
        self.updated_by = stamp.by.clone();
    }
}
