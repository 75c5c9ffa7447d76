//! Field-level validation shared by projects and tasks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum title length in characters
pub const MAX_TITLE_LEN: usize = 200;

/// Maximum description length in characters
pub const MAX_DESCRIPTION_LEN: usize = 10_000;

/// Validation errors for project and task fields
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("title cannot be empty")]
    EmptyTitle,

    #[error("title exceeds {MAX_TITLE_LEN} characters")]
    TitleTooLong,

    #[error("description exceeds {MAX_DESCRIPTION_LEN} characters")]
    DescriptionTooLong,

    #[error("{0} contains control characters")]
    DisallowedContent(&'static str),

    #[error("complexity must be between 1 and 10, got {0}")]
    ComplexityOutOfRange(u8),

    #[error("unknown priority '{0}', expected low, medium or high")]
    UnknownPriority(String),

    #[error("unknown state '{0}'")]
    UnknownState(String),

    #[error("task {task} belongs to project {actual}, not {expected}")]
    ProjectMismatch {
        task: String,
        expected: String,
        actual: String,
    },

    #[error("parent task {0} is pending deletion")]
    ParentPendingDeletion(String),

    #[error("project {0} is pending deletion")]
    ProjectPendingDeletion(String),
}

/// Checks a title: required, at most [`MAX_TITLE_LEN`] chars, no control characters
pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError::TitleTooLong);
    }
    if title.chars().any(|c| c.is_control()) {
        return Err(ValidationError::DisallowedContent("title"));
    }
    Ok(())
}

/// Checks a description: optional, bounded, no control characters besides line breaks and tabs
pub fn validate_description(description: &str) -> Result<(), ValidationError> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ValidationError::DescriptionTooLong);
    }
    if description
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
    {
        return Err(ValidationError::DisallowedContent("description"));
    }
    Ok(())
}

/// When and by whom a record was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub at: DateTime<Utc>,
    pub by: String,
}

impl AuditStamp {
    /// Stamps the current time with the given actor
    pub fn now(actor: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            by: actor.into(),
        }
    }
}
