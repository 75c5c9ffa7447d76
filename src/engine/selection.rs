//! The currently selected project
//!
//! The pointer lives in the repository, so it survives restarts with a
//! persistent backend and stays isolated per repository in tests.

use tracing::debug;

use super::error::{EngineError, EngineResult};
use crate::domain::ProjectId;
use crate::storage::Repository;

pub struct Selection<'a, R: Repository + ?Sized> {
    repo: &'a R,
}

impl<'a, R: Repository + ?Sized> Selection<'a, R> {
    pub fn new(repo: &'a R) -> Self {
        Self { repo }
    }

    /// Selects a project after checking that it exists
    pub fn select(&self, project: &ProjectId) -> EngineResult<()> {
        self.repo.get_project(project)?;
        self.repo.set_selected_project(project)?;
        debug!(%project, "selected project");
        Ok(())
    }

    pub fn clear(&self) -> EngineResult<()> {
        Ok(self.repo.clear_selected_project()?)
    }

    /// Returns the selected project, if any
    pub fn current(&self) -> EngineResult<Option<ProjectId>> {
        Ok(self.repo.selected_project()?)
    }

    /// Returns the selected project or [`EngineError::NoSelection`]
    pub fn resolve(&self) -> EngineResult<ProjectId> {
        self.current()?.ok_or(EngineError::NoSelection)
    }
}
