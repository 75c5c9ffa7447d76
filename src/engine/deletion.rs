//! Two-phase deletion
//!
//! The first delete call marks the target `pending-deletion`; a second call
//! on the marked target removes it. A cascading task delete removes the whole
//! subtree, but only its root is ever marked. Dry runs stop before any write
//! and return the same report the real call would.

use std::collections::HashSet;

use serde::Serialize;
use tracing::info;

use super::error::{EngineError, EngineResult};
use super::hierarchy::Hierarchy;
use crate::domain::{AuditStamp, ProjectId, ProjectState, TaskId, TaskState};
use crate::storage::{HierarchyLimits, Repository};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Delete the whole subtree under the task
    pub cascade: bool,
    /// Report what would happen without changing anything
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionPhase {
    /// Target moved to `pending-deletion`
    Marked,
    /// Target removed from storage
    Removed,
}

/// Outcome (or preview) of a delete call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletionReport {
    pub target: String,
    pub phase: DeletionPhase,
    pub dry_run: bool,
    /// Tasks outside the deleted subtree that depend on a task in it and
    /// will lose that dependency
    pub dependents: Vec<TaskId>,
    /// Tasks outside the deleted subtree that a task in it depends on
    pub dependencies: Vec<TaskId>,
    /// Tasks below the target that go with it
    pub descendants: Vec<TaskId>,
    /// Everything removed in this call, children before parents
    pub removed: Vec<String>,
}

/// Deletion orchestrator over a repository
pub struct Deletion<'a, R: Repository + ?Sized> {
    repo: &'a R,
    hierarchy: Hierarchy<'a, R>,
}

impl<'a, R: Repository + ?Sized> Deletion<'a, R> {
    pub fn new(repo: &'a R, limits: &'a HierarchyLimits) -> Self {
        Self {
            repo,
            hierarchy: Hierarchy::new(repo, limits),
        }
    }

    /// Marks or removes a task, depending on its current state
    pub fn delete_task(
        &self,
        id: &TaskId,
        options: DeleteOptions,
        stamp: &AuditStamp,
    ) -> EngineResult<DeletionReport> {
        let mut task = self.repo.get_task(id)?;

        let children = self.hierarchy.child_tasks(&task)?;
        if !options.cascade && !children.is_empty() {
            return Err(EngineError::HasChildren {
                task: id.clone(),
                children: children.len(),
            });
        }

        let descendants = if options.cascade {
            self.hierarchy.descendants(&task)?
        } else {
            Vec::new()
        };

        let subtree: HashSet<TaskId> = descendants
            .iter()
            .map(|t| t.id.clone())
            .chain(std::iter::once(id.clone()))
            .collect();

        let mut dependents = self.repo.dependents_of(id)?;
        for descendant in &descendants {
            dependents.extend(self.repo.dependents_of(&descendant.id)?);
        }
        let dependencies = task
            .dependencies
            .iter()
            .chain(descendants.iter().flat_map(|t| &t.dependencies))
            .cloned();

        let mut report = DeletionReport {
            target: id.to_string(),
            phase: DeletionPhase::Marked,
            dry_run: options.dry_run,
            dependents: outside_of(&subtree, dependents),
            dependencies: outside_of(&subtree, dependencies),
            descendants: descendants.iter().map(|t| t.id.clone()).collect(),
            removed: Vec::new(),
        };

        if task.state != TaskState::PendingDeletion {
            if !options.dry_run {
                task.state = TaskState::PendingDeletion;
                task.touch(stamp);
                self.repo.update_task(&task)?;
                info!(task = %id, by = %stamp.by, "marked task for deletion");
            }
            return Ok(report);
        }

        report.phase = DeletionPhase::Removed;
        let doomed: Vec<TaskId> = descendants
            .iter()
            .rev()
            .map(|t| t.id.clone())
            .chain(std::iter::once(id.clone()))
            .collect();
        report.removed = doomed.iter().map(ToString::to_string).collect();

        if options.dry_run {
            return Ok(report);
        }

        self.repo.delete_tasks(&doomed)?;
        info!(task = %id, removed = doomed.len(), by = %stamp.by, "deleted task");
        Ok(report)
    }

    /// Marks or removes a project, depending on its current state
    ///
    /// Removing a project always takes all of its tasks with it.
    pub fn delete_project(
        &self,
        id: &ProjectId,
        options: DeleteOptions,
        stamp: &AuditStamp,
    ) -> EngineResult<DeletionReport> {
        let mut project = self.repo.get_project(id)?;
        let tasks = self.repo.list_tasks(id)?;

        let mut report = DeletionReport {
            target: id.to_string(),
            phase: DeletionPhase::Marked,
            dry_run: options.dry_run,
            dependents: Vec::new(),
            dependencies: Vec::new(),
            descendants: tasks.iter().map(|t| t.id.clone()).collect(),
            removed: Vec::new(),
        };

        if project.state != ProjectState::PendingDeletion {
            if !options.dry_run {
                project.state = ProjectState::PendingDeletion;
                project.touch(stamp);
                self.repo.update_project(&project)?;
                info!(project = %id, by = %stamp.by, "marked project for deletion");
            }
            return Ok(report);
        }

        report.phase = DeletionPhase::Removed;
        report.removed = tasks
            .iter()
            .rev()
            .map(|t| t.id.to_string())
            .chain(std::iter::once(id.to_string()))
            .collect();

        if !options.dry_run {
            self.repo.delete_project(id)?;
            info!(project = %id, tasks = tasks.len(), by = %stamp.by, "deleted project");
        }
        Ok(report)
    }
}

/// IDs not in `subtree`, without repeats, in first-seen order
fn outside_of(subtree: &HashSet<TaskId>, ids: impl IntoIterator<Item = TaskId>) -> Vec<TaskId> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| !subtree.contains(id) && seen.insert(id.clone()))
        .collect()
}
