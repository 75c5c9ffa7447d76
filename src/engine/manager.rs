//! The public API of the task graph engine
//!
//! [`TaskManager`] composes the hierarchy, dependency, deletion and
//! selection components over one repository. Task operations are scoped to
//! the selected project; a task from another project is reported as not
//! found. Every check-and-act sequence runs under an exclusive gate so a
//! limit or cycle check cannot be invalidated before its write lands.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::deletion::{DeleteOptions, Deletion, DeletionReport};
use super::dependencies::Dependencies;
use super::error::{EngineError, EngineResult};
use super::hierarchy::{Hierarchy, NewTask};
use super::selection::Selection;
use crate::domain::{
    validate_description, validate_title, AuditStamp, Complexity, Priority, Project, ProjectId,
    StateValidator, Task, TaskFilter, TaskId, TaskState, TransitionRequest,
};
use crate::storage::{EngineConfig, ProgressReport, Repository, StorageError};

/// Field changes for a project; `None` leaves a field alone
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Field changes for a task; `None` leaves a field alone
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub complexity: Option<u8>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.complexity.is_none()
    }
}

/// Result of a state change
#[derive(Debug, Clone, Serialize)]
pub struct TransitionReport {
    pub task: Task,
    pub from: TaskState,
    /// Non-fatal rule findings
    pub warnings: Vec<String>,
}

/// Composition root over a repository
pub struct TaskManager<R: Repository> {
    repo: R,
    config: EngineConfig,
    validator: StateValidator,
    gate: RwLock<()>,
}

impl<R: Repository> TaskManager<R> {
    pub fn new(repo: R, config: EngineConfig) -> Self {
        let validator = StateValidator::new(config.transitions.clone());
        Self {
            repo,
            config,
            validator,
            gate: RwLock::new(()),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn read_gate(&self) -> EngineResult<RwLockReadGuard<'_, ()>> {
        self.gate
            .read()
            .map_err(|err| EngineError::Storage(StorageError::LockPoisoned(err.to_string())))
    }

    fn write_gate(&self) -> EngineResult<RwLockWriteGuard<'_, ()>> {
        self.gate
            .write()
            .map_err(|err| EngineError::Storage(StorageError::LockPoisoned(err.to_string())))
    }

    fn hierarchy(&self) -> Hierarchy<'_, R> {
        Hierarchy::new(&self.repo, &self.config.limits)
    }

    fn dependencies(&self) -> Dependencies<'_, R> {
        Dependencies::new(&self.repo)
    }

    fn selection(&self) -> Selection<'_, R> {
        Selection::new(&self.repo)
    }

    /// Loads a task, requiring it to belong to the selected project
    fn scoped_task(&self, id: &TaskId) -> EngineResult<Task> {
        let project = self.selection().resolve()?;
        let task = self.repo.get_task(id)?;
        if task.project_id != project {
            return Err(EngineError::TaskNotFound(id.clone()));
        }
        Ok(task)
    }

    fn load_all(&self, ids: Vec<TaskId>) -> EngineResult<Vec<Task>> {
        ids.iter()
            .map(|id| self.repo.get_task(id).map_err(EngineError::from))
            .collect()
    }

    // Projects

    pub fn create_project(
        &self,
        title: &str,
        description: &str,
        actor: &str,
    ) -> EngineResult<Project> {
        let project = Project::new(title, &AuditStamp::now(actor)).with_description(description);
        project.validate()?;

        let _gate = self.write_gate()?;
        self.repo.create_project(&project)?;
        info!(project = %project.id, by = actor, "created project");
        Ok(project)
    }

    pub fn list_projects(&self) -> EngineResult<Vec<Project>> {
        let _gate = self.read_gate()?;
        Ok(self.repo.list_projects()?)
    }

    pub fn get_project(&self, id: &ProjectId) -> EngineResult<Project> {
        let _gate = self.read_gate()?;
        Ok(self.repo.get_project(id)?)
    }

    pub fn update_project(
        &self,
        id: &ProjectId,
        update: ProjectUpdate,
        actor: &str,
    ) -> EngineResult<Project> {
        let _gate = self.write_gate()?;
        let mut project = self.repo.get_project(id)?;

        if let Some(title) = update.title {
            validate_title(&title)?;
            project.title = title;
        }
        if let Some(description) = update.description {
            validate_description(&description)?;
            project.description = description;
        }

        project.touch(&AuditStamp::now(actor));
        self.repo.update_project(&project)?;
        info!(project = %id, by = actor, "updated project");
        Ok(project)
    }

    /// Marks the project on the first call and removes it with its tasks on the second
    pub fn delete_project(
        &self,
        id: &ProjectId,
        options: DeleteOptions,
        actor: &str,
    ) -> EngineResult<DeletionReport> {
        let _gate = self.write_gate()?;
        Deletion::new(&self.repo, &self.config.limits).delete_project(
            id,
            options,
            &AuditStamp::now(actor),
        )
    }

    // Selection

    pub fn select_project(&self, id: &ProjectId) -> EngineResult<Project> {
        let _gate = self.write_gate()?;
        self.selection().select(id)?;
        Ok(self.repo.get_project(id)?)
    }

    pub fn clear_selection(&self) -> EngineResult<()> {
        let _gate = self.write_gate()?;
        self.selection().clear()
    }

    /// The selected project, or `None`
    pub fn current_project(&self) -> EngineResult<Option<Project>> {
        let _gate = self.read_gate()?;
        match self.selection().current()? {
            Some(id) => Ok(Some(self.repo.get_project(&id)?)),
            None => Ok(None),
        }
    }

    // Tasks

    /// Creates a task in the selected project
    pub fn create_task(&self, input: NewTask, actor: &str) -> EngineResult<Task> {
        let _gate = self.write_gate()?;
        let project = self.selection().resolve()?;

        let task = self
            .hierarchy()
            .create_task(&project, input, &AuditStamp::now(actor))?;
        info!(task = %task.id, %project, by = actor, "created task");
        Ok(task)
    }

    pub fn get_task(&self, id: &TaskId) -> EngineResult<Task> {
        let _gate = self.read_gate()?;
        self.scoped_task(id)
    }

    /// Tasks of the selected project matching `filter`
    pub fn list_tasks(&self, filter: &TaskFilter) -> EngineResult<Vec<Task>> {
        let _gate = self.read_gate()?;
        let project = self.selection().resolve()?;
        Ok(self.repo.find_tasks(&project, filter)?)
    }

    pub fn update_task(&self, id: &TaskId, update: TaskUpdate, actor: &str) -> EngineResult<Task> {
        let _gate = self.write_gate()?;
        let mut task = self.scoped_task(id)?;

        if let Some(title) = update.title {
            task.title = title;
        }
        if let Some(description) = update.description {
            task.description = description;
        }
        if let Some(priority) = update.priority {
            task.priority = priority;
        }
        if let Some(complexity) = update.complexity {
            task.complexity = Complexity::new(complexity)?;
        }
        task.validate()?;

        task.touch(&AuditStamp::now(actor));
        self.repo.update_task(&task)?;
        info!(task = %id, by = actor, "updated task");
        Ok(task)
    }

    /// Moves a task to `target` through the transition validator
    ///
    /// `pending-deletion` can only be entered through [`TaskManager::delete_task`].
    pub fn set_task_state(
        &self,
        id: &TaskId,
        target: TaskState,
        actor: &str,
    ) -> EngineResult<TransitionReport> {
        let _gate = self.write_gate()?;
        let mut task = self.scoped_task(id)?;
        let from = task.state;

        if target == TaskState::PendingDeletion && from != TaskState::PendingDeletion {
            return Err(EngineError::DeletionOnly {
                task: id.clone(),
                state: target,
            });
        }

        let has_children = !self.hierarchy().child_tasks(&task)?.is_empty();
        let warnings = self.validator.validate(&TransitionRequest {
            task: &task,
            target,
            has_children,
        })?;

        for warning in &warnings {
            warn!(task = %id, %from, to = %target, "{warning}");
        }

        if from != target {
            task.state = target;
            task.touch(&AuditStamp::now(actor));
            self.repo.update_task(&task)?;
            info!(task = %id, %from, to = %target, by = actor, "changed task state");
        }

        Ok(TransitionReport {
            task,
            from,
            warnings,
        })
    }

    /// Marks the task on the first call and removes it (and, with `cascade`,
    /// its subtree) on the second
    pub fn delete_task(
        &self,
        id: &TaskId,
        options: DeleteOptions,
        actor: &str,
    ) -> EngineResult<DeletionReport> {
        let _gate = self.write_gate()?;
        self.scoped_task(id)?;
        Deletion::new(&self.repo, &self.config.limits).delete_task(
            id,
            options,
            &AuditStamp::now(actor),
        )
    }

    // Dependencies

    /// Makes `task` depend on `depends_on`; returns false if it already did
    pub fn add_dependency(
        &self,
        task: &TaskId,
        depends_on: &TaskId,
        actor: &str,
    ) -> EngineResult<bool> {
        let _gate = self.write_gate()?;
        self.scoped_task(task)?;

        let added = self
            .dependencies()
            .add_dependency(task, depends_on, &AuditStamp::now(actor))?;
        if added {
            info!(%task, %depends_on, by = actor, "added dependency");
        }
        Ok(added)
    }

    pub fn remove_dependency(
        &self,
        task: &TaskId,
        depends_on: &TaskId,
        actor: &str,
    ) -> EngineResult<bool> {
        let _gate = self.write_gate()?;
        self.scoped_task(task)?;

        let removed = self
            .dependencies()
            .remove_dependency(task, depends_on, &AuditStamp::now(actor))?;
        if removed {
            info!(%task, %depends_on, by = actor, "removed dependency");
        }
        Ok(removed)
    }

    /// Tasks that `task` depends on
    pub fn dependencies_of(&self, task: &TaskId) -> EngineResult<Vec<Task>> {
        let _gate = self.read_gate()?;
        let task = self.scoped_task(task)?;
        self.load_all(task.dependencies)
    }

    /// Tasks that depend on `task`
    pub fn dependents_of(&self, task: &TaskId) -> EngineResult<Vec<Task>> {
        let _gate = self.read_gate()?;
        self.scoped_task(task)?;
        self.load_all(self.repo.dependents_of(task)?)
    }

    /// True when every dependency of `task` is completed
    pub fn is_ready(&self, task: &TaskId) -> EngineResult<bool> {
        let _gate = self.read_gate()?;
        let task = self.scoped_task(task)?;
        self.dependencies().is_ready(&task)
    }

    // Queries over the selected project

    pub fn ready_tasks(&self) -> EngineResult<Vec<Task>> {
        let _gate = self.read_gate()?;
        let project = self.selection().resolve()?;
        self.dependencies().ready_tasks(&project)
    }

    pub fn blocked_tasks(&self) -> EngineResult<Vec<Task>> {
        let _gate = self.read_gate()?;
        let project = self.selection().resolve()?;
        self.dependencies().blocked_tasks(&project)
    }

    pub fn next_task(&self) -> EngineResult<Option<Task>> {
        let _gate = self.read_gate()?;
        let project = self.selection().resolve()?;
        let next = self.dependencies().next_task(&project)?;
        debug!(%project, next = ?next.as_ref().map(|t| &t.id), "picked next task");
        Ok(next)
    }

    /// Tasks too complex to start without subtasks
    pub fn needs_breakdown(&self) -> EngineResult<Vec<Task>> {
        let _gate = self.read_gate()?;
        let project = self.selection().resolve()?;
        self.dependencies()
            .needs_breakdown(&project, self.config.transitions.breakdown_threshold)
    }

    pub fn progress(&self) -> EngineResult<ProgressReport> {
        let _gate = self.read_gate()?;
        let project = self.selection().resolve()?;
        Ok(self.repo.progress(&project)?)
    }

    pub fn execution_order(&self) -> EngineResult<Vec<Task>> {
        let _gate = self.read_gate()?;
        let project = self.selection().resolve()?;
        self.dependencies().execution_order(&project)
    }

    // Hierarchy

    pub fn root_tasks(&self) -> EngineResult<Vec<Task>> {
        let _gate = self.read_gate()?;
        let project = self.selection().resolve()?;
        self.hierarchy().root_tasks(&project)
    }

    pub fn children(&self, id: &TaskId) -> EngineResult<Vec<Task>> {
        let _gate = self.read_gate()?;
        let task = self.scoped_task(id)?;
        self.hierarchy().child_tasks(&task)
    }

    /// The parent task, or `None` for a root
    pub fn parent(&self, id: &TaskId) -> EngineResult<Option<Task>> {
        let _gate = self.read_gate()?;
        let task = self.scoped_task(id)?;
        self.hierarchy().parent_task(&task)
    }

    pub fn descendants(&self, id: &TaskId) -> EngineResult<Vec<Task>> {
        let _gate = self.read_gate()?;
        let task = self.scoped_task(id)?;
        self.hierarchy().descendants(&task)
    }

    /// Ancestors, nearest first
    pub fn ancestors(&self, id: &TaskId) -> EngineResult<Vec<Task>> {
        let _gate = self.read_gate()?;
        let task = self.scoped_task(id)?;
        self.hierarchy().ancestors(&task)
    }
}
