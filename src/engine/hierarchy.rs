//! Task tree construction and traversal
//!
//! Parent links are plain identifiers read back from storage, so every
//! traversal carries a visited set and stops instead of looping if the
//! stored links ever form a cycle.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::error::{EngineError, EngineResult};
use crate::domain::{
    AuditStamp, Complexity, Priority, ProjectId, Task, TaskId, TaskState, ValidationError,
};
use crate::storage::{HierarchyLimits, Repository, StorageError};

/// Input for a new task
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub parent: Option<TaskId>,
    pub title: String,
    pub description: String,
    /// Defaults to 5 when unset
    pub complexity: Option<u8>,
    pub priority: Priority,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn under(mut self, parent: TaskId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn complexity(mut self, complexity: u8) -> Self {
        self.complexity = Some(complexity);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Hierarchy operations over a repository
pub struct Hierarchy<'a, R: Repository + ?Sized> {
    repo: &'a R,
    limits: &'a HierarchyLimits,
}

impl<'a, R: Repository + ?Sized> Hierarchy<'a, R> {
    pub fn new(repo: &'a R, limits: &'a HierarchyLimits) -> Self {
        Self { repo, limits }
    }

    /// Creates a task, deriving its depth and enforcing depth and fan-out limits
    ///
    /// Nothing is written unless every check passes. Callers must hold the
    /// write gate so the sibling count cannot go stale before the insert.
    pub fn create_task(
        &self,
        project: &ProjectId,
        input: NewTask,
        stamp: &AuditStamp,
    ) -> EngineResult<Task> {
        if self.repo.get_project(project)?.is_pending_deletion() {
            return Err(ValidationError::ProjectPendingDeletion(project.to_string()).into());
        }

        let complexity = match input.complexity {
            Some(value) => Complexity::new(value)?,
            None => Complexity::default(),
        };

        let mut task = Task::new(project.clone(), input.title, stamp)
            .with_description(input.description)
            .with_complexity(complexity)
            .with_priority(input.priority);
        task.validate()?;

        if let Some(parent_id) = &input.parent {
            let parent = match self.repo.get_task(parent_id) {
                Ok(parent) if &parent.project_id == project => parent,
                Ok(_) | Err(StorageError::TaskNotFound(_)) => {
                    return Err(EngineError::ParentNotFound(parent_id.clone()))
                }
                Err(err) => return Err(err.into()),
            };
            if parent.state == TaskState::PendingDeletion {
                return Err(ValidationError::ParentPendingDeletion(parent_id.to_string()).into());
            }
            task = task.with_parent(&parent);
        }

        if task.depth > self.limits.max_depth {
            return Err(EngineError::DepthExceeded {
                depth: task.depth,
                max: self.limits.max_depth,
            });
        }

        let siblings = self.repo.list_children(project, input.parent.as_ref())?.len();
        let max = self.limits.max_tasks_at(task.depth);
        if siblings + 1 > max {
            return Err(EngineError::FanOutExceeded {
                depth: task.depth,
                count: siblings + 1,
                max,
            });
        }

        self.repo.create_task(&task)?;
        debug!(task = %task.id, depth = task.depth, "created task");
        Ok(task)
    }

    pub fn root_tasks(&self, project: &ProjectId) -> EngineResult<Vec<Task>> {
        Ok(self.repo.list_children(project, None)?)
    }

    pub fn child_tasks(&self, task: &Task) -> EngineResult<Vec<Task>> {
        Ok(self.repo.list_children(&task.project_id, Some(&task.id))?)
    }

    /// Returns the parent, or `None` for a root task
    pub fn parent_task(&self, task: &Task) -> EngineResult<Option<Task>> {
        match &task.parent_id {
            Some(parent_id) => match self.repo.get_task(parent_id) {
                Ok(parent) => Ok(Some(parent)),
                Err(StorageError::TaskNotFound(_)) => {
                    Err(EngineError::ParentNotFound(parent_id.clone()))
                }
                Err(err) => Err(err.into()),
            },
            None => Ok(None),
        }
    }

    /// All descendants of `task`, depth-first, each parent before its children
    pub fn descendants(&self, task: &Task) -> EngineResult<Vec<Task>> {
        let mut visited = HashSet::from([task.id.clone()]);
        let mut result = Vec::new();
        let mut stack = self.child_tasks(task)?;
        stack.reverse();

        while let Some(child) = stack.pop() {
            if !visited.insert(child.id.clone()) {
                warn!(task = %child.id, "parent links form a cycle; skipping revisit");
                continue;
            }

            let mut grandchildren = self.child_tasks(&child)?;
            grandchildren.reverse();
            result.push(child);
            stack.extend(grandchildren);
        }

        Ok(result)
    }

    /// Ancestors of `task`, nearest first
    pub fn ancestors(&self, task: &Task) -> EngineResult<Vec<Task>> {
        let mut visited = HashSet::from([task.id.clone()]);
        let mut result = Vec::new();
        let mut current = task.clone();

        while let Some(parent) = self.parent_task(&current)? {
            if !visited.insert(parent.id.clone()) {
                warn!(task = %parent.id, "parent links form a cycle; stopping ancestor walk");
                break;
            }
            result.push(parent.clone());
            current = parent;
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Project, ProjectState};
    use crate::engine::ErrorKind;
    use crate::storage::{DepthLimit, InMemoryRepository};

    fn stamp() -> AuditStamp {
        AuditStamp::now("tester")
    }

    fn setup() -> (InMemoryRepository, ProjectId) {
        let repo = InMemoryRepository::new();
        let project = Project::new("Test", &stamp());
        repo.create_project(&project).unwrap();
        (repo, project.id)
    }

    #[test]
    fn depth_follows_parent() {
        let (repo, pid) = setup();
        let limits = HierarchyLimits::default();
        let h = Hierarchy::new(&repo, &limits);

        let root = h.create_task(&pid, NewTask::new("Root"), &stamp()).unwrap();
        let child = h
            .create_task(&pid, NewTask::new("Child").under(root.id.clone()), &stamp())
            .unwrap();
        let grandchild = h
            .create_task(&pid, NewTask::new("Grandchild").under(child.id.clone()), &stamp())
            .unwrap();

        assert_eq!(root.depth, 0);
        assert_eq!(child.depth, 1);
        assert_eq!(grandchild.depth, 2);
        assert_eq!(root.complexity.value(), 5);
    }

    #[test]
    fn depth_limit_rejects_without_writing() {
        let (repo, pid) = setup();
        let limits = HierarchyLimits {
            max_depth: 1,
            ..HierarchyLimits::default()
        };
        let h = Hierarchy::new(&repo, &limits);

        let root = h.create_task(&pid, NewTask::new("Root"), &stamp()).unwrap();
        let child = h
            .create_task(&pid, NewTask::new("Child").under(root.id.clone()), &stamp())
            .unwrap();
        let err = h
            .create_task(&pid, NewTask::new("Too deep").under(child.id), &stamp())
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DepthExceeded);
        assert_eq!(repo.list_tasks(&pid).unwrap().len(), 2);
    }

    #[test]
    fn fan_out_limit_uses_override() {
        let (repo, pid) = setup();
        let limits = HierarchyLimits {
            overrides: vec![DepthLimit {
                depth: 0,
                max_tasks: 2,
            }],
            ..HierarchyLimits::default()
        };
        let h = Hierarchy::new(&repo, &limits);

        h.create_task(&pid, NewTask::new("A"), &stamp()).unwrap();
        h.create_task(&pid, NewTask::new("B"), &stamp()).unwrap();
        let err = h.create_task(&pid, NewTask::new("C"), &stamp()).unwrap_err();

        assert!(matches!(
            err,
            EngineError::FanOutExceeded { depth: 0, count: 3, max: 2 }
        ));
        assert_eq!(repo.list_tasks(&pid).unwrap().len(), 2);
    }

    #[test]
    fn parent_in_other_project_is_not_found() {
        let (repo, pid) = setup();
        let other = Project::new("Other", &stamp());
        repo.create_project(&other).unwrap();
        let limits = HierarchyLimits::default();
        let h = Hierarchy::new(&repo, &limits);

        let foreign = h.create_task(&other.id, NewTask::new("Foreign"), &stamp()).unwrap();
        let err = h
            .create_task(&pid, NewTask::new("Child").under(foreign.id), &stamp())
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn invalid_fields_are_validation_errors() {
        let (repo, pid) = setup();
        let limits = HierarchyLimits::default();
        let h = Hierarchy::new(&repo, &limits);

        let empty = h.create_task(&pid, NewTask::new("  "), &stamp()).unwrap_err();
        let complex = h
            .create_task(&pid, NewTask::new("X").complexity(11), &stamp())
            .unwrap_err();

        assert_eq!(empty.kind(), ErrorKind::Validation);
        assert_eq!(complex.kind(), ErrorKind::Validation);
        assert!(repo.list_tasks(&pid).unwrap().is_empty());
    }

    #[test]
    fn no_children_under_pending_deletion_parent() {
        let (repo, pid) = setup();
        let limits = HierarchyLimits::default();
        let h = Hierarchy::new(&repo, &limits);

        let mut root = h.create_task(&pid, NewTask::new("Root"), &stamp()).unwrap();
        root.state = TaskState::PendingDeletion;
        repo.update_task(&root).unwrap();

        let err = h
            .create_task(&pid, NewTask::new("Child").under(root.id), &stamp())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn no_tasks_in_pending_deletion_project() {
        let (repo, pid) = setup();
        let limits = HierarchyLimits::default();
        let h = Hierarchy::new(&repo, &limits);

        let mut project = repo.get_project(&pid).unwrap();
        project.state = ProjectState::PendingDeletion;
        repo.update_project(&project).unwrap();

        let err = h.create_task(&pid, NewTask::new("Late"), &stamp()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::ProjectPendingDeletion(_))
        ));
        assert!(repo.list_tasks(&pid).unwrap().is_empty());
    }

    #[test]
    fn descendants_are_pre_order() {
        let (repo, pid) = setup();
        let limits = HierarchyLimits::default();
        let h = Hierarchy::new(&repo, &limits);

        let root = h.create_task(&pid, NewTask::new("Root"), &stamp()).unwrap();
        let a = h.create_task(&pid, NewTask::new("A").under(root.id.clone()), &stamp()).unwrap();
        let a1 = h.create_task(&pid, NewTask::new("A1").under(a.id.clone()), &stamp()).unwrap();
        let b = h.create_task(&pid, NewTask::new("B").under(root.id.clone()), &stamp()).unwrap();

        let ids: Vec<_> = h.descendants(&root).unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![a.id, a1.id.clone(), b.id]);

        let ancestors: Vec<_> = h.ancestors(&a1).unwrap().into_iter().map(|t| t.title).collect();
        assert_eq!(ancestors, vec!["A", "Root"]);
    }

    #[test]
    fn corrupted_parent_cycle_terminates() {
        let (repo, pid) = setup();
        let limits = HierarchyLimits::default();
        let h = Hierarchy::new(&repo, &limits);

        let mut a = h.create_task(&pid, NewTask::new("A"), &stamp()).unwrap();
        let b = h.create_task(&pid, NewTask::new("B").under(a.id.clone()), &stamp()).unwrap();

        // Point A back at its own child.
        a.parent_id = Some(b.id.clone());
        repo.update_task(&a).unwrap();

        let descendants = h.descendants(&a).unwrap();
        assert_eq!(descendants.len(), 1);

        let ancestors = h.ancestors(&a).unwrap();
        assert_eq!(ancestors.len(), 1);
    }

    #[test]
    fn root_has_no_parent() {
        let (repo, pid) = setup();
        let limits = HierarchyLimits::default();
        let h = Hierarchy::new(&repo, &limits);

        let root = h.create_task(&pid, NewTask::new("Root"), &stamp()).unwrap();
        assert!(h.parent_task(&root).unwrap().is_none());
        assert_eq!(h.root_tasks(&pid).unwrap().len(), 1);
    }
}
