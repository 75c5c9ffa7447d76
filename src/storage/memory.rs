//! In-memory repository
//!
//! All state sits behind a single reader/writer lock: reads share it,
//! writes hold it exclusively. Cloning the repository shares the state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::repository::{ProgressReport, Repository, StorageError, StorageResult};
use crate::domain::{AuditStamp, Project, ProjectId, Task, TaskFilter, TaskId};

/// Thread-safe in-memory repository
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<RwLock<InMemoryState>>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    projects: HashMap<ProjectId, Project>,
    tasks: HashMap<TaskId, Task>,
    selected: Option<ProjectId>,
}

impl InMemoryState {
    fn task(&self, id: &TaskId) -> StorageResult<&Task> {
        self.tasks
            .get(id)
            .ok_or_else(|| StorageError::TaskNotFound(id.clone()))
    }

    fn task_mut(&mut self, id: &TaskId) -> StorageResult<&mut Task> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| StorageError::TaskNotFound(id.clone()))
    }

    fn project_tasks<'a>(&'a self, project: &'a ProjectId) -> impl Iterator<Item = &'a Task> + 'a {
        self.tasks.values().filter(move |t| &t.project_id == project)
    }

    fn require_project(&self, id: &ProjectId) -> StorageResult<()> {
        if self.projects.contains_key(id) {
            Ok(())
        } else {
            Err(StorageError::ProjectNotFound(id.clone()))
        }
    }
}

impl InMemoryRepository {
    /// Creates an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, InMemoryState>> {
        self.state
            .read()
            .map_err(|err| StorageError::LockPoisoned(err.to_string()))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, InMemoryState>> {
        self.state
            .write()
            .map_err(|err| StorageError::LockPoisoned(err.to_string()))
    }
}

fn sorted(mut tasks: Vec<Task>) -> Vec<Task> {
    tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    tasks
}

impl Repository for InMemoryRepository {
    fn create_project(&self, project: &Project) -> StorageResult<()> {
        let mut state = self.write()?;
        if state.projects.contains_key(&project.id) {
            return Err(StorageError::DuplicateProject(project.id.clone()));
        }
        state.projects.insert(project.id.clone(), project.clone());
        Ok(())
    }

    fn get_project(&self, id: &ProjectId) -> StorageResult<Project> {
        self.read()?
            .projects
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::ProjectNotFound(id.clone()))
    }

    fn update_project(&self, project: &Project) -> StorageResult<()> {
        let mut state = self.write()?;
        let slot = state
            .projects
            .get_mut(&project.id)
            .ok_or_else(|| StorageError::ProjectNotFound(project.id.clone()))?;
        *slot = project.clone();
        Ok(())
    }

    fn delete_project(&self, id: &ProjectId) -> StorageResult<()> {
        let mut state = self.write()?;
        if state.projects.remove(id).is_none() {
            return Err(StorageError::ProjectNotFound(id.clone()));
        }
        state.tasks.retain(|_, task| &task.project_id != id);
        if state.selected.as_ref() == Some(id) {
            state.selected = None;
        }
        Ok(())
    }

    fn list_projects(&self) -> StorageResult<Vec<Project>> {
        let mut projects: Vec<_> = self.read()?.projects.values().cloned().collect();
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(projects)
    }

    fn create_task(&self, task: &Task) -> StorageResult<()> {
        let mut state = self.write()?;
        state.require_project(&task.project_id)?;
        if state.tasks.contains_key(&task.id) {
            return Err(StorageError::DuplicateTask(task.id.clone()));
        }
        for dep in &task.dependencies {
            state.task(dep)?;
        }
        state.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn get_task(&self, id: &TaskId) -> StorageResult<Task> {
        self.read()?.task(id).cloned()
    }

    fn update_task(&self, task: &Task) -> StorageResult<()> {
        let mut state = self.write()?;
        let slot = state.task_mut(&task.id)?;
        let dependencies = std::mem::take(&mut slot.dependencies);
        *slot = Task {
            dependencies,
            ..task.clone()
        };
        Ok(())
    }

    fn delete_tasks(&self, ids: &[TaskId]) -> StorageResult<()> {
        let mut state = self.write()?;
        for id in ids {
            state.task(id)?;
        }

        for id in ids {
            state.tasks.remove(id);
        }
        for task in state.tasks.values_mut() {
            task.dependencies.retain(|dep| !ids.contains(dep));
        }
        Ok(())
    }

    fn list_tasks(&self, project: &ProjectId) -> StorageResult<Vec<Task>> {
        let state = self.read()?;
        state.require_project(project)?;
        Ok(sorted(state.project_tasks(project).cloned().collect()))
    }

    fn list_children(
        &self,
        project: &ProjectId,
        parent: Option<&TaskId>,
    ) -> StorageResult<Vec<Task>> {
        let state = self.read()?;
        state.require_project(project)?;
        Ok(sorted(
            state
                .project_tasks(project)
                .filter(|t| t.parent_id.as_ref() == parent)
                .cloned()
                .collect(),
        ))
    }

    fn find_tasks(&self, project: &ProjectId, filter: &TaskFilter) -> StorageResult<Vec<Task>> {
        let state = self.read()?;
        state.require_project(project)?;
        Ok(sorted(
            state
                .project_tasks(project)
                .filter(|t| filter.matches(t))
                .cloned()
                .collect(),
        ))
    }

    fn add_dependency(
        &self,
        task: &TaskId,
        depends_on: &TaskId,
        stamp: &AuditStamp,
    ) -> StorageResult<bool> {
        let mut state = self.write()?;
        state.task(depends_on)?;
        let dependent = state.task_mut(task)?;
        let added = dependent.add_dependency(depends_on.clone());
        if added {
            dependent.touch(stamp);
        }
        Ok(added)
    }

    fn remove_dependency(
        &self,
        task: &TaskId,
        depends_on: &TaskId,
        stamp: &AuditStamp,
    ) -> StorageResult<bool> {
        let mut state = self.write()?;
        let dependent = state.task_mut(task)?;
        let removed = dependent.remove_dependency(depends_on);
        if removed {
            dependent.touch(stamp);
        }
        Ok(removed)
    }

    fn dependencies_of(&self, task: &TaskId) -> StorageResult<Vec<TaskId>> {
        Ok(self.read()?.task(task)?.dependencies.clone())
    }

    fn dependents_of(&self, task: &TaskId) -> StorageResult<Vec<TaskId>> {
        let state = self.read()?;
        state.task(task)?;
        let dependents = state
            .tasks
            .values()
            .filter(|t| t.depends_on(task))
            .cloned()
            .collect();
        Ok(sorted(dependents).into_iter().map(|t| t.id).collect())
    }

    fn progress(&self, project: &ProjectId) -> StorageResult<ProgressReport> {
        let state = self.read()?;
        state.require_project(project)?;
        let mut report = ProgressReport::new(project.clone());
        for task in state.project_tasks(project) {
            report.record(task.state, task.depth, 1);
        }
        Ok(report)
    }

    fn selected_project(&self) -> StorageResult<Option<ProjectId>> {
        Ok(self.read()?.selected.clone())
    }

    fn set_selected_project(&self, id: &ProjectId) -> StorageResult<()> {
        let mut state = self.write()?;
        state.require_project(id)?;
        state.selected = Some(id.clone());
        Ok(())
    }

    fn clear_selected_project(&self) -> StorageResult<()> {
        self.write()?.selected = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskState;

    fn stamp() -> AuditStamp {
        AuditStamp::now("tester")
    }

    fn setup() -> (InMemoryRepository, Project) {
        let repo = InMemoryRepository::new();
        let project = Project::new("Test", &stamp());
        repo.create_project(&project).unwrap();
        (repo, project)
    }

    fn add_task(repo: &InMemoryRepository, project: &Project, title: &str) -> Task {
        let task = Task::new(project.id.clone(), title, &stamp());
        repo.create_task(&task).unwrap();
        task
    }

    #[test]
    fn missing_records_are_not_found() {
        let repo = InMemoryRepository::new();
        let pid = ProjectId::new("x", chrono::Utc::now());
        let tid = TaskId::new("x", chrono::Utc::now());

        assert!(matches!(repo.get_project(&pid), Err(StorageError::ProjectNotFound(_))));
        assert!(matches!(repo.get_task(&tid), Err(StorageError::TaskNotFound(_))));
        assert!(matches!(repo.delete_task(&tid), Err(StorageError::TaskNotFound(_))));
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let (repo, project) = setup();
        let task = add_task(&repo, &project, "A");

        assert!(matches!(repo.create_project(&project), Err(StorageError::DuplicateProject(_))));
        assert!(matches!(repo.create_task(&task), Err(StorageError::DuplicateTask(_))));
    }

    #[test]
    fn update_task_keeps_edges() {
        let (repo, project) = setup();
        let a = add_task(&repo, &project, "A");
        let b = add_task(&repo, &project, "B");
        repo.add_dependency(&b.id, &a.id, &stamp()).unwrap();

        let mut changed = repo.get_task(&b.id).unwrap();
        changed.title = "B2".into();
        changed.dependencies.clear();
        repo.update_task(&changed).unwrap();

        let stored = repo.get_task(&b.id).unwrap();
        assert_eq!(stored.title, "B2");
        assert_eq!(stored.dependencies, vec![a.id]);
    }

    #[test]
    fn children_and_roots() {
        let (repo, project) = setup();
        let root = add_task(&repo, &project, "Root");
        let child = Task::new(project.id.clone(), "Child", &stamp()).with_parent(&root);
        repo.create_task(&child).unwrap();

        let roots = repo.list_children(&project.id, None).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, root.id);

        let children = repo.list_children(&project.id, Some(&root.id)).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, child.id);
    }

    #[test]
    fn delete_task_drops_edges_both_ways() {
        let (repo, project) = setup();
        let a = add_task(&repo, &project, "A");
        let b = add_task(&repo, &project, "B");
        let c = add_task(&repo, &project, "C");
        repo.add_dependency(&b.id, &a.id, &stamp()).unwrap();
        repo.add_dependency(&c.id, &b.id, &stamp()).unwrap();

        repo.delete_task(&b.id).unwrap();

        assert!(repo.dependencies_of(&c.id).unwrap().is_empty());
        assert!(repo.dependents_of(&a.id).unwrap().is_empty());
    }

    #[test]
    fn delete_tasks_is_all_or_nothing() {
        let (repo, project) = setup();
        let a = add_task(&repo, &project, "A");
        let b = add_task(&repo, &project, "B");
        let c = add_task(&repo, &project, "C");
        repo.add_dependency(&c.id, &b.id, &stamp()).unwrap();
        let ghost = TaskId::new("ghost", chrono::Utc::now());

        let err = repo.delete_tasks(&[a.id.clone(), ghost]).unwrap_err();
        assert!(matches!(err, StorageError::TaskNotFound(_)));
        assert!(repo.get_task(&a.id).is_ok());

        repo.delete_tasks(&[a.id.clone(), b.id.clone()]).unwrap();
        assert!(repo.get_task(&a.id).is_err());
        assert!(repo.dependencies_of(&c.id).unwrap().is_empty());
    }

    #[test]
    fn add_dependency_is_idempotent() {
        let (repo, project) = setup();
        let a = add_task(&repo, &project, "A");
        let b = add_task(&repo, &project, "B");

        assert!(repo.add_dependency(&b.id, &a.id, &stamp()).unwrap());
        assert!(!repo.add_dependency(&b.id, &a.id, &stamp()).unwrap());
        assert_eq!(repo.dependents_of(&a.id).unwrap(), vec![b.id.clone()]);

        assert!(repo.remove_dependency(&b.id, &a.id, &stamp()).unwrap());
        assert!(!repo.remove_dependency(&b.id, &a.id, &stamp()).unwrap());
    }

    #[test]
    fn delete_project_cascades_and_clears_selection() {
        let (repo, project) = setup();
        let task = add_task(&repo, &project, "A");
        repo.set_selected_project(&project.id).unwrap();

        repo.delete_project(&project.id).unwrap();

        assert!(repo.get_task(&task.id).is_err());
        assert_eq!(repo.selected_project().unwrap(), None);
    }

    #[test]
    fn find_tasks_applies_filter() {
        let (repo, project) = setup();
        let a = add_task(&repo, &project, "A");
        let mut b = add_task(&repo, &project, "B");
        b.state = TaskState::Completed;
        repo.update_task(&b).unwrap();

        let pending = repo
            .find_tasks(&project.id, &TaskFilter::new().with_state(TaskState::Pending))
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a.id);
    }

    #[test]
    fn clones_share_state() {
        let (repo, project) = setup();
        let other = repo.clone();
        add_task(&other, &project, "A");

        assert_eq!(repo.list_tasks(&project.id).unwrap().len(), 1);
    }

    #[test]
    fn selecting_unknown_project_fails() {
        let repo = InMemoryRepository::new();
        let pid = ProjectId::new("x", chrono::Utc::now());

        assert!(repo.set_selected_project(&pid).is_err());
        assert_eq!(repo.selected_project().unwrap(), None);
    }
}
