//! Storage-backed dependency operations and readiness queries
//!
//! Every new edge is checked against a [`DependencyGraph`] snapshot of the
//! whole project, so cycles are caught transitively and not just between
//! direct neighbours.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use super::error::{EngineError, EngineResult};
use crate::domain::{
    AuditStamp, DependencyGraph, GraphError, ProjectId, Task, TaskId, TaskState, ValidationError,
};
use crate::storage::Repository;

/// Dependency operations over a repository
pub struct Dependencies<'a, R: Repository + ?Sized> {
    repo: &'a R,
}

/// A project's tasks plus the lookups readiness queries need
struct Snapshot {
    tasks: Vec<Task>,
    states: HashMap<TaskId, TaskState>,
    parents_with_active_children: HashSet<TaskId>,
    parents: HashSet<TaskId>,
}

impl Snapshot {
    fn new(tasks: Vec<Task>) -> Self {
        let states = tasks.iter().map(|t| (t.id.clone(), t.state)).collect();
        let parents = tasks.iter().filter_map(|t| t.parent_id.clone()).collect();
        let parents_with_active_children = tasks
            .iter()
            .filter(|t| t.state.is_active())
            .filter_map(|t| t.parent_id.clone())
            .collect();

        Self {
            tasks,
            states,
            parents_with_active_children,
            parents,
        }
    }

    /// Preference tier of a ready task: lower is picked first
    fn tier(&self, task: &Task) -> u8 {
        match task.state {
            TaskState::InProgress if !self.parents_with_active_children.contains(&task.id) => 0,
            TaskState::Pending => 1,
            _ => 2,
        }
    }
}

impl<'a, R: Repository + ?Sized> Dependencies<'a, R> {
    pub fn new(repo: &'a R) -> Self {
        Self { repo }
    }

    fn snapshot(&self, project: &ProjectId) -> EngineResult<Snapshot> {
        Ok(Snapshot::new(self.repo.list_tasks(project)?))
    }

    /// Records that `task` depends on `depends_on`
    ///
    /// Returns false if the edge already existed. Fails without writing if
    /// the tasks belong to different projects or the edge would close a cycle.
    pub fn add_dependency(
        &self,
        task: &TaskId,
        depends_on: &TaskId,
        stamp: &AuditStamp,
    ) -> EngineResult<bool> {
        let dependent = self.repo.get_task(task)?;
        let dependency = self.repo.get_task(depends_on)?;

        if dependency.project_id != dependent.project_id {
            return Err(ValidationError::ProjectMismatch {
                task: depends_on.to_string(),
                expected: dependent.project_id.to_string(),
                actual: dependency.project_id.to_string(),
            }
            .into());
        }

        if dependent.depends_on(depends_on) {
            debug!(%task, %depends_on, "dependency already present");
            return Ok(false);
        }

        let tasks = self.repo.list_tasks(&dependent.project_id)?;
        let mut graph = DependencyGraph::from_tasks(&tasks);
        match graph.add_dependency(task, depends_on) {
            Ok(_) => {}
            Err(err @ GraphError::CycleDetected(..)) => {
                debug!(%task, %depends_on, "rejected dependency that would close a cycle");
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        }

        Ok(self.repo.add_dependency(task, depends_on, stamp)?)
    }

    /// Removes an edge; returns false if it was absent
    pub fn remove_dependency(
        &self,
        task: &TaskId,
        depends_on: &TaskId,
        stamp: &AuditStamp,
    ) -> EngineResult<bool> {
        Ok(self.repo.remove_dependency(task, depends_on, stamp)?)
    }

    /// Returns true if every dependency of `task` is completed
    pub fn is_ready(&self, task: &Task) -> EngineResult<bool> {
        let snapshot = self.snapshot(&task.project_id)?;
        Ok(task.is_ready(&snapshot.states))
    }

    /// Pending and in-progress tasks whose dependencies are all completed
    ///
    /// In-progress tasks with no active subtasks come first, then pending
    /// tasks, then in-progress tasks still waiting on their subtasks. Within a
    /// tier, higher priority and then earlier creation wins.
    pub fn ready_tasks(&self, project: &ProjectId) -> EngineResult<Vec<Task>> {
        let snapshot = self.snapshot(project)?;

        let mut ready: Vec<_> = snapshot
            .tasks
            .iter()
            .filter(|t| t.state.is_active() && t.is_ready(&snapshot.states))
            .map(|t| (snapshot.tier(t), t))
            .collect();
        ready.sort_by_key(|(tier, t)| (*tier, Reverse(t.priority), t.created_at));

        Ok(ready.into_iter().map(|(_, t)| t.clone()).collect())
    }

    /// The single task to work on next, if any
    pub fn next_task(&self, project: &ProjectId) -> EngineResult<Option<Task>> {
        let snapshot = self.snapshot(project)?;

        Ok(snapshot
            .tasks
            .iter()
            .filter(|t| t.state.is_active() && t.is_ready(&snapshot.states))
            .filter(|t| snapshot.tier(t) < 2)
            .min_by_key(|t| (snapshot.tier(t), Reverse(t.priority), t.created_at))
            .cloned())
    }

    /// Pending and in-progress tasks waiting on at least one unfinished dependency
    pub fn blocked_tasks(&self, project: &ProjectId) -> EngineResult<Vec<Task>> {
        let snapshot = self.snapshot(project)?;

        Ok(snapshot
            .tasks
            .iter()
            .filter(|t| t.is_blocked(&snapshot.states))
            .cloned()
            .collect())
    }

    /// Open tasks at or above `threshold` complexity that have no subtasks yet
    pub fn needs_breakdown(&self, project: &ProjectId, threshold: u8) -> EngineResult<Vec<Task>> {
        let snapshot = self.snapshot(project)?;

        Ok(snapshot
            .tasks
            .iter()
            .filter(|t| {
                matches!(
                    t.state,
                    TaskState::Pending | TaskState::InProgress | TaskState::Blocked
                )
            })
            .filter(|t| t.complexity.value() >= threshold)
            .filter(|t| !snapshot.parents.contains(&t.id))
            .cloned()
            .collect())
    }

    /// All tasks of the project, dependencies before dependents
    pub fn execution_order(&self, project: &ProjectId) -> EngineResult<Vec<Task>> {
        let snapshot = self.snapshot(project)?;
        let graph = DependencyGraph::from_tasks(&snapshot.tasks);

        let order = graph.topological_order().map_err(|err| {
            warn!(%project, error = %err, "stored dependencies contain a cycle");
            EngineError::from(err)
        })?;

        let mut by_id: HashMap<_, _> = snapshot
            .tasks
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        Ok(order.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Complexity, Priority, Project};
    use crate::engine::ErrorKind;
    use crate::storage::InMemoryRepository;

    fn stamp() -> AuditStamp {
        AuditStamp::now("tester")
    }

    fn setup() -> (InMemoryRepository, ProjectId) {
        let repo = InMemoryRepository::new();
        let project = Project::new("Test", &stamp());
        repo.create_project(&project).unwrap();
        (repo, project.id)
    }

    fn add(repo: &InMemoryRepository, pid: &ProjectId, title: &str) -> Task {
        let task = Task::new(pid.clone(), title, &stamp());
        repo.create_task(&task).unwrap();
        task
    }

    fn set_state(repo: &InMemoryRepository, id: &TaskId, state: TaskState) {
        let mut task = repo.get_task(id).unwrap();
        task.state = state;
        repo.update_task(&task).unwrap();
    }

    fn ids(tasks: &[Task]) -> Vec<TaskId> {
        tasks.iter().map(|t| t.id.clone()).collect()
    }

    #[test]
    fn transitive_cycle_rejected_and_graph_unchanged() {
        let (repo, pid) = setup();
        let deps = Dependencies::new(&repo);
        let a = add(&repo, &pid, "A");
        let b = add(&repo, &pid, "B");
        let c = add(&repo, &pid, "C");

        deps.add_dependency(&b.id, &a.id, &stamp()).unwrap();
        deps.add_dependency(&c.id, &b.id, &stamp()).unwrap();
        let err = deps.add_dependency(&a.id, &c.id, &stamp()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CircularDependency);
        assert!(repo.dependencies_of(&a.id).unwrap().is_empty());
    }

    #[test]
    fn self_dependency_rejected() {
        let (repo, pid) = setup();
        let a = add(&repo, &pid, "A");

        let err = Dependencies::new(&repo)
            .add_dependency(&a.id, &a.id, &stamp())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircularDependency);
    }

    #[test]
    fn existing_edge_is_noop() {
        let (repo, pid) = setup();
        let deps = Dependencies::new(&repo);
        let a = add(&repo, &pid, "A");
        let b = add(&repo, &pid, "B");

        assert!(deps.add_dependency(&b.id, &a.id, &stamp()).unwrap());
        assert!(!deps.add_dependency(&b.id, &a.id, &stamp()).unwrap());
        assert_eq!(repo.dependencies_of(&b.id).unwrap(), vec![a.id]);
    }

    #[test]
    fn cross_project_edge_rejected() {
        let (repo, pid) = setup();
        let other = Project::new("Other", &stamp());
        repo.create_project(&other).unwrap();
        let a = add(&repo, &pid, "A");
        let foreign = add(&repo, &other.id, "Foreign");

        let err = Dependencies::new(&repo)
            .add_dependency(&a.id, &foreign.id, &stamp())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn missing_task_is_not_found() {
        let (repo, pid) = setup();
        let a = add(&repo, &pid, "A");
        let ghost = TaskId::new("ghost", chrono::Utc::now());

        let err = Dependencies::new(&repo)
            .add_dependency(&a.id, &ghost, &stamp())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn chain_readiness() {
        let (repo, pid) = setup();
        let deps = Dependencies::new(&repo);
        let a = add(&repo, &pid, "A");
        let b = add(&repo, &pid, "B");
        let c = add(&repo, &pid, "C");
        let d = add(&repo, &pid, "D");
        deps.add_dependency(&b.id, &a.id, &stamp()).unwrap();
        deps.add_dependency(&c.id, &b.id, &stamp()).unwrap();
        deps.add_dependency(&d.id, &c.id, &stamp()).unwrap();

        set_state(&repo, &a.id, TaskState::Completed);
        set_state(&repo, &b.id, TaskState::Completed);

        assert_eq!(ids(&deps.ready_tasks(&pid).unwrap()), vec![c.id.clone()]);
        assert_eq!(ids(&deps.blocked_tasks(&pid).unwrap()), vec![d.id.clone()]);

        set_state(&repo, &c.id, TaskState::Completed);
        assert_eq!(ids(&deps.ready_tasks(&pid).unwrap()), vec![d.id.clone()]);
        assert!(deps.blocked_tasks(&pid).unwrap().is_empty());
    }

    #[test]
    fn ready_prefers_in_progress_then_priority() {
        let (repo, pid) = setup();
        let deps = Dependencies::new(&repo);

        let low = add(&repo, &pid, "Low");
        let mut high = Task::new(pid.clone(), "High", &stamp()).with_priority(Priority::High);
        repo.create_task(&high).unwrap();
        let started = add(&repo, &pid, "Started");
        set_state(&repo, &started.id, TaskState::InProgress);

        let parent = add(&repo, &pid, "Parent");
        set_state(&repo, &parent.id, TaskState::InProgress);
        let child = Task::new(pid.clone(), "Child", &stamp()).with_parent(&parent);
        repo.create_task(&child).unwrap();

        high = repo.get_task(&high.id).unwrap();
        let ready = ids(&deps.ready_tasks(&pid).unwrap());
        assert_eq!(
            ready,
            vec![started.id.clone(), high.id, low.id, child.id, parent.id]
        );
        assert_eq!(deps.next_task(&pid).unwrap().map(|t| t.id), Some(started.id));
    }

    #[test]
    fn next_task_skips_waiting_parents() {
        let (repo, pid) = setup();
        let deps = Dependencies::new(&repo);

        let parent = add(&repo, &pid, "Parent");
        set_state(&repo, &parent.id, TaskState::InProgress);
        let child = Task::new(pid.clone(), "Child", &stamp()).with_parent(&parent);
        repo.create_task(&child).unwrap();
        set_state(&repo, &child.id, TaskState::Completed);

        // Once the only child is done, the parent is actionable again.
        assert_eq!(deps.next_task(&pid).unwrap().map(|t| t.id), Some(parent.id.clone()));

        set_state(&repo, &parent.id, TaskState::Completed);
        assert!(deps.next_task(&pid).unwrap().is_none());
    }

    #[test]
    fn needs_breakdown_ignores_decomposed_tasks() {
        let (repo, pid) = setup();
        let deps = Dependencies::new(&repo);

        let big = Task::new(pid.clone(), "Big", &stamp()).with_complexity(Complexity::new(9).unwrap());
        repo.create_task(&big).unwrap();
        let small = add(&repo, &pid, "Small");

        assert_eq!(ids(&deps.needs_breakdown(&pid, 8).unwrap()), vec![big.id.clone()]);

        let sub = Task::new(pid.clone(), "Sub", &stamp()).with_parent(&big);
        repo.create_task(&sub).unwrap();
        assert!(deps.needs_breakdown(&pid, 8).unwrap().is_empty());
        assert!(!ids(&deps.needs_breakdown(&pid, 5).unwrap()).contains(&big.id));
        assert!(ids(&deps.needs_breakdown(&pid, 5).unwrap()).contains(&small.id));
    }

    #[test]
    fn execution_order_puts_dependencies_first() {
        let (repo, pid) = setup();
        let deps = Dependencies::new(&repo);
        let a = add(&repo, &pid, "A");
        let b = add(&repo, &pid, "B");
        let c = add(&repo, &pid, "C");
        deps.add_dependency(&a.id, &c.id, &stamp()).unwrap();
        deps.add_dependency(&c.id, &b.id, &stamp()).unwrap();

        let order = ids(&deps.execution_order(&pid).unwrap());
        let pos = |id: &TaskId| order.iter().position(|x| x == id).unwrap();

        assert_eq!(order.len(), 3);
        assert!(pos(&b.id) < pos(&c.id));
        assert!(pos(&c.id) < pos(&a.id));
    }
}
