//! Task dependency DAG
//!
//! Edges point from a dependency to its dependent, so a topological sort
//! yields an execution order. Built on petgraph.

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use thiserror::Error;

use super::id::TaskId;
use super::task::Task;

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("{0} depending on {1} would create a cycle")]
    CycleDetected(TaskId, TaskId),

    #[error("Task {0} is not in the dependency graph")]
    TaskNotFound(TaskId),

    #[error("Dependency graph contains a cycle through {0}")]
    CyclicGraph(TaskId),
}

/// Dependency edges between the tasks of one project
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<TaskId, ()>,
    nodes: HashMap<TaskId, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            nodes: HashMap::new(),
        }
    }

    /// Builds a graph from stored tasks
    ///
    /// Edges are loaded as stored, without cycle checks. Dependencies on
    /// tasks outside the collection are skipped.
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let tasks: Vec<&Task> = tasks.into_iter().collect();
        let mut graph = Self::new();
        tasks.iter().for_each(|t| graph.add_task(t.id.clone()));

        for task in &tasks {
            for dep_id in &task.dependencies {
                if let (Some(&task_idx), Some(&dep_idx)) =
                    (graph.nodes.get(&task.id), graph.nodes.get(dep_id))
                {
                    graph.graph.update_edge(dep_idx, task_idx, ());
                }
            }
        }

        graph
    }

    /// Registers a task as a node; repeated calls are ignored
    pub fn add_task(&mut self, task_id: TaskId) {
        let graph = &mut self.graph;
        self.nodes
            .entry(task_id)
            .or_insert_with_key(|id| graph.add_node(id.clone()));
    }

    fn index(&self, task_id: &TaskId) -> Result<NodeIndex, GraphError> {
        self.nodes
            .get(task_id)
            .copied()
            .ok_or_else(|| GraphError::TaskNotFound(task_id.clone()))
    }

    /// Returns true if `task` depending on `depends_on` would close a cycle,
    /// i.e. `depends_on` already depends on `task`, directly or transitively
    pub fn would_create_cycle(&self, task: &TaskId, depends_on: &TaskId) -> Result<bool, GraphError> {
        if task == depends_on {
            return Ok(true);
        }
        let task_idx = self.index(task)?;
        let dep_idx = self.index(depends_on)?;

        // Edges run dependency -> dependent, so a path task ->* depends_on
        // means depends_on is downstream of task.
        Ok(has_path_connecting(&self.graph, task_idx, dep_idx, None))
    }

    /// Adds a dependency edge: `task` depends on `depends_on`
    ///
    /// The edge direction is: depends_on -> task
    /// This means "depends_on must be completed before task".
    /// Returns false if the edge already existed.
    pub fn add_dependency(&mut self, task: &TaskId, depends_on: &TaskId) -> Result<bool, GraphError> {
        let task_idx = self.index(task)?;
        let dep_idx = self.index(depends_on)?;

        if self.graph.find_edge(dep_idx, task_idx).is_some() {
            return Ok(false);
        }

        if self.would_create_cycle(task, depends_on)? {
            return Err(GraphError::CycleDetected(task.clone(), depends_on.clone()));
        }

        self.graph.add_edge(dep_idx, task_idx, ());
        Ok(true)
    }

    /// Returns all tasks in topological order (dependencies before dependents)
    pub fn topological_order(&self) -> Result<Vec<TaskId>, GraphError> {
        match toposort(&self.graph, None) {
            Ok(order) => Ok(order
                .into_iter()
                .map(|idx| self.graph[idx].clone())
                .collect()),
            Err(cycle) => Err(GraphError::CyclicGraph(self.graph[cycle.node_id()].clone())),
        }
    }
}
