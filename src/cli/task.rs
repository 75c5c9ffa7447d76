//! Task and dependency CLI commands

use std::collections::HashMap;

use anyhow::{bail, Result};
use clap::Subcommand;

use super::app::Session;
use super::output::Output;
use super::project::print_deletion;
use crate::domain::{Priority, Task, TaskFilter, TaskId, TaskState};
use crate::engine::{DeleteOptions, NewTask, TaskUpdate, TransitionReport};

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Add a task to the selected project
    ///
    /// Examples:
    ///   tasktree task add "Build API"
    ///   tasktree task add "Write handlers" --parent t-9d3e5f20 --complexity 4
    Add {
        /// Task title
        title: String,

        /// Parent task (omit for a root task)
        #[arg(long, short)]
        parent: Option<TaskId>,

        #[arg(long, short)]
        description: Option<String>,

        /// Complexity from 1 to 10
        #[arg(long, short)]
        complexity: Option<u8>,

        /// low, medium or high
        #[arg(long)]
        priority: Option<Priority>,
    },

    /// List tasks in the selected project
    List {
        /// Only tasks in this state (repeatable)
        #[arg(long = "state", short)]
        states: Vec<TaskState>,

        #[arg(long)]
        min_depth: Option<u32>,

        #[arg(long)]
        max_depth: Option<u32>,

        #[arg(long)]
        min_complexity: Option<u8>,

        #[arg(long)]
        max_complexity: Option<u8>,
    },

    /// Show task details
    Show {
        /// Task ID
        id: TaskId,
    },

    /// Change task fields
    Update {
        /// Task ID
        id: TaskId,

        #[arg(long)]
        title: Option<String>,

        #[arg(long, short)]
        description: Option<String>,

        #[arg(long, short)]
        complexity: Option<u8>,

        #[arg(long)]
        priority: Option<Priority>,
    },

    /// Move a task to another state
    State {
        /// Task ID
        id: TaskId,

        /// pending, in-progress, completed, blocked or cancelled
        state: TaskState,
    },

    /// Mark task as in progress
    Start {
        /// Task ID
        id: TaskId,
    },

    /// Mark task as completed
    Done {
        /// Task ID
        id: TaskId,
    },

    /// Mark a task for deletion, or delete a marked task
    Delete {
        /// Task ID
        id: TaskId,

        /// Also delete every task below it
        #[arg(long)]
        cascade: bool,

        /// Show what would happen without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// List the direct children of a task
    Children {
        /// Task ID
        id: TaskId,
    },

    /// Show the task hierarchy
    Tree {
        /// Subtree root (defaults to the whole project)
        id: Option<TaskId>,
    },
}

#[derive(Subcommand)]
pub enum DepCommands {
    /// Make a task depend on another
    Add {
        /// Task that will wait
        task: TaskId,

        /// Task that must be completed first
        depends_on: TaskId,
    },

    /// Remove a dependency
    Remove {
        task: TaskId,
        depends_on: TaskId,
    },

    /// Show what a task depends on and what depends on it
    List {
        task: TaskId,
    },
}

pub fn run(cmd: TaskCommands, session: &Session, output: &Output) -> Result<()> {
    match cmd {
        TaskCommands::Add {
            title,
            parent,
            description,
            complexity,
            priority,
        } => {
            let input = NewTask {
                parent,
                title,
                description: description.unwrap_or_default(),
                complexity,
                priority: priority.unwrap_or_default(),
            };
            add_task(session, output, input)
        }
        TaskCommands::List {
            states,
            min_depth,
            max_depth,
            min_complexity,
            max_complexity,
        } => {
            let filter = TaskFilter {
                states,
                ..TaskFilter::new()
            }
            .with_depth(min_depth, max_depth)
            .with_complexity(min_complexity, max_complexity);
            let tasks = session.manager.list_tasks(&filter)?;
            output.tasks("Tasks", "No tasks match", &tasks);
            Ok(())
        }
        TaskCommands::Show { id } => show_task(session, output, &id),
        TaskCommands::Update {
            id,
            title,
            description,
            complexity,
            priority,
        } => {
            let update = TaskUpdate {
                title,
                description,
                priority,
                complexity,
            };
            if update.is_empty() {
                bail!("Nothing to update. Pass at least one of --title, --description, --complexity, --priority.");
            }
            let task = session.manager.update_task(&id, update, &session.actor)?;
            if output.is_json() {
                output.data(&task);
            } else {
                output.success(&format!("Updated task: {}", task.id));
            }
            Ok(())
        }
        TaskCommands::State { id, state } => set_state(session, output, &id, state),
        TaskCommands::Start { id } => set_state(session, output, &id, TaskState::InProgress),
        TaskCommands::Done { id } => set_state(session, output, &id, TaskState::Completed),
        TaskCommands::Delete {
            id,
            cascade,
            dry_run,
        } => {
            let report =
                session
                    .manager
                    .delete_task(&id, DeleteOptions { cascade, dry_run }, &session.actor)?;
            print_deletion(output, &report);
            Ok(())
        }
        TaskCommands::Children { id } => {
            let children = session.manager.children(&id)?;
            output.tasks(&format!("Children of {}", id), "No children", &children);
            Ok(())
        }
        TaskCommands::Tree { id } => tree(session, output, id.as_ref()),
    }
}

pub fn run_dep(cmd: DepCommands, session: &Session, output: &Output) -> Result<()> {
    match cmd {
        DepCommands::Add { task, depends_on } => {
            let added = session
                .manager
                .add_dependency(&task, &depends_on, &session.actor)?;
            if output.is_json() {
                output.data(&serde_json::json!({
                    "task": task,
                    "depends_on": depends_on,
                    "added": added,
                }));
            } else if added {
                output.success(&format!("{} now depends on {}", task, depends_on));
            } else {
                output.success(&format!("{} already depends on {}", task, depends_on));
            }
        }
        DepCommands::Remove { task, depends_on } => {
            let removed = session
                .manager
                .remove_dependency(&task, &depends_on, &session.actor)?;
            if output.is_json() {
                output.data(&serde_json::json!({
                    "task": task,
                    "depends_on": depends_on,
                    "removed": removed,
                }));
            } else if removed {
                output.success(&format!("{} no longer depends on {}", task, depends_on));
            } else {
                output.success(&format!("{} did not depend on {}", task, depends_on));
            }
        }
        DepCommands::List { task } => {
            let dependencies = session.manager.dependencies_of(&task)?;
            let dependents = session.manager.dependents_of(&task)?;
            if output.is_json() {
                output.data(&serde_json::json!({
                    "task": task,
                    "dependencies": dependencies,
                    "dependents": dependents,
                }));
            } else {
                output.tasks("Depends on", "Depends on nothing", &dependencies);
                println!();
                output.tasks("Needed by", "Nothing depends on it", &dependents);
            }
        }
    }
    Ok(())
}

fn add_task(session: &Session, output: &Output, input: NewTask) -> Result<()> {
    let task = session.manager.create_task(input, &session.actor)?;

    if output.is_json() {
        output.data(&task);
    } else {
        output.success(&format!("Created task: {} - {}", task.id, task.title));
    }
    Ok(())
}

fn show_task(session: &Session, output: &Output, id: &TaskId) -> Result<()> {
    let task = session.manager.get_task(id)?;
    if output.is_json() {
        output.data(&task);
        return Ok(());
    }

    output.task(&task);
    if !task.dependencies.is_empty() {
        let ready = session.manager.is_ready(id)?;
        println!("  Ready:      {}", if ready { "yes" } else { "no" });
    }
    let ancestors = session.manager.ancestors(id)?;
    if !ancestors.is_empty() {
        let path: Vec<_> = ancestors.iter().rev().map(|t| t.title.as_str()).collect();
        println!();
        println!("Path: {}", path.join(" > "));
    }
    let children = session.manager.children(id)?;
    if !children.is_empty() {
        println!();
        println!("Subtasks:");
        for child in &children {
            println!("  {} [{}] {}", child.id, child.state, child.title);
        }
    }
    Ok(())
}

fn set_state(session: &Session, output: &Output, id: &TaskId, state: TaskState) -> Result<()> {
    let TransitionReport {
        task,
        from,
        warnings,
    } = session.manager.set_task_state(id, state, &session.actor)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "task": task,
            "from": from,
            "warnings": warnings,
        }));
        return Ok(());
    }

    for warning in &warnings {
        output.warning(warning);
    }
    if from == task.state {
        output.success(&format!("{} is already {}", task.id, task.state));
    } else {
        output.success(&format!("{}: {} -> {}", task.id, from, task.state));
    }
    Ok(())
}

fn tree(session: &Session, output: &Output, root: Option<&TaskId>) -> Result<()> {
    let (roots, tasks) = match root {
        Some(id) => {
            let task = session.manager.get_task(id)?;
            let mut tasks = session.manager.descendants(id)?;
            tasks.push(task.clone());
            (vec![task], tasks)
        }
        None => (
            session.manager.root_tasks()?,
            session.manager.list_tasks(&TaskFilter::new())?,
        ),
    };

    let mut children: HashMap<TaskId, Vec<&Task>> = HashMap::new();
    for task in &tasks {
        if let Some(parent) = &task.parent_id {
            children.entry(parent.clone()).or_default().push(task);
        }
    }
    for siblings in children.values_mut() {
        siblings.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    }

    if output.is_json() {
        let nodes: Vec<_> = roots.iter().map(|t| tree_json(t, &children)).collect();
        output.data(&nodes);
        return Ok(());
    }

    if roots.is_empty() {
        println!("No tasks");
        return Ok(());
    }
    for task in &roots {
        print_tree(task, &children, 0);
    }
    Ok(())
}

fn tree_json(task: &Task, children: &HashMap<TaskId, Vec<&Task>>) -> serde_json::Value {
    let kids: Vec<_> = children
        .get(&task.id)
        .map(|kids| kids.iter().map(|k| tree_json(k, children)).collect())
        .unwrap_or_default();
    serde_json::json!({
        "id": task.id,
        "title": task.title,
        "state": task.state,
        "depth": task.depth,
        "children": kids,
    })
}

fn print_tree(task: &Task, children: &HashMap<TaskId, Vec<&Task>>, indent: usize) {
    println!(
        "{}{} [{}] {}",
        "  ".repeat(indent),
        task.id,
        task.state,
        task.title
    );
    if let Some(kids) = children.get(&task.id) {
        for kid in kids {
            print_tree(kid, children, indent + 1);
        }
    }
}
