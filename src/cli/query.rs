//! Query commands (ready, blocked, next, breakdown, progress, order)
//!
//! All queries run against the selected project.

use anyhow::Result;

use super::app::Session;
use super::output::Output;
use crate::domain::TaskState;

/// Show tasks ready to work on
pub fn ready(session: &Session, output: &Output) -> Result<()> {
    let tasks = session.manager.ready_tasks()?;
    output.tasks("Ready tasks", "No tasks ready to work on.", &tasks);
    Ok(())
}

/// Show blocked tasks
pub fn blocked(session: &Session, output: &Output) -> Result<()> {
    let tasks = session.manager.blocked_tasks()?;
    output.tasks("Blocked tasks", "No blocked tasks.", &tasks);
    Ok(())
}

pub fn next(session: &Session, output: &Output) -> Result<()> {
    match session.manager.next_task()? {
        Some(task) => output.task(&task),
        None if output.is_json() => output.data(&serde_json::Value::Null),
        None => println!("Nothing to work on next."),
    }
    Ok(())
}

pub fn breakdown(session: &Session, output: &Output) -> Result<()> {
    let threshold = session.manager.config().transitions.breakdown_threshold;
    let tasks = session.manager.needs_breakdown()?;
    output.tasks(
        &format!("Tasks with complexity >= {} and no subtasks", threshold),
        "No tasks need breaking down.",
        &tasks,
    );
    Ok(())
}

/// Show completion counts
pub fn progress(session: &Session, output: &Output) -> Result<()> {
    let report = session.manager.progress()?;

    if output.is_json() {
        output.data(&report);
        return Ok(());
    }

    println!(
        "Progress: {:.1}% complete ({} task(s))",
        report.completion_percent, report.total
    );
    println!();
    println!("{:<18} COUNT", "STATE");
    println!("{}", "-".repeat(26));
    for state in TaskState::ALL {
        let count = report.count(state);
        if count > 0 {
            println!("{:<18} {}", state, count);
        }
    }

    if !report.by_depth.is_empty() {
        println!();
        println!("{:<18} COUNT", "DEPTH");
        println!("{}", "-".repeat(26));
        for (depth, count) in &report.by_depth {
            println!("{:<18} {}", depth, count);
        }
    }
    Ok(())
}

/// Show tasks with dependencies before dependents
pub fn order(session: &Session, output: &Output) -> Result<()> {
    let tasks = session.manager.execution_order()?;

    if output.is_json() {
        output.data(&tasks);
        return Ok(());
    }

    if tasks.is_empty() {
        println!("No tasks");
        return Ok(());
    }
    for (position, task) in tasks.iter().enumerate() {
        println!("{:>3}. {} [{}] {}", position + 1, task.id, task.state, task.title);
    }
    Ok(())
}
