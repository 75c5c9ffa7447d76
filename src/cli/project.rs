//! Project CLI commands

use anyhow::{bail, Result};
use clap::Subcommand;

use super::app::Session;
use super::output::Output;
use crate::domain::{Project, ProjectId};
use crate::engine::{DeleteOptions, DeletionPhase, DeletionReport, ProjectUpdate};

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Create a project
    Create {
        /// Project title
        title: String,

        /// Longer description
        #[arg(long, short)]
        description: Option<String>,

        /// Select the new project
        #[arg(long)]
        select: bool,
    },

    /// List all projects
    List,

    /// Show project details
    Show {
        /// Project ID (defaults to the selected project)
        id: Option<ProjectId>,
    },

    /// Change a project's title or description
    Update {
        /// Project ID
        id: ProjectId,

        #[arg(long)]
        title: Option<String>,

        #[arg(long, short)]
        description: Option<String>,
    },

    /// Select the project that task commands operate on
    Select {
        /// Project ID
        id: ProjectId,
    },

    /// Clear the project selection
    Clear,

    /// Show the selected project
    Current,

    /// Mark a project for deletion, or delete a marked project
    ///
    /// The first call marks the project; calling again removes it with all
    /// of its tasks.
    Delete {
        /// Project ID
        id: ProjectId,

        /// Show what would happen without changing anything
        #[arg(long)]
        dry_run: bool,
    },
}

pub fn run(cmd: ProjectCommands, session: &Session, output: &Output) -> Result<()> {
    match cmd {
        ProjectCommands::Create {
            title,
            description,
            select,
        } => create(session, output, &title, description.as_deref(), select),
        ProjectCommands::List => list(session, output),
        ProjectCommands::Show { id } => show(session, output, id),
        ProjectCommands::Update {
            id,
            title,
            description,
        } => update(session, output, &id, ProjectUpdate { title, description }),
        ProjectCommands::Select { id } => {
            let project = session.manager.select_project(&id)?;
            if output.is_json() {
                output.data(&project);
            } else {
                output.success(&format!("Selected project: {} - {}", project.id, project.title));
            }
            Ok(())
        }
        ProjectCommands::Clear => {
            session.manager.clear_selection()?;
            output.success("Cleared project selection");
            Ok(())
        }
        ProjectCommands::Current => current(session, output),
        ProjectCommands::Delete { id, dry_run } => {
            let report = session.manager.delete_project(
                &id,
                DeleteOptions {
                    cascade: true,
                    dry_run,
                },
                &session.actor,
            )?;
            print_deletion(output, &report);
            Ok(())
        }
    }
}

fn create(
    session: &Session,
    output: &Output,
    title: &str,
    description: Option<&str>,
    select: bool,
) -> Result<()> {
    let project = session
        .manager
        .create_project(title, description.unwrap_or_default(), &session.actor)?;
    if select {
        session.manager.select_project(&project.id)?;
    }

    if output.is_json() {
        output.data(&project);
    } else {
        output.success(&format!("Created project: {} - {}", project.id, project.title));
        if select {
            println!("Selected {}", project.id);
        }
    }
    Ok(())
}

fn list(session: &Session, output: &Output) -> Result<()> {
    let projects = session.manager.list_projects()?;
    let selected = session.manager.current_project()?.map(|p| p.id);

    if output.is_json() {
        output.data(&projects);
        return Ok(());
    }

    if projects.is_empty() {
        println!("No projects. Create one with 'tasktree project create <title>'.");
        return Ok(());
    }

    println!("  {:<12} {:<18} TITLE", "ID", "STATE");
    println!("{}", "-".repeat(60));
    for project in &projects {
        let marker = if selected.as_ref() == Some(&project.id) {
            '*'
        } else {
            ' '
        };
        println!(
            "{} {:<12} {:<18} {}",
            marker, project.id, project.state, project.title
        );
    }
    Ok(())
}

fn show(session: &Session, output: &Output, id: Option<ProjectId>) -> Result<()> {
    let project = match id {
        Some(id) => session.manager.get_project(&id)?,
        None => match session.manager.current_project()? {
            Some(project) => project,
            None => bail!("No project selected. Pass a project ID or run 'tasktree project select'."),
        },
    };
    print_project(output, &project);
    Ok(())
}

fn update(session: &Session, output: &Output, id: &ProjectId, update: ProjectUpdate) -> Result<()> {
    if update.title.is_none() && update.description.is_none() {
        bail!("Nothing to update. Pass --title and/or --description.");
    }
    let project = session.manager.update_project(id, update, &session.actor)?;

    if output.is_json() {
        output.data(&project);
    } else {
        output.success(&format!("Updated project: {}", project.id));
    }
    Ok(())
}

fn current(session: &Session, output: &Output) -> Result<()> {
    match session.manager.current_project()? {
        Some(project) => print_project(output, &project),
        None if output.is_json() => output.data(&serde_json::Value::Null),
        None => println!("No project selected"),
    }
    Ok(())
}

fn print_project(output: &Output, project: &Project) {
    if output.is_json() {
        output.data(project);
        return;
    }

    println!("{}: {}", project.id, project.title);
    println!("  State:   {}", project.state);
    println!("  Created: {} by {}", project.created_at.to_rfc3339(), project.created_by);
    println!("  Updated: {} by {}", project.updated_at.to_rfc3339(), project.updated_by);
    if !project.description.is_empty() {
        println!();
        println!("{}", project.description);
    }
}

/// Prints a deletion report for either a project or a task
pub(crate) fn print_deletion(output: &Output, report: &DeletionReport) {
    if output.is_json() {
        output.data(report);
        return;
    }

    let prefix = if report.dry_run { "[dry run] " } else { "" };
    match report.phase {
        DeletionPhase::Marked => {
            output.success(&format!(
                "{prefix}Marked {} for deletion. Run delete again to confirm.",
                report.target
            ));
            if !report.descendants.is_empty() {
                println!("  {} task(s) below it will also be removed", report.descendants.len());
            }
        }
        DeletionPhase::Removed => {
            output.success(&format!(
                "{prefix}Deleted {} ({} record(s))",
                report.target,
                report.removed.len()
            ));
        }
    }

    if !report.dependents.is_empty() {
        let ids: Vec<_> = report.dependents.iter().map(ToString::to_string).collect();
        println!("  Dependents losing this dependency: {}", ids.join(", "));
    }
}
