//! Output formatting for CLI commands

use serde::Serialize;

use crate::domain::Task;
use crate::storage;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl From<storage::OutputFormat> for OutputFormat {
    fn from(format: storage::OutputFormat) -> Self {
        match format {
            storage::OutputFormat::Text => OutputFormat::Text,
            storage::OutputFormat::Json => OutputFormat::Json,
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Prints a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Text => println!("{}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "success": true,
                        "message": message
                    })
                );
            }
        }
    }

    /// Prints a warning (stderr in text mode, ignored in JSON mode)
    pub fn warning(&self, message: &str) {
        if self.format == OutputFormat::Text {
            eprintln!("Warning: {}", message);
        }
    }

    /// Prints structured data
    pub fn data<T: Serialize>(&self, data: &T) {
        match self.format {
            OutputFormat::Text => {
                if let Ok(json) = serde_json::to_string_pretty(data) {
                    println!("{}", json);
                }
            }
            OutputFormat::Json => {
                if let Ok(json) = serde_json::to_string(data) {
                    println!("{}", json);
                }
            }
        }
    }

    /// Prints a list of tasks as a table, or as a JSON array
    pub fn tasks(&self, heading: &str, empty: &str, tasks: &[Task]) {
        if self.is_json() {
            self.data(&tasks);
            return;
        }

        if tasks.is_empty() {
            println!("{}", empty);
            return;
        }

        println!("{} ({}):", heading, tasks.len());
        println!(
            "{:<12} {:<16} {:<8} {:>3} {:>5}  TITLE",
            "ID", "STATE", "PRIORITY", "CX", "DEPTH"
        );
        println!("{}", "-".repeat(72));
        for task in tasks {
            println!(
                "{:<12} {:<16} {:<8} {:>3} {:>5}  {}",
                task.id, task.state, task.priority, task.complexity, task.depth, task.title
            );
        }
    }

    /// Prints a single task in detail
    pub fn task(&self, task: &Task) {
        if self.is_json() {
            self.data(task);
            return;
        }

        println!("{}: {}", task.id, task.title);
        println!("  State:      {}", task.state);
        println!("  Priority:   {}", task.priority);
        println!("  Complexity: {}", task.complexity);
        println!("  Depth:      {}", task.depth);
        if let Some(parent) = &task.parent_id {
            println!("  Parent:     {}", parent);
        }
        if !task.dependencies.is_empty() {
            let deps: Vec<_> = task.dependencies.iter().map(ToString::to_string).collect();
            println!("  Depends on: {}", deps.join(", "));
        }
        println!("  Created:    {} by {}", task.created_at.to_rfc3339(), task.created_by);
        println!("  Updated:    {} by {}", task.updated_at.to_rfc3339(), task.updated_by);
        if !task.description.is_empty() {
            println!();
            println!("{}", task.description);
        }
    }

    /// Returns true if using JSON format
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}
