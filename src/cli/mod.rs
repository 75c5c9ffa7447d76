//! # Command-Line Interface
//!
//! A thin front-end over [`TaskManager`](crate::engine::TaskManager).
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Workspace setup | `init` |
//! | Project | Projects and selection | `project create`, `project select`, `project delete` |
//! | Task | Work items in the selected project | `task add`, `task start`, `task done`, `task tree` |
//! | Dep | Dependency edges | `dep add`, `dep remove`, `dep list` |
//! | Query | Read-only views | `ready`, `blocked`, `next`, `breakdown`, `progress`, `order` |
//!
//! ## Output Formats
//!
//! All commands support `--format`:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Logging
//!
//! Logs go to stderr. `--verbose` turns on debug output, otherwise
//! `RUST_LOG` applies:
//! ```bash
//! RUST_LOG=tasktree=info tasktree task done t-9d3e5f20
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod output;
mod project;
mod query;
mod task;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
