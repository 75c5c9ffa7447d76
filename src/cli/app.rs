//! Main CLI application structure

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{debug, warn, Level};
use tracing_subscriber::EnvFilter;

use super::output::{Output, OutputFormat};
use super::{project, query, task};
use crate::engine::TaskManager;
use crate::storage::{Config, SqliteRepository, Workspace};

const DEFAULT_ACTOR: &str = "unknown";

#[derive(Parser)]
#[command(name = "tasktree")]
#[command(author, version, about = "Hierarchical task graphs with dependencies")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Name recorded in created_by/updated_by
    #[arg(long, global = true, env = "TASKTREE_ACTOR")]
    pub actor: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new tasktree workspace
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Manage projects and the project selection
    #[command(subcommand)]
    Project(project::ProjectCommands),

    /// Manage tasks in the selected project
    #[command(subcommand)]
    Task(task::TaskCommands),

    /// Manage task dependencies
    #[command(subcommand)]
    Dep(task::DepCommands),

    /// Show tasks ready to work on
    Ready,

    /// Show tasks waiting on unfinished dependencies
    Blocked,

    /// Show the single best task to work on next
    Next,

    /// Show complex tasks that should be split into subtasks
    Breakdown,

    /// Show completion counts for the selected project
    Progress,

    /// Show tasks in dependency order
    Order,
}

/// An open workspace plus the engine over its database
///
/// The workspace lock is released when the session is dropped, after the
/// database connection has closed.
pub(crate) struct Session {
    pub manager: TaskManager<SqliteRepository>,
    pub actor: String,
    _workspace: Workspace,
}

impl Session {
    pub fn open(actor: &str) -> Result<Self> {
        let workspace = Workspace::open_current()?;
        let manager = TaskManager::new(
            workspace.open_repository()?,
            workspace.config().engine.clone(),
        );
        debug!(root = %workspace.root().display(), actor, "session opened");

        Ok(Self {
            manager,
            actor: actor.to_string(),
            _workspace: workspace,
        })
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(Level::DEBUG.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::WARN.as_str()))
    };

    // A second init (e.g. from a test harness) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn resolve_format(flag: Option<OutputFormat>) -> OutputFormat {
    if let Some(format) = flag {
        return format;
    }
    match Config::global_only() {
        Ok(config) => config.global.default_format.into(),
        Err(err) => {
            warn!("ignoring global config: {err:#}");
            OutputFormat::default()
        }
    }
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = Output::new(resolve_format(cli.format));
    let actor = cli.actor.as_deref().unwrap_or(DEFAULT_ACTOR);
    debug!(actor, "tasktree starting");

    match cli.command {
        Commands::Init { path } => {
            let workspace = Workspace::init(&path)?;
            debug!(dir = %workspace.dir().display(), "created workspace directory");
            output.success(&format!(
                "Initialized tasktree workspace at {}",
                workspace.root().display()
            ));
        }

        Commands::Project(cmd) => project::run(cmd, &Session::open(actor)?, &output)?,
        Commands::Task(cmd) => task::run(cmd, &Session::open(actor)?, &output)?,
        Commands::Dep(cmd) => task::run_dep(cmd, &Session::open(actor)?, &output)?,

        Commands::Ready => query::ready(&Session::open(actor)?, &output)?,
        Commands::Blocked => query::blocked(&Session::open(actor)?, &output)?,
        Commands::Next => query::next(&Session::open(actor)?, &output)?,
        Commands::Breakdown => query::breakdown(&Session::open(actor)?, &output)?,
        Commands::Progress => query::progress(&Session::open(actor)?, &output)?,
        Commands::Order => query::order(&Session::open(actor)?, &output)?,
    }

    debug!("command completed");
    Ok(())
}
