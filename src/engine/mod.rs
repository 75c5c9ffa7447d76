//! # Task Graph Engine
//!
//! The components that enforce the task tree's invariants, composed over a
//! [`Repository`](crate::storage::Repository):
//!
//! - [`Hierarchy`]: task creation with depth and fan-out limits, tree traversal
//! - [`Dependencies`]: cycle-checked edges and readiness queries
//! - [`Deletion`]: two-phase mark/confirm deletion
//! - [`Selection`]: the selected-project pointer
//! - [`TaskManager`]: the single API the CLI talks to

mod deletion;
mod dependencies;
mod error;
mod hierarchy;
mod manager;
mod selection;

pub use deletion::{DeleteOptions, Deletion, DeletionPhase, DeletionReport};
pub use dependencies::Dependencies;
pub use error::{EngineError, EngineResult, ErrorKind};
pub use hierarchy::{Hierarchy, NewTask};
pub use manager::{ProjectUpdate, TaskManager, TaskUpdate, TransitionReport};
pub use selection::Selection;
