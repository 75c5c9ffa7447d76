//! Task lifecycle state machine
//!
//! A transition is checked in two layers:
//!
//! 1. The [`TransitionTable`], an explicit allow-list of `(from, to)` pairs.
//!    Self-transitions are always allowed. Nothing leaves `pending-deletion`.
//! 2. An ordered list of [`TransitionRule`]s that may veto or annotate an
//!    allowed transition. Each rule carries a [`RuleSeverity`] that decides
//!    whether it fails hard or degrades to a warning under the active
//!    [`ValidationMode`].
//!
//! The deletion orchestrator moves tasks into and out of `pending-deletion`
//! without going through this module.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use super::task::{Task, TaskState};

/// How supplementary rule violations are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Any rule violation except advisories is a hard failure
    #[default]
    Strict,
    /// Policy rules degrade to warnings; integrity rules still fail
    Lenient,
}

/// Tunables for the transition validator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionPolicy {
    pub mode: ValidationMode,

    /// Complexity at or above which a task must be broken down before starting
    pub breakdown_threshold: u8,

    /// Adds `pending -> completed` to the allow-list, leaving it to the
    /// direct-completion rule
    pub allow_direct_completion: bool,
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        Self {
            mode: ValidationMode::Strict,
            breakdown_threshold: 8,
            allow_direct_completion: false,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("transition from {from} to {to} is not allowed{}", hint_suffix(.hint))]
    NotAllowed {
        from: TaskState,
        to: TaskState,
        hint: Option<&'static str>,
    },

    #[error("transition from {from} to {to} rejected ({rule}): {message}")]
    Rejected {
        rule: &'static str,
        from: TaskState,
        to: TaskState,
        message: String,
    },
}

fn hint_suffix(hint: &Option<&'static str>) -> String {
    hint.map(|h| format!(": {h}")).unwrap_or_default()
}

/// Allow-list of state transitions
#[derive(Debug, Clone)]
pub struct TransitionTable {
    allowed: HashSet<(TaskState, TaskState)>,
}

impl TransitionTable {
    /// The standard lifecycle
    pub fn standard() -> Self {
        use TaskState::*;

        let pairs = [
            (Pending, InProgress),
            (Pending, Blocked),
            (Pending, Cancelled),
            (Pending, PendingDeletion),
            (InProgress, Completed),
            (InProgress, Blocked),
            (InProgress, Cancelled),
            (InProgress, PendingDeletion),
            (Completed, PendingDeletion),
            (Blocked, Pending),
            (Blocked, InProgress),
            (Blocked, Cancelled),
            (Blocked, PendingDeletion),
            (Cancelled, Pending),
            (Cancelled, PendingDeletion),
        ];

        Self {
            allowed: pairs.into_iter().collect(),
        }
    }

    /// Adds a pair to the allow-list. Pairs leaving `pending-deletion` are ignored.
    pub fn allow(mut self, from: TaskState, to: TaskState) -> Self {
        if from != TaskState::PendingDeletion {
            self.allowed.insert((from, to));
        }
        self
    }

    pub fn permits(&self, from: TaskState, to: TaskState) -> bool {
        if from == TaskState::PendingDeletion {
            return to == TaskState::PendingDeletion;
        }
        from == to || self.allowed.contains(&(from, to))
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// How a rule violation is surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSeverity {
    /// Hard failure in every mode
    Integrity,
    /// Hard failure in strict mode, warning in lenient mode
    Policy,
    /// Always a warning
    Advisory,
}

/// Everything a rule may look at
#[derive(Debug, Clone, Copy)]
pub struct TransitionRequest<'a> {
    pub task: &'a Task,
    pub target: TaskState,
    pub has_children: bool,
}

/// A named predicate over a transition request
pub struct TransitionRule {
    pub name: &'static str,
    pub severity: RuleSeverity,
    check: fn(&TransitionRequest<'_>, &TransitionPolicy) -> Option<String>,
}

impl TransitionRule {
    /// Returns the violation message, if the rule fires
    pub fn evaluate(&self, request: &TransitionRequest<'_>, policy: &TransitionPolicy) -> Option<String> {
        (self.check)(request, policy)
    }
}

impl std::fmt::Debug for TransitionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionRule")
            .field("name", &self.name)
            .field("severity", &self.severity)
            .finish()
    }
}

fn direct_completion(req: &TransitionRequest<'_>, _: &TransitionPolicy) -> Option<String> {
    (req.task.state == TaskState::Pending && req.target == TaskState::Completed)
        .then(|| "task was never started; move it to in-progress first".to_string())
}

fn blocked_without_dependencies(req: &TransitionRequest<'_>, _: &TransitionPolicy) -> Option<String> {
    (req.target == TaskState::Blocked && req.task.dependencies.is_empty())
        .then(|| "task has no dependencies to be blocked on".to_string())
}

fn start_needs_breakdown(req: &TransitionRequest<'_>, policy: &TransitionPolicy) -> Option<String> {
    let complexity = req.task.complexity.value();
    (req.task.state == TaskState::Pending
        && req.target == TaskState::InProgress
        && complexity >= policy.breakdown_threshold
        && !req.has_children)
        .then(|| {
            format!(
                "complexity {complexity} is at or above {}; break it into subtasks before starting",
                policy.breakdown_threshold
            )
        })
}

fn complex_completion(req: &TransitionRequest<'_>, policy: &TransitionPolicy) -> Option<String> {
    let complexity = req.task.complexity.value();
    (req.target == TaskState::Completed && complexity >= policy.breakdown_threshold).then(|| {
        format!("completing a task of complexity {complexity}; double-check it is really done")
    })
}

/// The supplementary rules, in evaluation order
pub fn standard_rules() -> Vec<TransitionRule> {
    vec![
        TransitionRule {
            name: "direct-completion",
            severity: RuleSeverity::Policy,
            check: direct_completion,
        },
        TransitionRule {
            name: "blocked-without-dependencies",
            severity: RuleSeverity::Integrity,
            check: blocked_without_dependencies,
        },
        TransitionRule {
            name: "needs-breakdown",
            severity: RuleSeverity::Integrity,
            check: start_needs_breakdown,
        },
        TransitionRule {
            name: "complex-completion",
            severity: RuleSeverity::Advisory,
            check: complex_completion,
        },
    ]
}

/// Validates task state transitions against the table and rules
#[derive(Debug)]
pub struct StateValidator {
    table: TransitionTable,
    rules: Vec<TransitionRule>,
    policy: TransitionPolicy,
}

impl StateValidator {
    pub fn new(policy: TransitionPolicy) -> Self {
        let mut table = TransitionTable::standard();
        if policy.allow_direct_completion {
            table = table.allow(TaskState::Pending, TaskState::Completed);
        }
        Self {
            table,
            rules: standard_rules(),
            policy,
        }
    }

    /// Checks a transition, returning any warnings on success
    pub fn validate(&self, request: &TransitionRequest<'_>) -> Result<Vec<String>, TransitionError> {
        let from = request.task.state;
        let to = request.target;

        if from == to {
            return Ok(Vec::new());
        }

        if !self.table.permits(from, to) {
            return Err(TransitionError::NotAllowed {
                from,
                to,
                hint: not_allowed_hint(from, to),
            });
        }

        let mut warnings = Vec::new();
        for rule in &self.rules {
            let Some(message) = rule.evaluate(request, &self.policy) else {
                continue;
            };

            let hard = match rule.severity {
                RuleSeverity::Integrity => true,
                RuleSeverity::Policy => self.policy.mode == ValidationMode::Strict,
                RuleSeverity::Advisory => false,
            };

            if hard {
                return Err(TransitionError::Rejected {
                    rule: rule.name,
                    from,
                    to,
                    message,
                });
            }
            warnings.push(message);
        }

        Ok(warnings)
    }
}

impl Default for StateValidator {
    fn default() -> Self {
        Self::new(TransitionPolicy::default())
    }
}

fn not_allowed_hint(from: TaskState, to: TaskState) -> Option<&'static str> {
    match (from, to) {
        (TaskState::PendingDeletion, _) => {
            Some("task is pending deletion; confirm the delete to remove it")
        }
        (TaskState::Completed, _) => Some("completed tasks cannot be reopened"),
        (TaskState::Pending, TaskState::Completed) => Some("start the task first (in-progress)"),
        _ => None,
    }
}
