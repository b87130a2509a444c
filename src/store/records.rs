//! Backlog data model: the PRD document, its open tasks, and the completed log.
//!
//! The external agent owns the semantics of these files; prdloop only moves
//! tasks between them and counts what remains.

use serde::{Deserialize, Serialize};

/// One open unit of backlog work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Short label, e.g. "functional", "bugfix", "refactor"
    pub category: String,
    /// Free-text summary of the work
    pub description: String,
    /// Ordered acceptance criteria; order is meaningful
    pub steps: Vec<String>,
    /// Set by the agent once the task's quality gates pass
    #[serde(default)]
    pub passes: bool,
}

/// A task that has been migrated out of the open backlog.
///
/// Same shape as [`Task`] with `passes` stripped and `completed_at` added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedTask {
    pub category: String,
    pub description: String,
    pub steps: Vec<String>,
    /// Date of migration, `YYYY-MM-DD`
    pub completed_at: String,
}

impl CompletedTask {
    /// Whether this completed entry came from the given open task.
    ///
    /// Keyed on exact content match of category + description + steps, the
    /// duplicate-suppression key for migration.
    pub fn matches(&self, task: &Task) -> bool {
        self.category == task.category && self.description == task.description && self.steps == task.steps
    }
}

impl Task {
    /// Convert into a completed-log entry stamped with the given date.
    pub fn into_completed(self, completed_at: impl Into<String>) -> CompletedTask {
        CompletedTask {
            category: self.category,
            description: self.description,
            steps: self.steps,
            completed_at: completed_at.into(),
        }
    }
}

/// The root PRD document: project name, quality gates, and open tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backlog {
    /// Project identifier, opaque to prdloop
    pub name: String,
    /// Shell commands the agent is instructed to run; never executed here
    pub quality_gates: Vec<String>,
    /// Open tasks only; completed tasks live in the completed log
    pub tasks: Vec<Task>,
}

impl Backlog {
    /// True when there is no open work left.
    pub fn is_exhausted(&self) -> bool {
        self.tasks.is_empty()
    }
}
