//! On-disk persistence for the PRD backlog and the completed-task log.
//!
//! The agent rewrites `prd.json` between iterations; the store re-reads it at
//! each iteration boundary and performs the passes→completed migration. Both
//! files are written temp-then-rename so a crash mid-write never leaves a
//! truncated document behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::records::{Backlog, CompletedTask};
use crate::error::{PrdloopError, Result};

/// Outcome of one migration pass, for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    /// Tasks moved into the completed log this pass
    pub migrated: usize,
    /// Open tasks left in the backlog
    pub remaining: usize,
    /// Total entries in the completed log
    pub completed_total: usize,
}

/// The Task Store: owns the backlog file and its sibling completed log.
#[derive(Debug, Clone)]
pub struct BacklogStore {
    prd_path: PathBuf,
}

impl BacklogStore {
    pub fn new(prd_path: impl Into<PathBuf>) -> Self {
        Self {
            prd_path: prd_path.into(),
        }
    }

    /// Path to the backlog file itself.
    pub fn prd_path(&self) -> &Path {
        &self.prd_path
    }

    /// Path to the completed log, co-located with the backlog.
    pub fn completed_path(&self) -> PathBuf {
        self.sibling("completed.json")
    }

    /// Path to the agent's free-text progress notes, co-located with the
    /// backlog. Opaque to prdloop; only referenced in the payload.
    pub fn progress_path(&self) -> PathBuf {
        self.sibling("progress.txt")
    }

    fn sibling(&self, name: &str) -> PathBuf {
        match self.prd_path.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Load the backlog.
    ///
    /// A missing file is `PrdNotFound`; malformed JSON is `Parse`. Both are
    /// fatal to the run: there is nothing to iterate on.
    pub fn load(&self) -> Result<Backlog> {
        if !self.prd_path.exists() {
            return Err(PrdloopError::PrdNotFound(self.prd_path.clone()));
        }
        let contents = fs::read_to_string(&self.prd_path)?;
        serde_json::from_str(&contents).map_err(|source| PrdloopError::Parse {
            path: self.prd_path.clone(),
            source,
        })
    }

    /// Load the completed log.
    ///
    /// A missing file is the common case on a first run and a malformed one
    /// is not worth dying over; both are treated as an empty log. Any other
    /// read failure is an error: the log is append-only, and rewriting it
    /// from a view we could not read would drop entries.
    pub fn load_completed(&self) -> Result<Vec<CompletedTask>> {
        let path = self.completed_path();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PrdloopError::Io(e)),
        };
        match serde_json::from_str(&contents) {
            Ok(tasks) => Ok(tasks),
            Err(e) => {
                warn!("Ignoring malformed completed log {}: {}", path.display(), e);
                Ok(Vec::new())
            }
        }
    }

    /// Move every task with `passes == true` out of the backlog and into the
    /// completed log, stamped with today's date. Entries already present in
    /// the log (same category + description + steps) are skipped, so running
    /// this twice never duplicates.
    pub fn migrate_completed(&self) -> Result<MigrationReport> {
        let mut backlog = self.load()?;
        let mut completed = self.load_completed()?;

        let today = chrono::Local::now().date_naive().format("%Y-%m-%d").to_string();
        let migrated = migrate(&mut backlog, &mut completed, &today);

        if migrated > 0 {
            // Completed log first: if the second write is lost to a crash, the
            // next migration pass skips the duplicates.
            self.persist(&self.completed_path(), &completed)?;
            self.persist(&self.prd_path, &backlog)?;
            info!("Migrated {} task(s) to {}", migrated, self.completed_path().display());
        }

        Ok(MigrationReport {
            migrated,
            remaining: backlog.tasks.len(),
            completed_total: completed.len(),
        })
    }

    /// True when the on-disk backlog has no open tasks.
    pub fn is_exhausted(&self) -> Result<bool> {
        Ok(self.load()?.is_exhausted())
    }

    fn persist<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let contents = serde_json::to_string_pretty(value)?;
        write_atomic(path, &contents).or_else(|first| {
            warn!("Write to {} failed ({}), retrying once", path.display(), first);
            write_atomic(path, &contents)
        })?;
        Ok(())
    }
}

/// Move passing tasks from `backlog` into `completed`. Returns the number of
/// tasks appended to the log (duplicates are dropped from the backlog but not
/// re-appended).
fn migrate(backlog: &mut Backlog, completed: &mut Vec<CompletedTask>, today: &str) -> usize {
    let mut appended = 0;
    let mut kept = Vec::with_capacity(backlog.tasks.len());

    for task in backlog.tasks.drain(..) {
        if !task.passes {
            kept.push(task);
            continue;
        }
        if completed.iter().any(|done| done.matches(&task)) {
            continue;
        }
        completed.push(task.into_completed(today));
        appended += 1;
    }

    backlog.tasks = kept;
    appended
}

/// Write-temp-then-rename in the target's directory.
fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp = path.with_file_name(format!("{}.tmp", file_name.to_string_lossy()));
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}
