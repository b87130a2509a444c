//! Loop Controller: the state machine that sequences agent iterations.
//!
//! One controller instance drives one run. Each iteration it reloads the
//! backlog (the agent rewrites it on disk), launches one agent invocation,
//! streams output into the session for the TUI, reconciles completed tasks,
//! and decides whether to continue. Control requests from the operator arrive
//! through [`ControlState`]: kill applies promptly while an iteration runs,
//! stop applies only at iteration boundaries.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use log::{info, warn};

use crate::agent::{AgentExit, Invoker, OutputBuffer};
use crate::detect;
use crate::error::Result;
use crate::prompt;
use crate::store::BacklogStore;

/// Terminal state of a run. Fatal errors are not statuses; they propagate as
/// [`crate::error::PrdloopError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Backlog judged complete (sentinel emitted or no open tasks left)
    Completed,
    /// Configured iteration cap reached with work remaining
    CapReached,
    /// Operator queued a stop; applied at an iteration boundary
    OperatorStopped,
    /// Operator killed the running iteration
    Killed,
}

impl RunStatus {
    /// Short operator-facing description, used for the session status line.
    pub fn describe(&self) -> &'static str {
        match self {
            RunStatus::Completed => "Backlog complete",
            RunStatus::CapReached => "Iteration cap reached",
            RunStatus::OperatorStopped => "Stopped by operator",
            RunStatus::Killed => "Killed by operator",
        }
    }
}

/// Status of one iteration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationStatus {
    Running,
    Succeeded,
    Failed,
    Killed,
}

/// One loop pass: 1-based index, its full output, and how it ended.
#[derive(Debug, Clone)]
pub struct IterationRecord {
    pub index: u64,
    pub output: OutputBuffer,
    pub status: IterationStatus,
    /// Whether the completion marker was seen in this iteration's output
    pub saw_marker: bool,
}

/// Operator control flags, written by the TUI and read by the controller.
///
/// Reset at run start, discarded at run end. Kill is checked on every poll of
/// a running iteration; stop only between iterations.
#[derive(Debug, Default)]
pub struct ControlState {
    stop: AtomicBool,
    kill: AtomicBool,
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a stop for the next iteration boundary.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Cancel a queued stop (resume).
    pub fn cancel_stop(&self) {
        self.stop.store(false, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Request immediate termination of the running iteration.
    pub fn request_kill(&self) {
        self.kill.store(true, Ordering::SeqCst);
    }

    pub fn kill_requested(&self) -> bool {
        self.kill.load(Ordering::SeqCst)
    }
}

/// Everything the TUI needs to render a run. Written by the controller,
/// read (briefly, then released) by the render path.
#[derive(Debug)]
pub struct Session {
    pub prd_name: String,
    pub remaining_tasks: usize,
    pub completed_tasks: usize,
    /// 1-based; 0 before the first iteration starts
    pub current_iteration: u64,
    pub status_line: String,
    pub records: Vec<IterationRecord>,
    /// Set exactly once, when the run reaches any terminal state
    pub finished: bool,
}

/// Shared session cell; the controller is the only writer.
pub type SharedSession = Arc<RwLock<Session>>;

impl Session {
    pub fn new_shared(prd_name: impl Into<String>, remaining: usize, completed: usize) -> SharedSession {
        Arc::new(RwLock::new(Session {
            prd_name: prd_name.into(),
            remaining_tasks: remaining,
            completed_tasks: completed,
            current_iteration: 0,
            status_line: "Initialising...".to_string(),
            records: Vec::new(),
            finished: false,
        }))
    }
}

/// Lock helpers that survive a poisoned lock: the session only ever holds
/// last-written values, all of which stay valid.
pub fn read_session(session: &SharedSession) -> RwLockReadGuard<'_, Session> {
    session.read().unwrap_or_else(|e| e.into_inner())
}

pub fn write_session(session: &SharedSession) -> RwLockWriteGuard<'_, Session> {
    session.write().unwrap_or_else(|e| e.into_inner())
}

/// The loop controller for one run.
pub struct LoopController {
    store: BacklogStore,
    invoker: Arc<dyn Invoker>,
    control: Arc<ControlState>,
    session: SharedSession,
    cwd: PathBuf,
    max_iterations: Option<u64>,
    poll_interval: Duration,
}

impl LoopController {
    pub fn new(
        store: BacklogStore,
        invoker: Arc<dyn Invoker>,
        control: Arc<ControlState>,
        session: SharedSession,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            invoker,
            control,
            session,
            cwd: cwd.into(),
            max_iterations: None,
            poll_interval: Duration::from_millis(50),
        }
    }

    /// Cap the number of iterations; unbounded when not set.
    pub fn with_max_iterations(mut self, cap: Option<u64>) -> Self {
        self.max_iterations = cap;
        self
    }

    /// How often a running iteration is polled for kill requests and marker
    /// sightings.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run to a terminal state. Always marks the session finished, including
    /// on fatal errors, so the TUI can wind down.
    pub async fn run(self) -> Result<RunStatus> {
        let result = self.drive().await;

        let mut session = write_session(&self.session);
        session.finished = true;
        session.status_line = match &result {
            Ok(status) => status.describe().to_string(),
            Err(e) => format!("Fatal: {}", e),
        };
        drop(session);

        match &result {
            Ok(status) => info!("Run finished: {}", status.describe()),
            Err(e) => warn!("Run failed: {}", e),
        }
        result
    }

    async fn drive(&self) -> Result<RunStatus> {
        let backlog = self.store.load()?;
        let completed_total = self.store.load_completed()?.len();
        {
            let mut session = write_session(&self.session);
            session.prd_name = backlog.name.clone();
            session.remaining_tasks = backlog.tasks.len();
            session.completed_tasks = completed_total;
        }

        if backlog.is_exhausted() {
            info!("Backlog '{}' has no open tasks; nothing to run", backlog.name);
            return Ok(RunStatus::Completed);
        }

        let payload = prompt::build_payload(self.store.prd_path(), &self.store.progress_path());
        let mut index: u64 = 0;

        loop {
            // Iteration boundary: operator requests queued so far apply here.
            if self.control.kill_requested() {
                return Ok(RunStatus::Killed);
            }
            if self.control.stop_requested() {
                return Ok(RunStatus::OperatorStopped);
            }

            index += 1;

            // The agent rewrites the backlog between iterations; re-read it.
            let backlog = self.store.load()?;
            let completed_total = self.store.load_completed()?.len();
            {
                let mut session = write_session(&self.session);
                session.remaining_tasks = backlog.tasks.len();
                session.completed_tasks = completed_total;
                session.current_iteration = index;
                session.status_line = "Launching agent...".to_string();
            }

            info!("Starting iteration {} ({} open tasks)", index, backlog.tasks.len());
            let handle = self.invoker.spawn(&payload, &self.cwd).await?;
            let output = handle.output();

            {
                let mut session = write_session(&self.session);
                session.records.push(IterationRecord {
                    index,
                    output: output.clone(),
                    status: IterationStatus::Running,
                    saw_marker: false,
                });
                session.status_line = "Waiting for agent...".to_string();
            }

            let mut kill_sent = false;
            let mut marker_seen = false;
            while !handle.is_finished() {
                if self.control.kill_requested() && !kill_sent {
                    kill_sent = true;
                    handle.interrupt();
                    write_session(&self.session).status_line = "Killing agent...".to_string();
                }
                if !marker_seen && detect::contains_marker(&output.snapshot()) {
                    marker_seen = true;
                    let mut session = write_session(&self.session);
                    if let Some(record) = session.records.last_mut() {
                        record.saw_marker = true;
                    }
                    session.status_line = "Completion signalled...".to_string();
                }
                tokio::time::sleep(self.poll_interval).await;
            }

            let status = match handle.wait().await? {
                AgentExit::Succeeded => IterationStatus::Succeeded,
                AgentExit::Failed(code) => {
                    // Recoverable: the agent is expected to self-correct next
                    // iteration.
                    warn!("Iteration {} exited non-zero (code {:?})", index, code);
                    IterationStatus::Failed
                }
                AgentExit::Killed => {
                    // Partial output stays on the record; the run ends here.
                    let mut session = write_session(&self.session);
                    if let Some(record) = session.records.last_mut() {
                        record.status = IterationStatus::Killed;
                    }
                    return Ok(RunStatus::Killed);
                }
            };

            let report = self.store.migrate_completed()?;
            let saw_marker = detect::contains_marker(&output.snapshot());

            {
                let mut session = write_session(&self.session);
                if let Some(record) = session.records.last_mut() {
                    record.status = status;
                    record.saw_marker = saw_marker;
                }
                session.remaining_tasks = report.remaining;
                session.completed_tasks = report.completed_total;
            }

            if saw_marker || report.remaining == 0 {
                return Ok(RunStatus::Completed);
            }
            if let Some(cap) = self.max_iterations {
                if index >= cap {
                    return Ok(RunStatus::CapReached);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_state_defaults() {
        let control = ControlState::new();
        assert!(!control.stop_requested());
        assert!(!control.kill_requested());
    }

    #[test]
    fn test_stop_request_and_cancel() {
        let control = ControlState::new();
        control.request_stop();
        assert!(control.stop_requested());
        control.cancel_stop();
        assert!(!control.stop_requested());
    }

    #[test]
    fn test_kill_request_sticks() {
        let control = ControlState::new();
        control.request_kill();
        assert!(control.kill_requested());
        assert!(control.kill_requested());
    }

    #[test]
    fn test_run_status_descriptions_distinct() {
        let statuses = [
            RunStatus::Completed,
            RunStatus::CapReached,
            RunStatus::OperatorStopped,
            RunStatus::Killed,
        ];
        for a in &statuses {
            for b in &statuses {
                if a != b {
                    assert_ne!(a.describe(), b.describe());
                }
            }
        }
    }

    #[test]
    fn test_session_new_shared() {
        let session = Session::new_shared("demo", 3, 1);
        let guard = read_session(&session);
        assert_eq!(guard.prd_name, "demo");
        assert_eq!(guard.remaining_tasks, 3);
        assert_eq!(guard.completed_tasks, 1);
        assert_eq!(guard.current_iteration, 0);
        assert!(!guard.finished);
        assert!(guard.records.is_empty());
    }

    #[test]
    fn test_iteration_record_shares_buffer() {
        let output = OutputBuffer::new();
        let record = IterationRecord {
            index: 1,
            output: output.clone(),
            status: IterationStatus::Running,
            saw_marker: false,
        };
        output.append("live text");
        assert_eq!(record.output.snapshot(), "live text");
    }
}
