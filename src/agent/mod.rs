//! Agent invocation: launch the external agent process for one iteration and
//! capture its combined output while it runs.
//!
//! One [`AgentHandle`] is alive at a time. Output lands in an [`OutputBuffer`]
//! incrementally so the TUI and the completion detector can read it before
//! the process exits. `interrupt` is a one-way request; the handle's `wait`
//! still resolves, reporting `Killed` once the process is actually gone.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::{PrdloopError, Result};

/// Append-only output buffer shared between the process reader (single
/// writer) and any number of observers.
///
/// Bytes are never mutated after being appended, so observers just snapshot;
/// the lock is held only for the copy.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    inner: Arc<Mutex<String>>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Called only by the process output reader.
    pub fn append(&self, chunk: &str) {
        self.lock().push_str(chunk);
    }

    /// Copy of the full buffer contents so far.
    pub fn snapshot(&self) -> String {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, String> {
        // A poisoned buffer still holds valid (append-only) text.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// How the external agent is invoked.
#[derive(Debug, Clone)]
pub struct AgentCommand {
    /// Binary name or path
    pub program: String,
    /// Fixed arguments; the instructional payload is appended last
    pub args: Vec<String>,
}

impl Default for AgentCommand {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: vec![
                "--permission-mode".to_string(),
                "bypassPermissions".to_string(),
                "-p".to_string(),
            ],
        }
    }
}

/// How one agent invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentExit {
    /// Exit status zero
    Succeeded,
    /// Non-zero exit status (code, when the OS reports one)
    Failed(Option<i32>),
    /// Terminated by an operator interrupt
    Killed,
}

/// Handle to one running agent invocation.
#[derive(Debug)]
pub struct AgentHandle {
    output: OutputBuffer,
    kill: Arc<Notify>,
    supervisor: JoinHandle<std::io::Result<(ExitStatus, bool)>>,
    readers: Vec<JoinHandle<()>>,
}

impl AgentHandle {
    /// The live output buffer. Cloning is cheap; all clones view the same
    /// growing text.
    pub fn output(&self) -> OutputBuffer {
        self.output.clone()
    }

    /// Request termination. Idempotent; a no-op once the process has exited.
    pub fn interrupt(&self) {
        self.kill.notify_one();
    }

    /// Whether the process has exited (output may still be draining).
    pub fn is_finished(&self) -> bool {
        self.supervisor.is_finished()
    }

    /// Wait for the process to exit and the output readers to drain.
    pub async fn wait(self) -> Result<AgentExit> {
        let (status, interrupted) = self
            .supervisor
            .await
            .map_err(|e| PrdloopError::Agent(e.to_string()))??;
        for reader in self.readers {
            let _ = reader.await;
        }

        Ok(if interrupted {
            AgentExit::Killed
        } else if status.success() {
            AgentExit::Succeeded
        } else {
            AgentExit::Failed(status.code())
        })
    }
}

/// Seam for launching agent iterations; the loop controller only sees this.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Start one agent invocation with the given payload, non-blocking.
    async fn spawn(&self, payload: &str, cwd: &Path) -> Result<AgentHandle>;
}

/// The real invoker: runs the configured command as a child process.
pub struct ProcessInvoker {
    command: AgentCommand,
}

impl ProcessInvoker {
    pub fn new(command: AgentCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Invoker for ProcessInvoker {
    async fn spawn(&self, payload: &str, cwd: &Path) -> Result<AgentHandle> {
        debug!("Spawning agent '{}' in {}", self.command.program, cwd.display());

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(payload)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PrdloopError::Launch {
                program: self.command.program.clone(),
                source,
            })?;

        let output = OutputBuffer::new();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, output.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, output.clone()));
        }

        let kill = Arc::new(Notify::new());
        let supervisor = tokio::spawn(supervise(child, kill.clone()));

        Ok(AgentHandle {
            output,
            kill,
            supervisor,
            readers,
        })
    }
}

/// Own the child until it exits, forwarding at most one kill request.
/// Returns the exit status and whether the kill path was taken.
async fn supervise(mut child: Child, kill: Arc<Notify>) -> std::io::Result<(ExitStatus, bool)> {
    let mut interrupted = false;
    loop {
        tokio::select! {
            status = child.wait() => return Ok((status?, interrupted)),
            _ = kill.notified(), if !interrupted => {
                interrupted = true;
                if let Err(e) = child.start_kill() {
                    // Process already gone; wait() will report its real status.
                    warn!("Kill signal failed: {}", e);
                }
            }
        }
    }
}

/// Stream lines from one pipe into the shared buffer.
fn spawn_reader<R>(pipe: R, buffer: OutputBuffer) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            buffer.append(&line);
            buffer.append("\n");
        }
    })
}
