//! Handle to a running process and its event stream.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

use crate::ProcessError;

/// Writable standard input of a spawned process.
pub type Stdin = Box<dyn AsyncWrite + Send + Unpin>;

/// Something observable happened to a spawned process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// One line of standard output, without its terminator.
    Stdout(String),
    /// One line of standard error, without its terminator.
    Stderr(String),
    /// The process exited. `None` when it was terminated by a signal.
    ///
    /// Always the last event: every output line is delivered before it.
    Exited(Option<i32>),
}

/// Captured output of a process that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Owner of one spawned process.
///
/// Dropping the handle kills the process (the kill channel closes, which the
/// supervising task treats as a kill request).
pub struct ProcessHandle {
    command: String,
    pid: Option<u32>,
    stdin: Option<Stdin>,
    events: mpsc::Receiver<ProcessEvent>,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("command", &self.command)
            .field("pid", &self.pid)
            .field("stdin_open", &self.stdin.is_some())
            .finish_non_exhaustive()
    }
}

impl ProcessHandle {
    /// Assemble a handle from its channels.
    ///
    /// `events` must end with [`ProcessEvent::Exited`]; `kill_tx` firing or
    /// being dropped must terminate whatever feeds `events`.
    #[must_use]
    pub fn from_parts(
        command: impl Into<String>,
        pid: Option<u32>,
        stdin: Option<Stdin>,
        events: mpsc::Receiver<ProcessEvent>,
        kill_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            command: command.into(),
            pid,
            stdin,
            events,
            kill_tx: Some(kill_tx),
        }
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Write `line` followed by a newline and flush.
    pub async fn write_line(&mut self, line: &str) -> Result<(), ProcessError> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ProcessError::StdinClosed {
                command: self.command.clone(),
            });
        };
        let map_err = |source| ProcessError::Stdin {
            command: self.command.clone(),
            source,
        };
        stdin.write_all(line.as_bytes()).await.map_err(map_err)?;
        stdin.write_all(b"\n").await.map_err(map_err)?;
        stdin.flush().await.map_err(map_err)?;
        Ok(())
    }

    /// Close standard input so the process sees EOF.
    pub fn close_stdin(&mut self) {
        self.stdin = None;
    }

    /// Wait for the next event. `None` once the stream is exhausted.
    pub async fn next_event(&mut self) -> Option<ProcessEvent> {
        self.events.recv().await
    }

    /// Take an already-buffered event without waiting.
    pub fn try_next_event(&mut self) -> Option<ProcessEvent> {
        self.events.try_recv().ok()
    }

    /// Request termination. The stream still ends with an exit event.
    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Kill the process and wait until it has exited.
    pub async fn kill_and_wait(mut self) {
        self.kill();
        while let Some(event) = self.events.recv().await {
            if matches!(event, ProcessEvent::Exited(_)) {
                break;
            }
        }
    }

    /// Close stdin and collect all output until the process exits.
    pub async fn wait_with_output(mut self) -> Result<ProcessOutput, ProcessError> {
        self.close_stdin();
        let mut output = ProcessOutput::default();
        while let Some(event) = self.events.recv().await {
            match event {
                ProcessEvent::Stdout(line) => {
                    output.stdout.push_str(&line);
                    output.stdout.push('\n');
                }
                ProcessEvent::Stderr(line) => {
                    output.stderr.push_str(&line);
                    output.stderr.push('\n');
                }
                ProcessEvent::Exited(code) => {
                    output.exit_code = code;
                    return Ok(output);
                }
            }
        }
        tracing::debug!(command = %self.command, "event stream ended without exit status");
        Ok(output)
    }
}
