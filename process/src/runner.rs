//! OS process runner backed by `tokio::process`.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::handle::{ProcessEvent, ProcessHandle, Stdin};
use crate::{ProcFut, ProcessError, ProcessRunner};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Spawns real OS processes, optionally from a fixed working directory.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    cwd: Option<PathBuf>,
}

impl SystemRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every process from `cwd`; relative commands resolve against it.
    #[must_use]
    pub fn with_cwd(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
        }
    }

    fn resolve(&self, command: &str) -> Result<PathBuf, ProcessError> {
        let resolved = match &self.cwd {
            Some(cwd) => which::which_in(command, std::env::var_os("PATH"), cwd),
            None => which::which(command),
        };
        resolved.map_err(|source| ProcessError::NotFound {
            command: command.to_string(),
            source,
        })
    }

    fn spawn_child(&self, command: &str, args: &[String]) -> Result<ProcessHandle, ProcessError> {
        let resolved = self.resolve(command)?;
        let mut cmd = Command::new(&resolved);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            command: command.to_string(),
            source,
        })?;
        let pid = child.id();
        tracing::debug!(command, ?args, ?pid, "spawned process");

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (kill_tx, kill_rx) = oneshot::channel();

        let stdin = child.stdin.take().map(|stdin| Box::new(stdin) as Stdin);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(
                stdout,
                event_tx.clone(),
                ProcessEvent::Stdout,
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(
                stderr,
                event_tx.clone(),
                ProcessEvent::Stderr,
            )));
        }

        tokio::spawn(supervise(
            command.to_string(),
            child,
            readers,
            event_tx,
            kill_rx,
        ));

        Ok(ProcessHandle::from_parts(
            command, pid, stdin, event_rx, kill_tx,
        ))
    }
}

impl ProcessRunner for SystemRunner {
    fn spawn<'a>(&'a self, command: &'a str, args: &'a [String]) -> ProcFut<'a, ProcessHandle> {
        Box::pin(async move { self.spawn_child(command, args) })
    }
}

/// Forward a pipe line by line until EOF. Invalid UTF-8 is replaced rather
/// than ending the stream, so the child never writes into a closed pipe.
async fn forward_lines<R: AsyncRead + Unpin>(
    reader: R,
    event_tx: mpsc::Sender<ProcessEvent>,
    wrap: fn(String) -> ProcessEvent,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if event_tx.send(wrap(lossy_line(&buf))).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!("process pipe read error: {e}");
                break;
            }
        }
    }
}

fn lossy_line(buf: &[u8]) -> String {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Wait for exit (or a kill request), drain the pipes, then report the exit.
async fn supervise(
    command: String,
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    event_tx: mpsc::Sender<ProcessEvent>,
    kill_rx: oneshot::Receiver<()>,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = kill_rx => None,
    };
    let status = match exited {
        Some(status) => status,
        None => {
            tracing::debug!(command = %command, "killing process");
            if let Err(e) = child.start_kill() {
                tracing::debug!(command = %command, "kill failed: {e}");
            }
            child.wait().await
        }
    };

    for reader in readers {
        let _ = reader.await;
    }

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::warn!(command = %command, "waiting for process failed: {e}");
            None
        }
    };
    tracing::debug!(command = %command, ?code, "process exited");
    let _ = event_tx.send(ProcessEvent::Exited(code)).await;
}
