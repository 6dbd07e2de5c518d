//! Subprocess plumbing for external toolchain invocations.
//!
//! Every external program kiln drives (compiler, bundler, analysis server)
//! goes through a [`ProcessRunner`]. A spawned process is observed through a
//! [`ProcessHandle`]: a task per process forwards stdout/stderr lines and a
//! final exit event over a channel, so no caller ever blocks on a pipe.
//!
//! A non-zero exit code is not an error at this layer. A compile that fails
//! with diagnostics still produced useful output; interpretation belongs to
//! the caller.

mod handle;
mod runner;

pub use handle::{ProcessEvent, ProcessHandle, ProcessOutput, Stdin};
pub use runner::SystemRunner;

use std::future::Future;
use std::pin::Pin;

/// Process future type alias.
pub type ProcFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProcessError>> + Send + 'a>>;

/// Spawns external processes.
///
/// Implemented by [`SystemRunner`] for real OS processes; tests substitute
/// scripted runners that build handles with [`ProcessHandle::from_parts`].
pub trait ProcessRunner: Send + Sync {
    /// Start `command` with `args`, returning a handle to its event stream.
    ///
    /// The caller owns the process: dropping the handle kills it.
    fn spawn<'a>(&'a self, command: &'a str, args: &'a [String]) -> ProcFut<'a, ProcessHandle>;

    /// Run `command` to completion and capture its output.
    fn run<'a>(&'a self, command: &'a str, args: &'a [String]) -> ProcFut<'a, ProcessOutput> {
        Box::pin(async move { self.spawn(command, args).await?.wait_with_output().await })
    }
}

/// Error types for process management.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("{command} not found in PATH")]
    NotFound {
        command: String,
        #[source]
        source: which::Error,
    },
    #[error("spawning {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("writing to {command} stdin: {source}")]
    Stdin {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("stdin of {command} is closed")]
    StdinClosed { command: String },
}
