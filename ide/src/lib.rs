//! Client for the compiler's long-lived analysis server.
//!
//! The server speaks newline-delimited JSON over stdio: one command line in,
//! one response line out, strictly one request in flight. [`IdeClient`] owns
//! the server process across cache generations, connects with bounded retry,
//! and turns `rebuild` responses into rendered diagnostic text.

pub mod codec;
pub mod retry;

pub(crate) mod protocol;
pub(crate) mod server;

mod client;

pub use client::{Connection, IdeClient, Rebuilt, ServerState};
pub use retry::{BoxFuture, RetryOutcome, RetryPolicy, retry};

use kiln_process::ProcessError;

/// Error types for analysis server communication.
#[derive(Debug, thiserror::Error)]
pub enum IdeError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("encoding request: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("malformed response line {line:?}: {source}")]
    Decode {
        line: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("response is not JSON: {line:?}")]
    NotJson { line: String },
    #[error("malformed diagnostics in rebuild response: {0}")]
    Diagnostics(#[source] serde_json::Error),
    #[error("analysis server reported an error: {line}")]
    Stderr { line: String },
    #[error("analysis server exited (code {code:?})")]
    Exited { code: Option<i32> },
    #[error("load returned {result_type:?}")]
    LoadFailed { result_type: String },
    #[error("analysis server is not connected")]
    NotConnected,
}

impl IdeError {
    /// Whether the server misbehaved on the wire, as opposed to never
    /// starting or going away.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. } | Self::NotJson { .. } | Self::Diagnostics(_) | Self::Stderr { .. }
        )
    }
}
