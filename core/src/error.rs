//! Error types for module discovery and build coordination.

use std::path::PathBuf;

use kiln_ide::IdeError;
use kiln_process::ProcessError;

/// Failures while discovering source modules.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("invalid source glob {pattern:?}: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("module discovery task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Failures delivered to a module request.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("{}: no module declaration found", path.display())]
    ModuleNameMissing { path: PathBuf },
    #[error("compilation failed\n{stderr}")]
    CompileFailed { stderr: String },
    /// Delivered to every waiter of a failed compile except the first, which
    /// gets the concrete error.
    #[error("compilation failed (reported on another module)")]
    SiblingCompileFailed,
    #[error("rebuild of {module} failed\n{errors}")]
    RebuildFailed { module: String, errors: String },
    #[error("bundling failed\n{stderr}")]
    BundleFailed { stderr: String },
    #[error("reading compiled output {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("writing bundle {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("compile task ended without a result")]
    Abandoned,
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Ide(#[from] IdeError),
    #[error(transparent)]
    Index(#[from] IndexError),
}
