//! Core domain types for kiln.
//!
//! This crate contains pure domain types with no IO and no async: the
//! diagnostic records reported by the compiler toolchain, the per-request
//! module record, and the snippet renderer that turns a diagnostic plus its
//! source text into a caret-annotated excerpt.

mod snippet;

pub use snippet::{Excerpt, RenderOptions, render_diagnostic, render_message_only};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Error codes that mean the analysis server does not know a module the
/// rebuilt file imports. Its persisted project state is stale.
const UNKNOWN_MODULE_CODES: [&str; 2] = ["UnknownModule", "UnknownModuleName"];

// ============================================================================
// Diagnostics
// ============================================================================

/// Severity level for a diagnostic.
///
/// The toolchain does not tag individual entries; severity comes from the
/// response that carried them (`resultType: error` vs `success`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

/// 1-based source span as reported by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl Position {
    #[must_use]
    pub fn new(start_line: usize, start_column: usize, end_line: usize, end_column: usize) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    #[must_use]
    pub fn is_multi_line(&self) -> bool {
        self.end_line > self.start_line
    }
}

/// A single diagnostic from the compiler or the analysis server.
///
/// Fields are private; external consumers read via accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    severity: Severity,
    code: String,
    /// Absent for project-level diagnostics that have no source location.
    path: Option<PathBuf>,
    position: Option<Position>,
    message: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(
        severity: Severity,
        code: String,
        path: Option<PathBuf>,
        position: Option<Position>,
        message: String,
    ) -> Self {
        Self {
            severity,
            code,
            path,
            position,
            message,
        }
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn position(&self) -> Option<Position> {
        self.position
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this diagnostic reports an import the analysis server cannot
    /// resolve, which calls for a full compile rather than a rebuild failure.
    #[must_use]
    pub fn is_unknown_module(&self) -> bool {
        UNKNOWN_MODULE_CODES.contains(&self.code.as_str())
    }
}

// ============================================================================
// Modules
// ============================================================================

/// Identity of one module a caller asked for.
///
/// Created once the caller's source has been parsed for its module
/// declaration; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    name: String,
    source_path: PathBuf,
    source_dir: PathBuf,
    output_path: PathBuf,
}

impl ModuleRecord {
    /// Build a record for `name` declared in `source_path`, whose compiled
    /// output lands at `<output_dir>/<name>/index.js`.
    #[must_use]
    pub fn new(name: impl Into<String>, source_path: PathBuf, output_dir: &Path) -> Self {
        let name = name.into();
        let source_dir = source_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let output_path = output_dir.join(&name).join("index.js");
        Self {
            name,
            source_path,
            source_dir,
            output_path,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    #[must_use]
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}
