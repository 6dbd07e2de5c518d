//! Analysis server command and response serde types.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use kiln_types::{Diagnostic, Position, Severity};

pub(crate) fn load_command() -> serde_json::Value {
    serde_json::json!({ "command": "load" })
}

pub(crate) fn rebuild_command(file: &Path) -> serde_json::Value {
    serde_json::json!({
        "command": "rebuild",
        "params": { "file": file.to_string_lossy() }
    })
}

/// `{"resultType": …, "result": …}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Response {
    pub result_type: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.result_type == "success"
    }

    /// Human text of a non-array result.
    pub fn result_text(&self) -> String {
        match &self.result {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => format!("rebuild returned {}", self.result_type),
            other => other.to_string(),
        }
    }
}

/// One entry of an array `result`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireDiagnostic {
    pub error_code: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
    pub message: String,
}

impl WireDiagnostic {
    /// Relative filenames are resolved against `root`.
    pub fn into_diagnostic(self, severity: Severity, root: &Path) -> Diagnostic {
        let path = self.filename.map(|name| {
            let path = PathBuf::from(name);
            if path.is_absolute() {
                path
            } else {
                root.join(path)
            }
        });
        Diagnostic::new(severity, self.error_code, path, self.position, self.message)
    }
}
