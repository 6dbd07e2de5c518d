//! Per-generation compilation state.

use std::sync::Arc;

use kiln_types::ModuleRecord;
use tokio::sync::{OnceCell, mpsc, oneshot};

use crate::error::BuildError;
use crate::module_index::ModuleIndex;

/// A request parked until the in-flight full compile settles.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub module: ModuleRecord,
    pub reply: oneshot::Sender<Result<String, BuildError>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BundleArtifact {
    Absent,
    InProgress,
    Done,
}

/// State of one generation. Invalidation replaces the whole value; the
/// analysis server lives outside it and survives.
#[derive(Debug)]
pub(crate) struct CompilationCache {
    pub generation: u64,
    pub rebuild_requested: bool,
    pub compilation_started: bool,
    pub compilation_finished: bool,
    /// Feeds the compile task's waiter queue while a full compile is in
    /// flight. Dropped when the compile finishes, which ends the queue.
    pub deferred: Option<mpsc::UnboundedSender<PendingRequest>>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub bundle: BundleArtifact,
    /// Every module requested this generation, in first-request order.
    pub bundle_modules: Vec<String>,
    pub module_index: Arc<OnceCell<Arc<ModuleIndex>>>,
}

impl CompilationCache {
    pub fn new(generation: u64, rebuild_requested: bool) -> Self {
        Self {
            generation,
            rebuild_requested,
            compilation_started: false,
            compilation_finished: false,
            deferred: None,
            warnings: Vec::new(),
            errors: Vec::new(),
            bundle: BundleArtifact::Absent,
            bundle_modules: Vec::new(),
            module_index: Arc::new(OnceCell::new()),
        }
    }

    pub fn record_module(&mut self, name: &str) {
        if !self.bundle_modules.iter().any(|m| m == name) {
            self.bundle_modules.push(name.to_string());
        }
    }
}
