//! Shared test utilities and fixtures
//!
//! A scratch project on disk plus a fake toolchain that stands in for the
//! compiler, the bundler and the analysis server.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use kiln_config::KilnConfig;
use kiln_core::{BuildCoordinator, BuildError};
use kiln_process::{ProcFut, ProcessError, ProcessEvent, ProcessHandle, ProcessRunner};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{Semaphore, mpsc, oneshot};

pub const SUCCESS: &str = r#"{"resultType":"success","result":[]}"#;

/// Analysis server behavior: request line in, stdout lines out.
pub type IdeScript = dyn Fn(&str) -> Vec<String> + Send + Sync;

// ============================================================================
// Project
// ============================================================================

/// Two-module project: `B` imports `A`.
pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let project = Self { dir };
        project.write("src/A.purs", "module A where\n\na = 1\n");
        project.write("src/B.purs", "module B where\n\nimport A\n\nb = a\n");
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path(rel)).unwrap()
    }

    pub fn coordinator(
        &self,
        config: KilnConfig,
        toolchain: &Arc<FakeToolchain>,
    ) -> BuildCoordinator {
        let runner: Arc<dyn ProcessRunner> = toolchain.clone();
        BuildCoordinator::new(config, self.root(), runner)
    }

    /// Resolve a file of this project the way a host would.
    pub async fn resolve(
        &self,
        coordinator: &BuildCoordinator,
        rel: &str,
    ) -> Result<String, BuildError> {
        let source = self.read(rel);
        coordinator.resolve(Path::new(rel), &source).await
    }

    /// The path-literal `require` a reference to `rel` is rewritten to.
    pub fn require_of(&self, rel: &str) -> String {
        let path = self.path(rel);
        format!(
            "require({})",
            serde_json::to_string(&path.to_string_lossy()).unwrap()
        )
    }
}

/// Config with the analysis server switched on.
pub fn ide_config() -> KilnConfig {
    let mut config = KilnConfig::default();
    config.ide.enabled = true;
    config
}

// ============================================================================
// Fake toolchain
// ============================================================================

/// Runner that dispatches on the first argument: `compile`, `bundle`, or
/// `ide`. Compiles write every known module's output under `--output`.
pub struct FakeToolchain {
    modules: Vec<(String, String)>,
    compile_result: Mutex<(i32, String)>,
    bundle_result: Mutex<(i32, String)>,
    gate: Option<Semaphore>,
    ide: Mutex<Option<Arc<IdeScript>>>,
    compiles: AtomicUsize,
    bundles: AtomicUsize,
    ide_spawns: AtomicUsize,
    ide_kills: Arc<AtomicUsize>,
    calls: Mutex<Vec<Vec<String>>>,
    ide_requests: Arc<Mutex<Vec<String>>>,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self {
            modules: vec![
                ("A".to_string(), "exports.a = 1;\n".to_string()),
                (
                    "B".to_string(),
                    "var A = require(\"../A/index.js\");\nexports.b = A.a;\n".to_string(),
                ),
            ],
            compile_result: Mutex::new((0, String::new())),
            bundle_result: Mutex::new((0, String::new())),
            gate: None,
            ide: Mutex::new(None),
            compiles: AtomicUsize::new(0),
            bundles: AtomicUsize::new(0),
            ide_spawns: AtomicUsize::new(0),
            ide_kills: Arc::default(),
            calls: Mutex::default(),
            ide_requests: Arc::default(),
        }
    }

    /// Compiles block until [`FakeToolchain::release`].
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Serve the analysis server with `script`. Without one, starting it fails.
    pub fn with_ide(
        self,
        script: impl Fn(&str) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.set_ide(script);
        self
    }

    pub fn set_ide(&self, script: impl Fn(&str) -> Vec<String> + Send + Sync + 'static) {
        *self.ide.lock().unwrap() = Some(Arc::new(script));
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn set_compile_result(&self, exit_code: i32, stderr: &str) {
        *self.compile_result.lock().unwrap() = (exit_code, stderr.to_string());
    }

    pub fn set_bundle_result(&self, exit_code: i32, stderr: &str) {
        *self.bundle_result.lock().unwrap() = (exit_code, stderr.to_string());
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    pub fn bundles(&self) -> usize {
        self.bundles.load(Ordering::SeqCst)
    }

    pub fn ide_spawns(&self) -> usize {
        self.ide_spawns.load(Ordering::SeqCst)
    }

    /// Servers stopped by a kill or by dropping their handle.
    pub fn ide_kills(&self) -> usize {
        self.ide_kills.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ide_requests(&self) -> Vec<String> {
        self.ide_requests.lock().unwrap().clone()
    }

    async fn spawn_compile(&self, command: &str, args: &[String]) -> ProcessHandle {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }

        let (exit_code, stderr) = self.compile_result.lock().unwrap().clone();
        if exit_code == 0 {
            let output = PathBuf::from(value_after(args, "--output"));
            for (name, js) in &self.modules {
                let dir = output.join(name);
                std::fs::create_dir_all(&dir).unwrap();
                std::fs::write(dir.join("index.js"), js).unwrap();
            }
        }
        let mut events: Vec<_> = stderr
            .lines()
            .map(|line| ProcessEvent::Stderr(line.to_string()))
            .collect();
        events.push(ProcessEvent::Exited(Some(exit_code)));
        finished(command, events)
    }

    fn spawn_bundle(&self, command: &str, args: &[String]) -> ProcessHandle {
        self.bundles.fetch_add(1, Ordering::SeqCst);
        let artifact = PathBuf::from(value_after(args, "--output"));
        std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        let (exit_code, stderr) = self.bundle_result.lock().unwrap().clone();
        if exit_code == 0 {
            std::fs::write(&artifact, "var PS = {};").unwrap();
        }
        let mut events: Vec<_> = stderr
            .lines()
            .map(|line| ProcessEvent::Stderr(line.to_string()))
            .collect();
        events.push(ProcessEvent::Exited(Some(exit_code)));
        finished(command, events)
    }

    fn spawn_ide(&self, command: &str) -> Result<ProcessHandle, ProcessError> {
        self.ide_spawns.fetch_add(1, Ordering::SeqCst);
        let Some(script) = self.ide.lock().unwrap().clone() else {
            return Err(ProcessError::Spawn {
                command: command.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        };

        let (client, server) = tokio::io::duplex(4096);
        let (tx, rx) = mpsc::channel(64);
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        let requests = Arc::clone(&self.ide_requests);
        let kills = Arc::clone(&self.ide_kills);
        tokio::spawn(async move {
            let mut lines = BufReader::new(server).lines();
            loop {
                tokio::select! {
                    line = lines.next_line() => {
                        let Ok(Some(line)) = line else { break };
                        requests.lock().unwrap().push(line.clone());
                        for out in script(&line) {
                            if tx.send(ProcessEvent::Stdout(out)).await.is_err() {
                                return;
                            }
                        }
                    }
                    _ = &mut kill_rx => {
                        kills.fetch_add(1, Ordering::SeqCst);
                        break;
                    }
                }
            }
            let _ = tx.send(ProcessEvent::Exited(None)).await;
        });
        Ok(ProcessHandle::from_parts(
            command,
            None,
            Some(Box::new(client)),
            rx,
            kill_tx,
        ))
    }
}

impl ProcessRunner for FakeToolchain {
    fn spawn<'a>(&'a self, command: &'a str, args: &'a [String]) -> ProcFut<'a, ProcessHandle> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(args.to_vec());
            match args.first().map(String::as_str) {
                Some("compile") => Ok(self.spawn_compile(command, args).await),
                Some("bundle") => Ok(self.spawn_bundle(command, args)),
                Some("ide") => self.spawn_ide(command),
                _ => Err(ProcessError::Spawn {
                    command: command.to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
                }),
            }
        })
    }
}

fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
    let at = args.iter().position(|a| a == flag).unwrap();
    &args[at + 1]
}

/// A handle for a process that already ran to completion.
fn finished(command: &str, events: Vec<ProcessEvent>) -> ProcessHandle {
    let (tx, rx) = mpsc::channel(events.len().max(1));
    for event in events {
        tx.try_send(event).unwrap();
    }
    let (kill_tx, _) = oneshot::channel();
    ProcessHandle::from_parts(command, None, None, rx, kill_tx)
}

/// Let spawned tasks run until they park.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
