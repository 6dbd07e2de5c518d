//! Build coordination.
//!
//! Each request for a module is served one of three ways:
//!
//! - **Rebuild**: the generation asked for incremental rebuilds, so the file
//!   goes to the analysis server. An unknown-module response escalates to a
//!   full compile; an unreachable server drops the generation back to the
//!   full-compile path.
//! - **Finished**: this generation's full compile is done; read the output.
//! - **Deferred**: park the request behind the generation's single full
//!   compile, starting it if nobody has yet.
//!
//! ```text
//! Idle ──(first request)──▶ FullCompiling ──(compiler exits)──▶ FullCompiled
//!   ▲                                                               │
//!   └────────────────────────(invalidate)───────────────────────────┘
//! ```
//!
//! Waiters are resolved in arrival order by the compile task. Invalidation
//! swaps in a fresh [`CompilationCache`]; a compile still running for the old
//! generation resolves its own waiters but never writes into the new one.
//!
//! The compiler and bundler write one shared output directory, so they run
//! under a compile lock spanning generations: a new generation's compile
//! waits for the old one to finish. Locks are taken in the order `ide`,
//! `compile`, `cache`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_config::KilnConfig;
use kiln_ide::{Connection, IdeClient, Rebuilt};
use kiln_process::ProcessRunner;
use kiln_types::ModuleRecord;
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::bundle::run_bundler;
use crate::cache::{BundleArtifact, CompilationCache, PendingRequest};
use crate::compiler::run_compiler;
use crate::error::BuildError;
use crate::module_index::{ModuleIndex, module_name};
use crate::output::rewrite_references;

/// Diagnostic text accumulated for the host since the last drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Messages {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl Messages {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty() && self.errors.is_empty()
    }
}

/// Process-wide build state. Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct BuildCoordinator {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for BuildCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildCoordinator")
            .field("root", &self.shared.root)
            .field("output_dir", &self.shared.output_dir)
            .finish_non_exhaustive()
    }
}

struct Shared {
    config: KilnConfig,
    root: PathBuf,
    output_dir: PathBuf,
    artifact: PathBuf,
    runner: Arc<dyn ProcessRunner>,
    cache: Mutex<CompilationCache>,
    /// Outlives cache generations. Never locked while `cache` is held.
    ide: Mutex<IdeClient>,
    /// Held while the compiler or bundler runs, in any generation.
    compile: Mutex<()>,
}

impl BuildCoordinator {
    /// Coordinate builds of the project at `root`. Relative config paths
    /// resolve against it.
    pub fn new(
        config: KilnConfig,
        root: impl Into<PathBuf>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let root = root.into();
        let output_dir = root.join(&config.output);
        let artifact = root.join(&config.bundle.output);
        let ide = IdeClient::new(
            Arc::clone(&runner),
            config.ide.clone(),
            root.clone(),
            output_dir.clone(),
            config.colors,
        );
        Self {
            shared: Arc::new(Shared {
                config,
                root,
                output_dir,
                artifact,
                runner,
                cache: Mutex::new(CompilationCache::new(0, false)),
                ide: Mutex::new(ide),
                compile: Mutex::new(()),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &KilnConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.shared.output_dir
    }

    pub async fn generation(&self) -> u64 {
        self.shared.cache.lock().await.generation
    }

    /// Compiled, reference-rewritten output for the module declared by
    /// `source`, which was read from `path`.
    pub async fn resolve(&self, path: &Path, source: &str) -> Result<String, BuildError> {
        let shared = &self.shared;
        let path = shared.root.join(path);
        let Some(name) = module_name(source) else {
            tracing::warn!(path = %path.display(), "no module declaration");
            return Err(BuildError::ModuleNameMissing { path });
        };
        let module = ModuleRecord::new(name, path, &shared.output_dir);
        tracing::debug!(module = %module.name(), "resolve");

        let rebuild_requested = {
            let mut cache = shared.cache.lock().await;
            cache.record_module(module.name());
            cache.rebuild_requested
        };
        if rebuild_requested && let Some(result) = shared.rebuild(&module).await {
            return result;
        }
        shared.enqueue(module).await
    }

    /// Start a new generation. Nothing compiled, collected, or indexed before
    /// this call is reused; the analysis server is kept.
    pub async fn invalidate(&self) {
        let mut cache = self.shared.cache.lock().await;
        let next = CompilationCache::new(cache.generation + 1, self.shared.config.ide.enabled);
        let previous = std::mem::replace(&mut *cache, next);
        tracing::info!(generation = cache.generation, "invalidated");
        drop(previous);
    }

    /// Drain the warnings and errors collected so far.
    pub async fn take_messages(&self) -> Messages {
        let mut cache = self.shared.cache.lock().await;
        Messages {
            warnings: std::mem::take(&mut cache.warnings),
            errors: std::mem::take(&mut cache.errors),
        }
    }

    /// Stop the analysis server, if one is running.
    pub async fn shutdown(&self) {
        self.shared.ide.lock().await.shutdown().await;
    }
}

impl Shared {
    /// `None` when the analysis server is unavailable and the request should
    /// take the full-compile path instead.
    async fn rebuild(&self, module: &ModuleRecord) -> Option<Result<String, BuildError>> {
        let mut ide = self.ide.lock().await;
        // An earlier request may have given up on the server while this one
        // waited for the lock.
        if !self.cache.lock().await.rebuild_requested {
            return None;
        }
        let connection = ide.connect().await;
        if let Connection::Unavailable { attempts, reason } = connection {
            // Cleared before releasing `ide` so queued requests see it.
            self.cache.lock().await.rebuild_requested = false;
            drop(ide);
            tracing::warn!(
                module = %module.name(),
                attempts,
                "falling back to full compile: {reason}"
            );
            return None;
        }

        let generation = self.cache.lock().await.generation;
        let rebuilt = ide
            .rebuild(module.source_path(), || self.full_compile(generation))
            .await;
        drop(ide);

        Some(match rebuilt {
            Ok(Rebuilt::Succeeded { warnings }) => {
                self.store(generation, warnings, Vec::new()).await;
                self.emit(module).await
            }
            Ok(Rebuilt::Failed { errors }) => {
                let joined = errors.join("\n");
                self.store(generation, Vec::new(), errors).await;
                Err(BuildError::RebuildFailed {
                    module: module.name().to_string(),
                    errors: joined,
                })
            }
            Err(e) => Err(e),
        })
    }

    async fn enqueue(self: &Arc<Self>, module: ModuleRecord) -> Result<String, BuildError> {
        let reply = {
            let mut cache = self.cache.lock().await;
            if cache.compilation_finished {
                drop(cache);
                return self.emit(&module).await;
            }

            let (reply_tx, reply_rx) = oneshot::channel();
            let pending = PendingRequest {
                module,
                reply: reply_tx,
            };
            if let Some(deferred) = &cache.deferred {
                if let Err(mpsc::error::SendError(pending)) = deferred.send(pending) {
                    let _ = pending.reply.send(Err(BuildError::Abandoned));
                }
            } else {
                let (deferred, waiters) = mpsc::unbounded_channel();
                let _ = deferred.send(pending);
                cache.deferred = Some(deferred);
                cache.compilation_started = true;
                tracing::info!(generation = cache.generation, "starting full compile");
                tokio::spawn(Arc::clone(self).run_generation(cache.generation, waiters));
            }
            reply_rx
        };
        reply.await.unwrap_or(Err(BuildError::Abandoned))
    }

    /// The deferred full-compile path of one generation.
    async fn run_generation(
        self: Arc<Self>,
        generation: u64,
        mut waiters: mpsc::UnboundedReceiver<PendingRequest>,
    ) {
        if self.config.ide.enabled {
            // The compile rewrites what the server has loaded.
            self.ide.lock().await.shutdown().await;
        }

        let result = {
            let _compile = self.compile.lock().await;
            let mut result = self.compile_locked(generation).await;
            if result.is_ok() {
                result = self.bundle_once(generation).await;
            }
            result
        };

        {
            let mut cache = self.cache.lock().await;
            if cache.generation == generation {
                cache.compilation_finished = true;
                cache.deferred = None;
            } else {
                tracing::debug!(generation, "generation invalidated during compile");
            }
        }

        match result {
            Ok(()) => {
                while let Some(pending) = waiters.recv().await {
                    let output = self.emit(&pending.module).await;
                    let _ = pending.reply.send(output);
                }
                if self.config.ide.enabled && self.is_current(generation).await {
                    let connection = self.ide.lock().await.connect().await;
                    tracing::debug!(?connection, "warmed analysis server");
                }
            }
            Err(e) => {
                tracing::warn!(generation, "full compile failed");
                let mut first = Some(e);
                while let Some(pending) = waiters.recv().await {
                    let err = first.take().unwrap_or(BuildError::SiblingCompileFailed);
                    let _ = pending.reply.send(Err(err));
                }
            }
        }
    }

    /// Run the compiler and record its diagnostics against `generation`.
    async fn full_compile(&self, generation: u64) -> Result<(), BuildError> {
        let _compile = self.compile.lock().await;
        self.compile_locked(generation).await
    }

    /// [`Shared::full_compile`] for callers already holding the compile lock.
    async fn compile_locked(&self, generation: u64) -> Result<(), BuildError> {
        let output = run_compiler(self.runner.as_ref(), &self.config, &self.output_dir).await?;
        let mut cache = self.cache.lock().await;
        let current = cache.generation == generation;
        if output.success() {
            if current && self.config.warnings && !output.stderr.trim().is_empty() {
                cache.warnings.push(output.stderr);
            }
            Ok(())
        } else {
            if current {
                cache.errors.push(output.stderr.clone());
            }
            Err(BuildError::CompileFailed {
                stderr: output.stderr,
            })
        }
    }

    /// Caller holds the compile lock.
    async fn bundle_once(&self, generation: u64) -> Result<(), BuildError> {
        if !self.config.bundle.enabled {
            return Ok(());
        }
        let modules = {
            let mut cache = self.cache.lock().await;
            if cache.generation != generation || cache.bundle != BundleArtifact::Absent {
                return Ok(());
            }
            cache.bundle = BundleArtifact::InProgress;
            cache.bundle_modules.clone()
        };

        let result = run_bundler(
            self.runner.as_ref(),
            &self.config.bundle,
            &self.output_dir,
            &self.artifact,
            &modules,
        )
        .await;

        let mut cache = self.cache.lock().await;
        if cache.generation == generation {
            match &result {
                Ok(()) => cache.bundle = BundleArtifact::Done,
                Err(e) => {
                    cache.bundle = BundleArtifact::Absent;
                    cache.errors.push(e.to_string());
                }
            }
        }
        result
    }

    async fn store(&self, generation: u64, warnings: Vec<String>, errors: Vec<String>) {
        let mut cache = self.cache.lock().await;
        if cache.generation != generation {
            return;
        }
        if self.config.warnings {
            cache.warnings.extend(warnings);
        }
        cache.errors.extend(errors);
    }

    async fn is_current(&self, generation: u64) -> bool {
        self.cache.lock().await.generation == generation
    }

    /// Read a module's compiled output and rewrite its references.
    async fn emit(&self, module: &ModuleRecord) -> Result<String, BuildError> {
        let path = module.output_path();
        let compiled = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| BuildError::Output {
                path: path.to_path_buf(),
                source,
            })?;
        let index = self.module_index().await?;
        Ok(rewrite_references(
            &compiled,
            module.name(),
            &index,
            &self.output_dir,
        ))
    }

    /// This generation's module index, built on first use.
    async fn module_index(&self) -> Result<Arc<ModuleIndex>, BuildError> {
        let cell = Arc::clone(&self.cache.lock().await.module_index);
        let index = cell
            .get_or_try_init(|| async {
                ModuleIndex::build(
                    self.root.clone(),
                    self.config.src.clone(),
                    self.output_dir.clone(),
                )
                .await
                .map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(index))
    }
}
