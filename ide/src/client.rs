//! Analysis server lifecycle: connect with retry, rebuild, escalate, teardown.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_config::IdeConfig;
use kiln_process::ProcessRunner;
use kiln_types::{Diagnostic, RenderOptions, Severity, render_diagnostic, render_message_only};

use crate::IdeError;
use crate::protocol::{self, WireDiagnostic};
use crate::retry::{BoxFuture, RetryOutcome, RetryPolicy, retry};
use crate::server::IdeServer;

/// Lifecycle of the server process.
#[derive(Debug, Default)]
pub enum ServerState {
    #[default]
    Absent,
    /// Started, project not loaded yet.
    Connecting(IdeServer),
    Ready(IdeServer),
}

impl ServerState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Connecting(_) => "connecting",
            Self::Ready(_) => "ready",
        }
    }
}

/// Result of [`IdeClient::connect`]. Exhaustion is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    Ready,
    Unavailable { attempts: u32, reason: String },
}

/// Settled rebuild with rendered diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rebuilt {
    Succeeded { warnings: Vec<String> },
    Failed { errors: Vec<String> },
}

/// Owns the analysis server process and speaks to it one request at a time.
pub struct IdeClient {
    runner: Arc<dyn ProcessRunner>,
    config: IdeConfig,
    policy: RetryPolicy,
    /// Directory the server reads compiled output from.
    output_dir: PathBuf,
    /// Relative diagnostic filenames resolve against this.
    root: PathBuf,
    colors: bool,
    state: ServerState,
}

impl std::fmt::Debug for IdeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdeClient")
            .field("command", &self.config.command)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl IdeClient {
    #[must_use]
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        config: IdeConfig,
        root: PathBuf,
        output_dir: PathBuf,
        colors: bool,
    ) -> Self {
        Self {
            policy: RetryPolicy::from_config(&config),
            runner,
            config,
            output_dir,
            root,
            colors,
            state: ServerState::Absent,
        }
    }

    #[must_use]
    pub fn state(&self) -> &ServerState {
        &self.state
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.state, ServerState::Ready(_))
    }

    /// Make sure a loaded session exists, retrying per the policy.
    ///
    /// Returns immediately when a session is already ready.
    pub async fn connect(&mut self) -> Connection {
        if self.is_ready() {
            return Connection::Ready;
        }

        match retry(self.policy, self, Self::attempt_connect).await {
            RetryOutcome::Success(()) => {
                tracing::info!("analysis server ready");
                Connection::Ready
            }
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                tracing::warn!(
                    attempts,
                    "analysis server unavailable, incremental rebuilds disabled: {last_error}"
                );
                Connection::Unavailable {
                    attempts,
                    reason: last_error.to_string(),
                }
            }
        }
    }

    /// One connection attempt: start the server if needed, then `load`.
    fn attempt_connect(&mut self, attempt: u32) -> BoxFuture<'_, Result<(), IdeError>> {
        Box::pin(async move {
            tracing::debug!(attempt, state = self.state.name(), "connecting to analysis server");
            let mut server = match std::mem::take(&mut self.state) {
                ServerState::Ready(server) => {
                    self.state = ServerState::Ready(server);
                    return Ok(());
                }
                ServerState::Connecting(server) if !server.has_exited() => server,
                ServerState::Connecting(_) | ServerState::Absent => {
                    IdeServer::start(self.runner.as_ref(), &self.config, &self.output_dir).await?
                }
            };

            match load(&mut server).await {
                Ok(()) => {
                    self.state = ServerState::Ready(server);
                    Ok(())
                }
                Err(e) => {
                    if !server.has_exited() {
                        self.state = ServerState::Connecting(server);
                    }
                    Err(e)
                }
            }
        })
    }

    /// Re-send `load` on the current session so the server picks up fresh
    /// compiler output.
    pub async fn resync(&mut self) -> Result<(), IdeError> {
        let server = match &mut self.state {
            ServerState::Ready(server) | ServerState::Connecting(server) => server,
            ServerState::Absent => return Err(IdeError::NotConnected),
        };
        let result = load(server).await;
        self.settle(result.is_ok());
        result
    }

    /// Incrementally rebuild `file`.
    ///
    /// When the server rejects the file because it does not know an imported
    /// module, its project state is stale: `escalate` runs a full compile and
    /// the session is reloaded. The rebuild then succeeds only if the reload
    /// does.
    pub async fn rebuild<F, Fut, E>(&mut self, file: &Path, escalate: F) -> Result<Rebuilt, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: From<IdeError>,
    {
        let ServerState::Ready(server) = &mut self.state else {
            return Err(IdeError::NotConnected.into());
        };

        tracing::info!(file = %file.display(), "rebuilding");
        let response = match server.request(&protocol::rebuild_command(file)).await {
            Ok(response) => response,
            Err(e) => {
                self.settle(false);
                return Err(e.into());
            }
        };

        let success = response.is_success();
        if !response.result.is_array() {
            return Ok(if success {
                Rebuilt::Succeeded {
                    warnings: Vec::new(),
                }
            } else {
                Rebuilt::Failed {
                    errors: vec![response.result_text()],
                }
            });
        }

        let severity = if success {
            Severity::Warning
        } else {
            Severity::Error
        };
        let entries: Vec<WireDiagnostic> =
            serde_json::from_value(response.result).map_err(IdeError::Diagnostics)?;
        let diagnostics: Vec<Diagnostic> = entries
            .into_iter()
            .map(|entry| entry.into_diagnostic(severity, &self.root))
            .collect();

        if !success && diagnostics.iter().any(Diagnostic::is_unknown_module) {
            tracing::info!(
                file = %file.display(),
                "analysis server is missing a module, escalating to full compile"
            );
            escalate().await?;
            self.resync().await?;
            return Ok(Rebuilt::Succeeded {
                warnings: Vec::new(),
            });
        }

        let rendered = render_all(&diagnostics, &self.root, self.colors).await;
        Ok(if success {
            Rebuilt::Succeeded { warnings: rendered }
        } else {
            Rebuilt::Failed { errors: rendered }
        })
    }

    /// Keep a live server, forget a dead one.
    fn settle(&mut self, loaded: bool) {
        self.state = match std::mem::take(&mut self.state) {
            ServerState::Ready(server) | ServerState::Connecting(server)
                if server.has_exited() =>
            {
                tracing::warn!("analysis server exited");
                ServerState::Absent
            }
            ServerState::Ready(server) | ServerState::Connecting(server) => {
                if loaded {
                    ServerState::Ready(server)
                } else {
                    ServerState::Connecting(server)
                }
            }
            ServerState::Absent => ServerState::Absent,
        };
    }

    /// Terminate the server, if any. The next [`connect`](Self::connect)
    /// starts a fresh one.
    pub async fn shutdown(&mut self) {
        match std::mem::take(&mut self.state) {
            ServerState::Ready(server) | ServerState::Connecting(server) => {
                server.shutdown().await;
            }
            ServerState::Absent => {}
        }
    }
}

/// Render each diagnostic against its file, or message-only when the file
/// cannot be read.
async fn render_all(diagnostics: &[Diagnostic], root: &Path, colors: bool) -> Vec<String> {
    let options = RenderOptions { root, colors };
    let total = diagnostics.len();
    let mut rendered = Vec::with_capacity(total);
    for (index, diagnostic) in diagnostics.iter().enumerate() {
        let source = match diagnostic.path() {
            Some(path) => match tokio::fs::read_to_string(path).await {
                Ok(source) => Some(source),
                Err(e) => {
                    tracing::debug!(path = %path.display(), "cannot read diagnostic source: {e}");
                    None
                }
            },
            None => None,
        };
        rendered.push(match source {
            Some(source) => render_diagnostic(&source, diagnostic, index, total, &options),
            None => render_message_only(diagnostic, index, total, &options),
        });
    }
    rendered
}

async fn load(server: &mut IdeServer) -> Result<(), IdeError> {
    let response = server.request(&protocol::load_command()).await?;
    if response.is_success() {
        Ok(())
    } else {
        Err(IdeError::LoadFailed {
            result_type: response.result_type,
        })
    }
}
