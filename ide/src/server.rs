//! Server handle: owns the analysis server process and speaks its protocol.

use std::path::Path;

use kiln_config::IdeConfig;
use kiln_process::{ProcessEvent, ProcessHandle, ProcessRunner};

use crate::IdeError;
use crate::codec::{decode_line, encode_line};
use crate::protocol::Response;

pub struct IdeServer {
    handle: ProcessHandle,
    exited: bool,
}

impl std::fmt::Debug for IdeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdeServer")
            .field("pid", &self.handle.pid())
            .field("exited", &self.exited)
            .finish()
    }
}

impl IdeServer {
    /// Start the server writing into `output_dir`.
    pub async fn start(
        runner: &dyn ProcessRunner,
        config: &IdeConfig,
        output_dir: &Path,
    ) -> Result<Self, IdeError> {
        let mut args = config.args.clone();
        args.push("--output-directory".to_string());
        args.push(output_dir.to_string_lossy().into_owned());

        let handle = runner.spawn(&config.command, &args).await?;
        tracing::info!(
            command = %config.command,
            pid = ?handle.pid(),
            "started analysis server"
        );
        Ok(Self::from_handle(handle))
    }

    pub(crate) fn from_handle(handle: ProcessHandle) -> Self {
        Self {
            handle,
            exited: false,
        }
    }

    /// Whether the process is known to have exited.
    pub fn has_exited(&self) -> bool {
        self.exited
    }

    /// Send one command and wait for its response line.
    ///
    /// Output buffered since the previous request is discarded first. The
    /// next stdout line is the response; a stderr line fails the request.
    pub async fn request(&mut self, command: &serde_json::Value) -> Result<Response, IdeError> {
        self.drain_stale()?;

        let line = encode_line(command)?;
        tracing::debug!(request = %line, "analysis server request");
        self.handle.write_line(&line).await?;

        match self.handle.next_event().await {
            Some(ProcessEvent::Stdout(line)) => {
                let response: Response = decode_line(&line)?;
                tracing::debug!(
                    result_type = %response.result_type,
                    "analysis server response"
                );
                Ok(response)
            }
            Some(ProcessEvent::Stderr(line)) => Err(IdeError::Stderr { line }),
            Some(ProcessEvent::Exited(code)) => {
                self.exited = true;
                Err(IdeError::Exited { code })
            }
            None => {
                self.exited = true;
                Err(IdeError::Exited { code: None })
            }
        }
    }

    fn drain_stale(&mut self) -> Result<(), IdeError> {
        if self.exited {
            return Err(IdeError::Exited { code: None });
        }
        while let Some(event) = self.handle.try_next_event() {
            match event {
                ProcessEvent::Stdout(line) => {
                    tracing::debug!(line = %line, "stale analysis server output");
                }
                ProcessEvent::Stderr(line) => {
                    tracing::debug!(line = %line, "stale analysis server stderr");
                }
                ProcessEvent::Exited(code) => {
                    self.exited = true;
                    return Err(IdeError::Exited { code });
                }
            }
        }
        Ok(())
    }

    /// Terminate the process and wait for it to go away.
    pub async fn shutdown(self) {
        tracing::info!(pid = ?self.handle.pid(), "stopping analysis server");
        self.handle.kill_and_wait().await;
    }
}
