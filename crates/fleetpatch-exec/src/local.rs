//! Local command execution using `tokio::process`
//!
//! Used for hosts that name the orchestrator itself (`localhost`) and for
//! exercising the pipeline without an SSH server.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::error::ExecError;
use crate::result::{ExecutionOutcome, MISSING_EXIT_STATUS};
use crate::traits::RemoteExecutor;

/// Local command executor
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    /// Create a new local executor
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn spawn_shell(&self, cmd: &str) -> Result<ExecutionOutcome, ExecError> {
        let start = Instant::now();

        // kill_on_drop so a timed-out command does not outlive its future
        let child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::SpawnError(e.to_string()))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let outcome = ExecutionOutcome {
            exit_code: output.status.code().unwrap_or(MISSING_EXIT_STATUS),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: start.elapsed(),
        };

        debug!(
            status = outcome.exit_code,
            duration = ?outcome.duration,
            "local command completed"
        );

        Ok(outcome)
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    #[instrument(skip(self, cmd), level = "debug")]
    async fn run(&self, cmd: &str) -> Result<ExecutionOutcome, ExecError> {
        self.spawn_shell(cmd).await
    }

    #[instrument(skip(self, cmd), level = "debug")]
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout_duration: Duration,
    ) -> Result<ExecutionOutcome, ExecError> {
        match timeout(timeout_duration, self.spawn_shell(cmd)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?timeout_duration, "local command timed out");
                Err(ExecError::Timeout {
                    timeout: timeout_duration,
                })
            }
        }
    }

    fn executor_type(&self) -> &'static str {
        "local"
    }
}
