//! Remote executor trait

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::ExecutionOutcome;

/// Runs shell commands against a single, fixed host
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a command to completion
    async fn run(&self, cmd: &str) -> Result<ExecutionOutcome, ExecError>;

    /// Run a command, giving up after `timeout`
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<ExecutionOutcome, ExecError>;

    /// Release any held session. Safe to call more than once.
    async fn disconnect(&self) -> Result<(), ExecError> {
        Ok(())
    }

    /// Whether a session is currently held
    fn is_connected(&self) -> bool {
        false
    }

    /// Short name for logs
    fn executor_type(&self) -> &'static str;
}
