//! Error types for fleetpatch-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to a host
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// TCP/SSH connection could not be established
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Host name did not resolve to any address
    #[error("host unreachable: {0}")]
    HostUnreachable(String),

    /// Server rejected our credentials
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Connecting or running the command took longer than allowed
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// SSH key could not be loaded
    #[error("SSH key error: {0}")]
    SshKeyError(String),

    /// Local process could not be spawned
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// I/O error on an established channel
    #[error("I/O error: {0}")]
    IoError(String),

    /// Session was used before `connect`
    #[error("not connected")]
    NotConnected,
}

impl ExecError {
    /// Whether a later attempt against the same host may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExecError::ConnectionFailed(_) | ExecError::Timeout { .. } | ExecError::IoError(_)
        )
    }
}
