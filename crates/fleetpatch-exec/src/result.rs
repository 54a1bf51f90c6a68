//! Outcome and connection types for remote execution

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExecError;

/// Exit status reported when the transport itself failed (OpenSSH uses 255)
pub const TRANSPORT_FAILURE_STATUS: i32 = 255;

/// Exit status recorded when the remote side never sent one
pub const MISSING_EXIT_STATUS: i32 = -1;

/// Raw outcome of a single remote invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Exit status code (0 for success)
    pub exit_code: i32,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
    /// Time taken to execute
    pub duration: Duration,
}

impl ExecutionOutcome {
    /// Check if command succeeded (exit code 0)
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Sentinel outcome for a transport-level failure.
    ///
    /// stderr mirrors what the OpenSSH client prints for the same condition so
    /// that downstream classification can treat both paths identically.
    #[must_use]
    pub fn from_transport_error(host: &str, error: &ExecError) -> Self {
        let stderr = match error {
            ExecError::AuthenticationFailed(msg) => {
                format!("{host}: Permission denied ({msg})")
            }
            ExecError::HostUnreachable(msg) => {
                format!("ssh: Could not resolve hostname {host}: {msg}")
            }
            other => format!("{host}: {other}"),
        };

        Self {
            exit_code: TRANSPORT_FAILURE_STATUS,
            stdout: String::new(),
            stderr,
            duration: Duration::ZERO,
        }
    }
}

/// Connection information for SSH
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Host address
    pub host: String,
    /// Port (default 22)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username
    pub user: String,
    /// Upper bound on TCP connect plus SSH handshake
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(120)
}

impl ConnectionInfo {
    /// Create new connection info
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            user: user.into(),
            connect_timeout: default_connect_timeout(),
        }
    }

    /// Set custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set connect timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
