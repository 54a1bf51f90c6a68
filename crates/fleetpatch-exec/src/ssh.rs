//! SSH command execution using russh crate

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use russh::keys::PrivateKeyWithHashAlg;
use russh::keys::ssh_key::{self, PrivateKey};
use russh::{ChannelMsg, Disconnect, client};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::error::ExecError;
use crate::result::{ConnectionInfo, ExecutionOutcome, MISSING_EXIT_STATUS};
use crate::traits::RemoteExecutor;

/// SSH client handler for russh
#[derive(Debug)]
struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Same trust model as `StrictHostKeyChecking=no`: freshly rebuilt hosts
        // come back with new host keys after patching.
        Ok(true)
    }
}

/// SSH command executor bound to one host
///
/// The session is opened lazily on first use and reused for every later
/// command until `disconnect`.
pub struct SshExecutor {
    conn_info: ConnectionInfo,
    key: Arc<PrivateKey>,
    session: Mutex<Option<client::Handle<SshClientHandler>>>,
}

impl std::fmt::Debug for SshExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshExecutor")
            .field("conn_info", &self.conn_info)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl SshExecutor {
    /// Create a new SSH executor
    #[must_use]
    pub fn new(conn_info: ConnectionInfo, key: Arc<PrivateKey>) -> Self {
        Self {
            conn_info,
            key,
            session: Mutex::new(None),
        }
    }

    /// Get connection info
    #[must_use]
    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.conn_info
    }

    async fn resolve(&self) -> Result<SocketAddr, ExecError> {
        let target = (self.conn_info.host.as_str(), self.conn_info.port);
        let mut addrs = tokio::net::lookup_host(target)
            .await
            .map_err(|e| ExecError::HostUnreachable(e.to_string()))?;
        addrs
            .next()
            .ok_or_else(|| ExecError::HostUnreachable("no addresses returned".to_string()))
    }

    async fn open_session(&self) -> Result<client::Handle<SshClientHandler>, ExecError> {
        let addr = self.resolve().await?;

        let config = Arc::new(client::Config::default());
        let mut session = client::connect(config, addr, SshClientHandler)
            .await
            .map_err(|e| ExecError::ConnectionFailed(e.to_string()))?;

        let hash_alg = session
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        let auth = session
            .authenticate_publickey(
                &self.conn_info.user,
                PrivateKeyWithHashAlg::new(self.key.clone(), hash_alg),
            )
            .await
            .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?;

        if !auth.success() {
            return Err(ExecError::AuthenticationFailed(
                "publickey rejected".to_string(),
            ));
        }

        Ok(session)
    }

    /// Connect and authenticate unless a session is already held
    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn connect(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if session_lock.is_some() {
            return Ok(());
        }

        debug!(
            port = self.conn_info.port,
            user = %self.conn_info.user,
            "connecting to SSH"
        );

        let limit = self.conn_info.connect_timeout;
        let session = timeout(limit, self.open_session())
            .await
            .map_err(|_| ExecError::Timeout { timeout: limit })??;

        info!(host = %self.conn_info.host, "SSH connected and authenticated");

        *session_lock = Some(session);
        Ok(())
    }

    #[instrument(skip(self, cmd), fields(host = %self.conn_info.host))]
    async fn execute_remote(&self, cmd: &str) -> Result<ExecutionOutcome, ExecError> {
        let session_lock = self.session.lock().await;
        let session = session_lock.as_ref().ok_or(ExecError::NotConnected)?;

        let start = Instant::now();

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        channel
            .exec(true, cmd)
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let mut exit_code = MISSING_EXIT_STATUS;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        // ExitStatus may arrive after Eof; drain until the channel closes
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => stdout.extend_from_slice(&data),
                Some(ChannelMsg::ExtendedData { data, ext }) if ext == 1 => {
                    stderr.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    exit_code = exit_status.cast_signed();
                }
                Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }

        let outcome = ExecutionOutcome {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            duration: start.elapsed(),
        };

        debug!(
            status = outcome.exit_code,
            duration = ?outcome.duration,
            "remote command completed"
        );

        Ok(outcome)
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, cmd: &str) -> Result<ExecutionOutcome, ExecError> {
        self.connect().await?;
        self.execute_remote(cmd).await
    }

    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout_duration: Duration,
    ) -> Result<ExecutionOutcome, ExecError> {
        // Connect has its own bound; the command timeout covers execution only
        self.connect().await?;

        match timeout(timeout_duration, self.execute_remote(cmd)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    host = %self.conn_info.host,
                    timeout = ?timeout_duration,
                    "remote command timed out"
                );
                Err(ExecError::Timeout {
                    timeout: timeout_duration,
                })
            }
        }
    }

    async fn disconnect(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if let Some(session) = session_lock.take() {
            session
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            debug!(host = %self.conn_info.host, "SSH disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session
            .try_lock()
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    fn executor_type(&self) -> &'static str {
        "ssh"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires SSH server"]
    async fn test_ssh_probe_against_local_sshd() {
        let key = crate::keys::KeySource::DefaultIdentity.load().unwrap();
        let executor = SshExecutor::new(ConnectionInfo::new("127.0.0.1", "root"), key);
        let outcome = executor.run("echo 1").await.unwrap();
        assert!(outcome.success());
        executor.disconnect().await.unwrap();
    }
}
