//! Executor factory for creating SSH or local executors per host

use std::sync::Arc;

use async_trait::async_trait;
use fleetpatch_core::ExecutorFactory;
use fleetpatch_exec::{
    ConnectionInfo, ExecError, LocalExecutor, PrivateKey, RemoteExecutor, SshExecutor,
};

use crate::config::SshConfig;

/// Default implementation of `ExecutorFactory`
pub struct DefaultExecutorFactory {
    ssh: SshConfig,
    key: Option<Arc<PrivateKey>>,
}

impl DefaultExecutorFactory {
    /// `key` may be `None` when every host is local
    pub fn new(ssh: SshConfig, key: Option<Arc<PrivateKey>>) -> Self {
        Self { ssh, key }
    }

    /// Hosts run through `LocalExecutor` instead of SSH
    pub fn is_local(host: &str) -> bool {
        matches!(host, "localhost" | "127.0.0.1" | "::1")
    }

    fn create_executor_sync(&self, host: &str) -> Result<Arc<dyn RemoteExecutor>, ExecError> {
        // For localhost connections, use LocalExecutor
        if Self::is_local(host) {
            return Ok(Arc::new(LocalExecutor::new()));
        }

        let key = self
            .key
            .clone()
            .ok_or_else(|| ExecError::SshKeyError("no SSH identity loaded".to_string()))?;

        let conn_info = ConnectionInfo::new(host, &self.ssh.user)
            .with_port(self.ssh.port)
            .with_connect_timeout(self.ssh.connect_timeout());
        Ok(Arc::new(SshExecutor::new(conn_info, key)))
    }
}

#[async_trait]
impl ExecutorFactory for DefaultExecutorFactory {
    async fn create_executor(&self, host: &str) -> Result<Arc<dyn RemoteExecutor>, ExecError> {
        self.create_executor_sync(host)
    }
}
