//! Per-host pipeline: probe → execute → gather evidence → classify

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use tracing::{debug, info, instrument, warn};

use fleetpatch_exec::{ExecError, ExecutionOutcome, RemoteExecutor};

use crate::classify::{Evidence, check_transport, classify};
use crate::config::{PatchConfig, WorkflowConfig};
use crate::probe::Prober;
use crate::types::{HostResult, HostStatus};

/// Creates an executor bound to a single host
///
/// Allows injection of SSH, local, or mock executors.
#[async_trait]
pub trait ExecutorFactory: Send + Sync {
    /// # Errors
    /// Returns `ExecError` if no executor can be built for `host`.
    async fn create_executor(&self, host: &str) -> Result<Arc<dyn RemoteExecutor>, ExecError>;
}

/// Work done for one host inside a group run. Must never fail: every outcome
/// is expressed as a `HostResult`.
#[async_trait]
pub trait HostTask: Send + Sync + 'static {
    async fn run(&self, host: &str) -> HostResult;
}

/// Run the workflow script once. Transport errors become a sentinel outcome
/// instead of an error.
pub async fn execute(
    host: &str,
    executor: &dyn RemoteExecutor,
    script: &str,
    timeout: Duration,
) -> ExecutionOutcome {
    match executor.run_with_timeout(script, timeout).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(host = %host, error = %e, "workflow transport failure");
            ExecutionOutcome::from_transport_error(host, &e)
        }
    }
}

/// Quote for POSIX `sh`
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Today's date as the change log writes it. An invalid format falls back
/// to `%b %d` rather than aborting the host.
fn change_log_day(format: &str) -> String {
    let now = Local::now();
    let mut day = String::new();
    if write!(day, "{}", now.format(format)).is_err() {
        warn!(format, "invalid change log date format");
        day.clear();
        let _ = write!(day, "{}", now.format("%b %d"));
    }
    day
}

/// Production [`HostTask`]
pub struct HostPipeline {
    factory: Arc<dyn ExecutorFactory>,
    prober: Prober,
    workflow: WorkflowConfig,
    command_timeout: Duration,
    query_timeout: Duration,
}

impl HostPipeline {
    pub fn new(factory: Arc<dyn ExecutorFactory>, config: &PatchConfig) -> Self {
        Self {
            factory,
            prober: Prober::new(config.probe),
            workflow: config.workflow.clone(),
            command_timeout: config.command_timeout(),
            query_timeout: config.query_timeout(),
        }
    }

    async fn read_file(&self, executor: &dyn RemoteExecutor, path: &str) -> Option<String> {
        let cmd = format!("cat -- {}", shell_quote(path));
        match executor.run_with_timeout(&cmd, self.query_timeout).await {
            Ok(outcome) if outcome.success() => Some(outcome.stdout),
            Ok(outcome) => {
                debug!(path, status = outcome.exit_code, "snapshot not readable");
                None
            }
            Err(e) => {
                debug!(path, error = %e, "snapshot query failed");
                None
            }
        }
    }

    async fn read_change_log(&self, executor: &dyn RemoteExecutor, day: &str) -> Option<String> {
        let cmd = format!(
            "grep -F -- {} {}",
            shell_quote(day),
            shell_quote(&self.workflow.change_log)
        );
        match executor.run_with_timeout(&cmd, self.query_timeout).await {
            Ok(outcome) if outcome.success() => Some(outcome.stdout),
            // grep exits 1 when the log exists but has nothing for today
            Ok(outcome) if outcome.exit_code == 1 => Some(String::new()),
            Ok(outcome) => {
                debug!(status = outcome.exit_code, "change log not readable");
                None
            }
            Err(e) => {
                debug!(error = %e, "change log query failed");
                None
            }
        }
    }

    /// Fetch follow-up evidence. Each query degrades to `None` on its own.
    pub async fn gather_evidence(&self, executor: &dyn RemoteExecutor, day: &str) -> Evidence {
        Evidence {
            before: self.read_file(executor, &self.workflow.before_snapshot).await,
            after: self.read_file(executor, &self.workflow.after_snapshot).await,
            change_log: self.read_change_log(executor, day).await,
        }
    }

    /// Pipeline against an already-built executor
    pub async fn run_with(&self, host: &str, executor: &dyn RemoteExecutor) -> HostResult {
        if let Err(failure) = self.prober.probe_detailed(host, executor).await {
            return HostResult::failed(host, failure);
        }

        let outcome = execute(host, executor, &self.workflow.script, self.command_timeout).await;
        debug!(host = %host, stdout = %outcome.stdout, stderr = %outcome.stderr, "workflow output");

        if let Err(failure) = check_transport(&outcome) {
            warn!(host = %host, error = %failure, "workflow failed");
            return HostResult::failed(host, failure);
        }

        let day = change_log_day(&self.workflow.change_log_date_format);
        let evidence = self.gather_evidence(executor, &day).await;

        let result = classify(host, &outcome, &evidence);
        info!(
            host = %host,
            status = %result.status,
            updated = result.updated_count,
            installed = result.installed_count,
            removed = result.removed_count,
            "host classified"
        );
        result
    }
}

#[async_trait]
impl HostTask for HostPipeline {
    #[instrument(skip(self))]
    async fn run(&self, host: &str) -> HostResult {
        let executor = match self.factory.create_executor(host).await {
            Ok(executor) => executor,
            Err(e) => {
                warn!(host = %host, error = %e, "cannot build executor");
                return HostResult::status_only(
                    host,
                    HostStatus::OtherFailure(format!("executor setup failed: {e}")),
                );
            }
        };

        let result = self.run_with(host, executor.as_ref()).await;

        // the workflow usually schedules a reboot, so a dead session here is expected
        if let Err(e) = executor.disconnect().await {
            debug!(host = %host, error = %e, "disconnect failed");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::config::RetryPolicy;

    /// Answers commands by prefix; records everything it was asked to run
    struct ScriptedExecutor {
        responses: Vec<(&'static str, Result<ExecutionOutcome, ExecError>)>,
        seen: Mutex<Vec<String>>,
    }

    fn ok(stdout: &str) -> Result<ExecutionOutcome, ExecError> {
        exit(0, stdout, "")
    }

    fn exit(code: i32, stdout: &str, stderr: &str) -> Result<ExecutionOutcome, ExecError> {
        Ok(ExecutionOutcome {
            exit_code: code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration: Duration::from_millis(5),
        })
    }

    #[async_trait]
    impl RemoteExecutor for ScriptedExecutor {
        async fn run(&self, cmd: &str) -> Result<ExecutionOutcome, ExecError> {
            self.seen.lock().unwrap().push(cmd.to_string());
            self.responses
                .iter()
                .find(|(prefix, _)| cmd.starts_with(prefix))
                .map_or_else(|| exit(127, "", "command not found"), |(_, r)| r.clone())
        }

        async fn run_with_timeout(
            &self,
            cmd: &str,
            _timeout: Duration,
        ) -> Result<ExecutionOutcome, ExecError> {
            self.run(cmd).await
        }

        fn executor_type(&self) -> &'static str {
            "scripted"
        }
    }

    /// Answers the reachability check, then sits on the workflow until the
    /// caller's timeout fires
    struct StalledWorkflowExecutor;

    #[async_trait]
    impl RemoteExecutor for StalledWorkflowExecutor {
        async fn run(&self, cmd: &str) -> Result<ExecutionOutcome, ExecError> {
            if cmd == "echo 1" {
                return ok("1\n");
            }
            std::future::pending().await
        }

        async fn run_with_timeout(
            &self,
            cmd: &str,
            timeout: Duration,
        ) -> Result<ExecutionOutcome, ExecError> {
            tokio::time::timeout(timeout, self.run(cmd))
                .await
                .unwrap_or(Err(ExecError::Timeout { timeout }))
        }

        fn executor_type(&self) -> &'static str {
            "stalled"
        }
    }

    struct MapFactory(HashMap<&'static str, Arc<ScriptedExecutor>>);

    #[async_trait]
    impl ExecutorFactory for MapFactory {
        async fn create_executor(&self, host: &str) -> Result<Arc<dyn RemoteExecutor>, ExecError> {
            self.0
                .get(host)
                .cloned()
                .map(|e| e as Arc<dyn RemoteExecutor>)
                .ok_or_else(|| ExecError::SshKeyError("no key for host".to_string()))
        }
    }

    fn config() -> PatchConfig {
        PatchConfig {
            probe: RetryPolicy::new(1, Duration::ZERO),
            workflow: WorkflowConfig {
                script: "patch-now".to_string(),
                ..WorkflowConfig::default()
            },
            ..PatchConfig::default()
        }
    }

    fn pipeline(hosts: Vec<(&'static str, Arc<ScriptedExecutor>)>) -> HostPipeline {
        HostPipeline::new(Arc::new(MapFactory(hosts.into_iter().collect())), &config())
    }

    #[tokio::test]
    async fn test_successful_host_reads_change_log() {
        let executor = Arc::new(ScriptedExecutor {
            responses: vec![
                ("echo 1", ok("1\n")),
                ("patch-now", ok("Complete!\n")),
                ("cat", exit(1, "", "No such file or directory")),
                ("grep", ok("Oct 15 Updated: openssl\nOct 15 Installed: tmux\n")),
            ],
            seen: Mutex::new(Vec::new()),
        });
        let pipeline = pipeline(vec![("app01", executor.clone())]);

        let result = pipeline.run("app01").await;

        assert_eq!(result.status, HostStatus::Successful);
        assert_eq!(result.updated_count, 1);
        assert_eq!(result.installed_count, 1);
        let seen = executor.seen.lock().unwrap();
        assert!(seen.iter().any(|c| c.starts_with("grep -F -- ")));
    }

    #[tokio::test]
    async fn test_failed_workflow_skips_evidence() {
        let executor = Arc::new(ScriptedExecutor {
            responses: vec![
                ("echo 1", ok("1\n")),
                ("patch-now", exit(1, "", "Error: rpmdb open failed")),
            ],
            seen: Mutex::new(Vec::new()),
        });
        let pipeline = pipeline(vec![("app02", executor.clone())]);

        let result = pipeline.run("app02").await;

        assert_eq!(
            result.status,
            HostStatus::OtherFailure("Error: rpmdb open failed".to_string())
        );
        assert_eq!(executor.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_workflow_past_command_timeout_is_other_failure() {
        let config = PatchConfig {
            command_timeout_secs: 30,
            ..config()
        };
        let pipeline = HostPipeline::new(Arc::new(MapFactory(HashMap::new())), &config);

        let start = tokio::time::Instant::now();
        let result = pipeline.run_with("app09", &StalledWorkflowExecutor).await;

        assert!(matches!(
            result.status,
            HostStatus::OtherFailure(ref d) if d.contains("timed out")
        ));
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_transport_failure_during_workflow() {
        let executor = Arc::new(ScriptedExecutor {
            responses: vec![
                ("echo 1", ok("1\n")),
                (
                    "patch-now",
                    Err(ExecError::AuthenticationFailed("session revoked".to_string())),
                ),
            ],
            seen: Mutex::new(Vec::new()),
        });
        let pipeline = pipeline(vec![("app03", executor)]);

        assert_eq!(pipeline.run("app03").await.status, HostStatus::AuthFailed);
    }

    #[tokio::test]
    async fn test_unreachable_probe_maps_to_connection_failed() {
        let executor = Arc::new(ScriptedExecutor {
            responses: vec![(
                "echo 1",
                Err(ExecError::ConnectionFailed("no route to host".to_string())),
            )],
            seen: Mutex::new(Vec::new()),
        });
        let pipeline = pipeline(vec![("app04", executor)]);

        assert_eq!(
            pipeline.run("app04").await.status,
            HostStatus::ConnectionFailed
        );
    }

    #[tokio::test]
    async fn test_factory_error_becomes_other_failure() {
        let pipeline = pipeline(Vec::new());
        let result = pipeline.run("unknown").await;
        assert!(matches!(result.status, HostStatus::OtherFailure(ref d) if d.contains("no key")));
    }

    #[tokio::test]
    async fn test_grep_without_matches_is_empty_log() {
        let executor = ScriptedExecutor {
            responses: vec![
                ("cat", ok("bash-5.1\n")),
                ("grep", exit(1, "", "")),
            ],
            seen: Mutex::new(Vec::new()),
        };
        let pipeline = pipeline(Vec::new());

        let evidence = pipeline.gather_evidence(&executor, "Oct 15").await;

        assert_eq!(evidence.change_log.as_deref(), Some(""));
        assert_eq!(evidence.before.as_deref(), Some("bash-5.1\n"));
    }

    #[test]
    fn test_change_log_day_falls_back_on_bad_format() {
        let day = change_log_day("%Q");
        assert_eq!(day, Local::now().format("%b %d").to_string());
        assert_eq!(change_log_day("%Y").len(), 4);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("Oct 15"), "'Oct 15'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
