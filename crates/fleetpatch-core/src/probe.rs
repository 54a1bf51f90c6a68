//! Connectivity prober: wait out transient unavailability before patching

use tracing::{debug, info, instrument, warn};

use fleetpatch_exec::{ExecError, RemoteExecutor};

use crate::config::RetryPolicy;
use crate::error::HostFailure;

/// Trivial command whose success proves the host accepts sessions
const PROBE_COMMAND: &str = "echo 1";

/// Retries a trivial remote command under a fixed-backoff policy
#[derive(Debug, Clone, Copy)]
pub struct Prober {
    policy: RetryPolicy,
}

impl Prober {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Returns true on the first successful attempt, false once attempts are
    /// exhausted or a non-retryable error is hit.
    pub async fn probe(&self, host: &str, executor: &dyn RemoteExecutor) -> bool {
        self.probe_detailed(host, executor).await.is_ok()
    }

    /// Like [`Prober::probe`] but reports why the host was given up on.
    ///
    /// Authentication and name-resolution failures stop immediately; retrying
    /// them only delays the inevitable.
    ///
    /// # Errors
    /// `AuthRejected`, `HostUnreachable`, or `TransientNetwork` once the
    /// attempt budget is spent.
    #[instrument(skip(self, executor), fields(attempts = self.policy.attempts()))]
    pub async fn probe_detailed(
        &self,
        host: &str,
        executor: &dyn RemoteExecutor,
    ) -> Result<(), HostFailure> {
        let attempts = self.policy.attempts();
        let mut last_error = String::new();

        let attempt_timeout = self.policy.probe_timeout();

        for attempt in 1..=attempts {
            // a session that opens but never answers counts as a failed attempt
            match executor.run_with_timeout(PROBE_COMMAND, attempt_timeout).await {
                Ok(outcome) if outcome.success() => {
                    info!(host = %host, attempt, "host reachable");
                    return Ok(());
                }
                Ok(outcome) => {
                    last_error = format!(
                        "probe exited {}: {}",
                        outcome.exit_code,
                        outcome.stderr.trim()
                    );
                }
                Err(ExecError::AuthenticationFailed(msg)) => {
                    warn!(host = %host, error = %msg, "probe rejected credentials");
                    return Err(HostFailure::AuthRejected(msg));
                }
                Err(ExecError::HostUnreachable(msg)) => {
                    warn!(host = %host, error = %msg, "host does not resolve");
                    return Err(HostFailure::HostUnreachable(msg));
                }
                Err(e) if e.is_retryable() => last_error = e.to_string(),
                Err(e) => {
                    warn!(host = %host, error = %e, "probe failed permanently");
                    return Err(HostFailure::TransientNetwork(e.to_string()));
                }
            }

            warn!(host = %host, attempt, error = %last_error, "probe attempt failed");

            if attempt < attempts {
                debug!(host = %host, delay = ?self.policy.retry_delay(), "waiting before retry");
                tokio::time::sleep(self.policy.retry_delay()).await;
            }
        }

        warn!(host = %host, attempts, "giving up on host");
        Err(HostFailure::TransientNetwork(format!(
            "no connection after {attempts} attempts: {last_error}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use fleetpatch_exec::ExecutionOutcome;

    use super::*;

    /// Fails with the scripted errors in order, then succeeds
    struct FlakyExecutor {
        failures: Mutex<Vec<ExecError>>,
        calls: AtomicU32,
    }

    impl FlakyExecutor {
        fn new(mut failures: Vec<ExecError>) -> Self {
            failures.reverse();
            Self {
                failures: Mutex::new(failures),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl RemoteExecutor for FlakyExecutor {
        async fn run(&self, _cmd: &str) -> Result<ExecutionOutcome, ExecError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.failures.lock().unwrap().pop() {
                Some(e) => Err(e),
                None => Ok(ExecutionOutcome {
                    exit_code: 0,
                    stdout: "1\n".to_string(),
                    stderr: String::new(),
                    duration: Duration::from_millis(1),
                }),
            }
        }

        async fn run_with_timeout(
            &self,
            cmd: &str,
            _timeout: Duration,
        ) -> Result<ExecutionOutcome, ExecError> {
            self.run(cmd).await
        }

        fn executor_type(&self) -> &'static str {
            "flaky"
        }
    }

    /// Accepts the command and never answers
    struct HangingExecutor;

    #[async_trait]
    impl RemoteExecutor for HangingExecutor {
        async fn run(&self, _cmd: &str) -> Result<ExecutionOutcome, ExecError> {
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
            "hanging"
        }
    }

    fn refused() -> ExecError {
        ExecError::ConnectionFailed("connection refused".to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let executor = FlakyExecutor::new(vec![refused(), refused()]);
        let prober = Prober::new(RetryPolicy::new(5, Duration::from_secs(120)));

        let start = tokio::time::Instant::now();
        assert!(prober.probe("app01", &executor).await);

        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(240));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_attempts_without_trailing_sleep() {
        let executor = FlakyExecutor::new(vec![refused(), refused(), refused()]);
        let prober = Prober::new(RetryPolicy::new(3, Duration::from_secs(10)));

        let start = tokio::time::Instant::now();
        let result = prober.probe_detailed("app02", &executor).await;

        assert!(matches!(result, Err(HostFailure::TransientNetwork(_))));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_is_not_retried() {
        let executor = FlakyExecutor::new(vec![ExecError::AuthenticationFailed(
            "publickey".to_string(),
        )]);
        let prober = Prober::new(RetryPolicy::default());

        let result = prober.probe_detailed("app03", &executor).await;

        assert_eq!(result, Err(HostFailure::AuthRejected("publickey".to_string())));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolvable_host_is_not_retried() {
        let executor =
            FlakyExecutor::new(vec![ExecError::HostUnreachable("no such host".to_string())]);
        let prober = Prober::new(RetryPolicy::default());

        assert!(!prober.probe("gone.invalid", &executor).await);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_host_times_out_each_attempt() {
        let policy = RetryPolicy::new(2, Duration::from_secs(1))
            .with_probe_timeout(Duration::from_secs(5));
        let prober = Prober::new(policy);

        let start = tokio::time::Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(30 * 24 * 60 * 60),
            prober.probe_detailed("wedged01", &HangingExecutor),
        )
        .await
        .expect("probe must resolve on its own");

        assert!(matches!(
            result,
            Err(HostFailure::TransientNetwork(ref m)) if m.contains("timed out")
        ));
        // two bounded attempts plus one retry delay
        assert_eq!(start.elapsed(), Duration::from_secs(11));
    }
}
