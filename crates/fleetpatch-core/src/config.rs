//! Configuration types for patch campaigns

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_BEFORE_SNAPSHOT: &str = "/tmp/fleetpatch_packages_before";
const DEFAULT_AFTER_SNAPSHOT: &str = "/tmp/fleetpatch_packages_after";

/// Tunables for running a campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchConfig {
    /// Maximum number of hosts patched concurrently within a group
    #[serde(default = "default_worker_limit")]
    pub worker_limit: usize,
    /// Number of hosts that counts as 100% compliance.
    /// Defaults to the number of distinct hosts in the roster.
    #[serde(default)]
    pub fleet_size: Option<u64>,
    /// Upper bound on the workflow script, in seconds
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Upper bound on each follow-up query, in seconds
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    /// Reachability retry policy
    #[serde(default)]
    pub probe: RetryPolicy,
    /// Host-side workflow
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            worker_limit: default_worker_limit(),
            fleet_size: None,
            command_timeout_secs: default_command_timeout_secs(),
            query_timeout_secs: default_query_timeout_secs(),
            probe: RetryPolicy::default(),
            workflow: WorkflowConfig::default(),
        }
    }
}

impl PatchConfig {
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

fn default_worker_limit() -> usize {
    100
}

fn default_command_timeout_secs() -> u64 {
    2 * 60 * 60
}

fn default_query_timeout_secs() -> u64 {
    60
}

/// Fixed-backoff retry policy for the connectivity prober
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Wait between attempts, in seconds
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Upper bound on a single attempt, connect included, in seconds
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl RetryPolicy {
    /// Build a policy from a delay expressed as a `Duration` (whole seconds)
    #[must_use]
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts,
            retry_delay_secs: retry_delay.as_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }

    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout_secs = timeout.as_secs();
        self
    }

    /// Never zero, so an attempt always gets a chance to answer
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// At least one attempt is always made
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

fn default_max_attempts() -> u32 {
    10
}

fn default_retry_delay_secs() -> u64 {
    120
}

fn default_probe_timeout_secs() -> u64 {
    120
}

/// Host-side workflow and the read-only evidence it leaves behind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Opaque script run as a single remote command
    #[serde(default = "default_script")]
    pub script: String,
    /// Package list captured before updating
    #[serde(default = "default_before_snapshot")]
    pub before_snapshot: String,
    /// Package list captured after updating
    #[serde(default = "default_after_snapshot")]
    pub after_snapshot: String,
    /// Package manager history log
    #[serde(default = "default_change_log")]
    pub change_log: String,
    /// `strftime` pattern used to select today's change-log lines
    #[serde(default = "default_change_log_date_format")]
    pub change_log_date_format: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            script: default_script(),
            before_snapshot: default_before_snapshot(),
            after_snapshot: default_after_snapshot(),
            change_log: default_change_log(),
            change_log_date_format: default_change_log_date_format(),
        }
    }
}

// Reboot is deferred by a minute so the follow-up queries still find the host up.
fn default_script() -> String {
    format!(
        "rpm -qa > {DEFAULT_BEFORE_SNAPSHOT}; \
         subscription-manager refresh; \
         dnf update -y && {{ rm -rf /var/cache/yum/; yum clean all; \
         rpm -qa > {DEFAULT_AFTER_SNAPSHOT}; shutdown -r +1; }}"
    )
}

fn default_before_snapshot() -> String {
    DEFAULT_BEFORE_SNAPSHOT.to_string()
}

fn default_after_snapshot() -> String {
    DEFAULT_AFTER_SNAPSHOT.to_string()
}

fn default_change_log() -> String {
    "/var/log/yum.log".to_string()
}

fn default_change_log_date_format() -> String {
    "%b %d".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_script_paths() {
        let workflow = WorkflowConfig::default();
        assert!(workflow.script.contains(&workflow.before_snapshot));
        assert!(workflow.script.contains(&workflow.after_snapshot));
        assert!(!workflow.script.contains("passwd"));
    }

    #[test]
    fn test_retry_policy_never_zero_attempts() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.attempts(), 1);
        assert_eq!(policy.retry_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_default_patch_config() {
        let config = PatchConfig::default();
        assert_eq!(config.worker_limit, 100);
        assert_eq!(config.probe.max_attempts, 10);
        assert_eq!(config.probe.retry_delay(), Duration::from_secs(120));
        assert_eq!(config.probe.probe_timeout(), Duration::from_secs(120));
        assert!(config.fleet_size.is_none());
    }

    #[test]
    fn test_attempt_timeout_never_zero() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1)).with_probe_timeout(Duration::ZERO);
        assert_eq!(policy.probe_timeout(), Duration::from_secs(1));
    }
}
