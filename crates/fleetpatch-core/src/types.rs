//! Result types produced by a group run

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HostFailure;

/// Classified outcome for one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum HostStatus {
    Successful,
    AlreadyPatched,
    Unreachable,
    AuthFailed,
    ConnectionFailed,
    OtherFailure(String),
}

impl HostStatus {
    /// Host ended up compliant, whether or not this run changed anything
    #[must_use]
    pub fn is_compliant(&self) -> bool {
        matches!(self, HostStatus::Successful | HostStatus::AlreadyPatched)
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostStatus::Successful => f.write_str("Patching Successful"),
            HostStatus::AlreadyPatched => f.write_str("Already Patched"),
            HostStatus::Unreachable => f.write_str("Server not reachable"),
            HostStatus::AuthFailed => f.write_str("Password prompt or permission denied"),
            HostStatus::ConnectionFailed => f.write_str("Connection Failed"),
            HostStatus::OtherFailure(detail) => write!(f, "Failed: {detail}"),
        }
    }
}

impl From<HostFailure> for HostStatus {
    fn from(failure: HostFailure) -> Self {
        match failure {
            HostFailure::TransientNetwork(_) => HostStatus::ConnectionFailed,
            HostFailure::AuthRejected(_) => HostStatus::AuthFailed,
            HostFailure::HostUnreachable(_) => HostStatus::Unreachable,
            HostFailure::RemoteCommandFailed(detail)
            | HostFailure::ClassificationAmbiguous(detail) => HostStatus::OtherFailure(detail),
        }
    }
}

/// Package change counters gathered from a host after patching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageCounts {
    pub updated: u32,
    pub installed: u32,
    pub removed: u32,
}

impl PackageCounts {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updated == 0 && self.installed == 0 && self.removed == 0
    }
}

/// Final, immutable result for one host in one group run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostResult {
    pub host: String,
    pub status: HostStatus,
    pub updated_count: u32,
    pub installed_count: u32,
    pub removed_count: u32,
}

impl HostResult {
    /// Result carrying package counters
    pub fn with_counts(host: impl Into<String>, status: HostStatus, counts: PackageCounts) -> Self {
        Self {
            host: host.into(),
            status,
            updated_count: counts.updated,
            installed_count: counts.installed,
            removed_count: counts.removed,
        }
    }

    /// Result with no package changes attached
    pub fn status_only(host: impl Into<String>, status: HostStatus) -> Self {
        Self::with_counts(host, status, PackageCounts::default())
    }

    /// Convert a host failure into its terminal result
    pub fn failed(host: impl Into<String>, failure: HostFailure) -> Self {
        Self::status_only(host, failure.into())
    }

    #[must_use]
    pub fn counts(&self) -> PackageCounts {
        PackageCounts {
            updated: self.updated_count,
            installed: self.installed_count,
            removed: self.removed_count,
        }
    }
}

/// One fully-resolved pass over a group. Only built after every host task
/// has joined, so it is never partial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRun {
    pub group_id: String,
    pub hosts: Vec<String>,
    pub results: Vec<HostResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_mapping() {
        assert_eq!(
            HostStatus::from(HostFailure::TransientNetwork("timeout".into())),
            HostStatus::ConnectionFailed
        );
        assert_eq!(
            HostStatus::from(HostFailure::AuthRejected("publickey".into())),
            HostStatus::AuthFailed
        );
        assert_eq!(
            HostStatus::from(HostFailure::ClassificationAmbiguous("exit 1".into())),
            HostStatus::OtherFailure("exit 1".into())
        );
    }

    #[test]
    fn test_status_serializes_with_detail() {
        let result = HostResult::status_only("web01", HostStatus::OtherFailure("dnf lock".into()));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"]["kind"], "other_failure");
        assert_eq!(json["status"]["detail"], "dnf lock");
    }

    #[test]
    fn test_compliant_statuses() {
        assert!(HostStatus::Successful.is_compliant());
        assert!(HostStatus::AlreadyPatched.is_compliant());
        assert!(!HostStatus::Unreachable.is_compliant());
    }
}
