//! Compliance reporting for a finished group

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ledger::LedgerState;
use crate::types::{GroupRun, HostResult, HostStatus};

/// Derived view handed to the notifier. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub group_id: String,
    pub host_count: usize,
    pub successful_count: u64,
    pub already_patched_unique_count: u64,
    /// Ledger counter including this group, before any end-of-cycle reset
    pub cumulative_total: u64,
    pub compliance_percent: f64,
}

impl ComplianceReport {
    /// Hosts this group adds to the ledger counter
    #[must_use]
    pub fn success_delta(&self) -> u64 {
        self.successful_count + self.already_patched_unique_count
    }

    #[must_use]
    pub fn subject(&self) -> String {
        format!("Patching status for: {} servers", self.group_id)
    }

    #[must_use]
    pub fn attachment_name(&self) -> String {
        format!("patching_status_{}.json", self.group_id)
    }
}

/// Pure aggregation over a finished run
#[must_use]
pub fn build_report(
    run: &GroupRun,
    ledger_before: &LedgerState,
    fleet_size: u64,
) -> ComplianceReport {
    let successful_count = run
        .results
        .iter()
        .filter(|r| r.status == HostStatus::Successful)
        .count() as u64;

    let already_patched_unique_count = run
        .results
        .iter()
        .filter(|r| r.status == HostStatus::AlreadyPatched)
        .map(|r| r.host.as_str())
        .collect::<HashSet<_>>()
        .len() as u64;

    let cumulative_total = ledger_before
        .cumulative_success_count
        .saturating_add(successful_count + already_patched_unique_count);

    #[allow(clippy::cast_precision_loss)]
    let compliance_percent = if fleet_size == 0 {
        0.0
    } else {
        100.0 * cumulative_total as f64 / fleet_size as f64
    };

    ComplianceReport {
        group_id: run.group_id.clone(),
        host_count: run.hosts.len(),
        successful_count,
        already_patched_unique_count,
        cumulative_total,
        compliance_percent,
    }
}

/// Raw result table serialized for attachment
///
/// # Errors
/// Returns `serde_json::Error` if serialization fails.
pub fn results_attachment(results: &[HostResult]) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec_pretty(results)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::types::PackageCounts;

    fn run(group: &str, results: Vec<HostResult>) -> GroupRun {
        GroupRun {
            group_id: group.to_string(),
            hosts: results.iter().map(|r| r.host.clone()).collect(),
            results,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_mixed_group_counts() {
        let results = vec![
            HostResult::with_counts(
                "h1",
                HostStatus::Successful,
                PackageCounts {
                    updated: 2,
                    ..PackageCounts::default()
                },
            ),
            HostResult::status_only("h2", HostStatus::AuthFailed),
            HostResult::status_only("h3", HostStatus::Unreachable),
        ];
        let report = build_report(&run("batch-01", results), &LedgerState::default(), 621);

        assert_eq!(report.host_count, 3);
        assert_eq!(report.successful_count, 1);
        assert_eq!(report.already_patched_unique_count, 0);
        assert_eq!(report.cumulative_total, 1);
    }

    #[test]
    fn test_already_patched_deduplicated_by_host() {
        let results = vec![
            HostResult::status_only("web01", HostStatus::AlreadyPatched),
            HostResult::status_only("web01", HostStatus::AlreadyPatched),
            HostResult::status_only("web02", HostStatus::AlreadyPatched),
        ];
        let report = build_report(&run("batch-02", results), &LedgerState::default(), 100);

        assert_eq!(report.host_count, 3);
        assert_eq!(report.already_patched_unique_count, 2);
        assert_eq!(report.success_delta(), 2);
    }

    #[test]
    fn test_reaching_fleet_size_is_full_compliance() {
        let before = LedgerState {
            last_completed_group: Some("batch-08".into()),
            cumulative_success_count: 619,
        };
        let results = vec![
            HostResult::status_only("db01", HostStatus::Successful),
            HostResult::status_only("db02", HostStatus::Successful),
        ];
        let report = build_report(&run("batch-09", results), &before, 621);

        assert_eq!(report.cumulative_total, 621);
        assert!((report.compliance_percent - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_fleet_size_does_not_divide() {
        let report = build_report(&run("empty", Vec::new()), &LedgerState::default(), 0);
        assert!(report.compliance_percent.abs() < f64::EPSILON);
    }

    #[test]
    fn test_subject_and_attachment_name() {
        let report = build_report(&run("batch-03", Vec::new()), &LedgerState::default(), 10);
        assert_eq!(report.subject(), "Patching status for: batch-03 servers");
        assert_eq!(report.attachment_name(), "patching_status_batch-03.json");
    }

    #[test]
    fn test_attachment_lists_every_result() {
        let results = vec![
            HostResult::status_only("a", HostStatus::ConnectionFailed),
            HostResult::status_only("b", HostStatus::AlreadyPatched),
        ];
        let bytes = results_attachment(&results).unwrap();
        let parsed: Vec<HostResult> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, results);
    }
}
