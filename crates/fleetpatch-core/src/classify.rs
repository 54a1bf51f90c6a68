//! Outcome classifier
//!
//! Maps the raw outcome of the workflow, plus whatever read-only evidence
//! could be fetched afterwards, to a [`HostResult`]. Everything here is pure:
//! the same inputs always produce the same result.

use std::collections::BTreeMap;

use fleetpatch_exec::ExecutionOutcome;

use crate::error::HostFailure;
use crate::types::{HostResult, HostStatus, PackageCounts};

/// stderr fragments meaning our credentials were refused
pub const AUTH_MARKERS: [&str; 1] = ["Permission denied"];

/// stderr fragments meaning the host could not be addressed
pub const UNREACHABLE_MARKERS: [&str; 2] =
    ["Could not resolve hostname", "Name or service not known"];

const UPDATED_TAG: &str = "Updated:";
const INSTALLED_TAG: &str = "Installed:";
const ERASED_TAG: &str = "Erased:";

/// Read-only follow-up data from the host. `None` means it could not be read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evidence {
    /// Package list captured before the update
    pub before: Option<String>,
    /// Package list captured after the update
    pub after: Option<String>,
    /// Today's lines from the package manager history
    pub change_log: Option<String>,
}

/// Classify one host. Rules are checked in order and the first match wins.
#[must_use]
pub fn classify(host: &str, outcome: &ExecutionOutcome, evidence: &Evidence) -> HostResult {
    if let Err(failure) = check_transport(outcome) {
        return HostResult::failed(host, failure);
    }

    let counts = count_changes(evidence);
    let status = if counts.is_empty() {
        HostStatus::AlreadyPatched
    } else {
        HostStatus::Successful
    };

    HostResult::with_counts(host, status, counts)
}

/// Rules 1-3: anything that makes package evidence irrelevant.
///
/// # Errors
/// The failure the outcome represents, if any.
pub fn check_transport(outcome: &ExecutionOutcome) -> Result<(), HostFailure> {
    let stderr = outcome.stderr.trim();

    if AUTH_MARKERS.iter().any(|m| stderr.contains(m)) {
        return Err(HostFailure::AuthRejected(stderr.to_string()));
    }
    if UNREACHABLE_MARKERS.iter().any(|m| stderr.contains(m)) {
        return Err(HostFailure::HostUnreachable(stderr.to_string()));
    }
    if !outcome.success() {
        if stderr.is_empty() {
            return Err(HostFailure::ClassificationAmbiguous(format!(
                "exit status {} with no diagnostic output",
                outcome.exit_code
            )));
        }
        return Err(HostFailure::RemoteCommandFailed(stderr.to_string()));
    }

    Ok(())
}

/// Rule 4 counters. The change log is authoritative; the snapshot diff is
/// only consulted when the log could not be read at all.
#[must_use]
pub fn count_changes(evidence: &Evidence) -> PackageCounts {
    match (&evidence.change_log, &evidence.before, &evidence.after) {
        (Some(log), _, _) => count_log_tags(log),
        (None, Some(before), Some(after)) => diff_snapshots(before, after),
        _ => PackageCounts::default(),
    }
}

/// Count tagged lines in a yum/dnf history excerpt
#[must_use]
pub fn count_log_tags(log: &str) -> PackageCounts {
    let mut counts = PackageCounts::default();

    for line in log.lines() {
        if line.contains(UPDATED_TAG) {
            counts.updated += 1;
        } else if line.contains(INSTALLED_TAG) {
            counts.installed += 1;
        } else if line.contains(ERASED_TAG) {
            counts.removed += 1;
        }
    }

    counts
}

/// Package name used as the join key between snapshots.
///
/// Heuristic: everything before the first `-`. `kernel-core-5.14.0` and
/// `kernel-5.14.0` therefore share the key `kernel`.
#[must_use]
pub fn package_name(entry: &str) -> &str {
    entry.split('-').next().unwrap_or(entry)
}

fn index_snapshot(snapshot: &str) -> BTreeMap<&str, &str> {
    // later entries overwrite earlier ones on a key collision
    snapshot
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| (package_name(line), line))
        .collect()
}

/// Compare before/after package lists keyed by [`package_name`]
#[must_use]
pub fn diff_snapshots(before: &str, after: &str) -> PackageCounts {
    let before = index_snapshot(before);
    let after = index_snapshot(after);
    let mut counts = PackageCounts::default();

    for (name, entry) in &after {
        match before.get(name) {
            Some(old) if old != entry => counts.updated += 1,
            Some(_) => {}
            None => counts.installed += 1,
        }
    }
    #[allow(clippy::cast_possible_truncation)]
    let removed = before.keys().filter(|name| !after.contains_key(*name)).count() as u32;
    counts.removed = removed;

    counts
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn outcome(exit_code: i32, stderr: &str) -> ExecutionOutcome {
        ExecutionOutcome {
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
            duration: Duration::from_secs(1),
        }
    }

    fn log_evidence(log: &str) -> Evidence {
        Evidence {
            change_log: Some(log.to_string()),
            ..Evidence::default()
        }
    }

    #[test]
    fn test_mixed_group_scenario() {
        let h1 = classify(
            "h1",
            &outcome(0, ""),
            &log_evidence(
                "Oct 15 10:01:02 Updated: openssl-3.0.7-25.el9.x86_64\n\
                 Oct 15 10:01:04 Updated: bash-5.1.8-9.el9.x86_64\n",
            ),
        );
        assert_eq!(h1.status, HostStatus::Successful);
        assert_eq!(h1.updated_count, 2);
        assert_eq!(h1.installed_count, 0);

        let h2 = classify(
            "h2",
            &outcome(255, "root@h2: Permission denied (publickey)."),
            &Evidence::default(),
        );
        assert_eq!(h2.status, HostStatus::AuthFailed);

        let h3 = classify(
            "h3",
            &outcome(255, "ssh: Could not resolve hostname h3: Name or service not known"),
            &Evidence::default(),
        );
        assert_eq!(h3.status, HostStatus::Unreachable);
    }

    #[test]
    fn test_auth_marker_beats_exit_code() {
        let result = classify("db01", &outcome(0, "Permission denied"), &Evidence::default());
        assert_eq!(result.status, HostStatus::AuthFailed);
    }

    #[test]
    fn test_nonzero_exit_uses_trimmed_stderr() {
        let result = classify(
            "db02",
            &outcome(1, "  Error: Failed to download metadata for repo 'baseos'\n"),
            &log_evidence("Updated: should-be-ignored"),
        );
        assert_eq!(
            result.status,
            HostStatus::OtherFailure("Error: Failed to download metadata for repo 'baseos'".into())
        );
        assert_eq!(result.updated_count, 0);
    }

    #[test]
    fn test_silent_nonzero_exit_is_ambiguous() {
        assert_eq!(
            check_transport(&outcome(-1, "")),
            Err(HostFailure::ClassificationAmbiguous(
                "exit status -1 with no diagnostic output".into()
            ))
        );
    }

    #[test]
    fn test_no_changes_is_already_patched() {
        let result = classify("web01", &outcome(0, ""), &log_evidence(""));
        assert_eq!(result.status, HostStatus::AlreadyPatched);
    }

    #[test]
    fn test_missing_evidence_degrades_to_already_patched() {
        let result = classify("web02", &outcome(0, ""), &Evidence::default());
        assert_eq!(result.status, HostStatus::AlreadyPatched);
    }

    #[test]
    fn test_classify_is_idempotent() {
        let out = outcome(0, "");
        let evidence = log_evidence("Installed: tmux-3.2a-4.el9.x86_64\nErased: nano\n");
        let first = classify("web03", &out, &evidence);
        let second = classify("web03", &out, &evidence);
        assert_eq!(first, second);
        assert_eq!(first.installed_count, 1);
        assert_eq!(first.removed_count, 1);
    }

    #[test]
    fn test_log_counting_takes_first_matching_tag() {
        let counts = count_log_tags(
            "Updated: a\nInstalled: b\nErased: c\nUpdated: Installed: d\nunrelated line\n",
        );
        assert_eq!(
            counts,
            PackageCounts {
                updated: 2,
                installed: 1,
                removed: 1
            }
        );
    }

    #[test]
    fn test_package_name_heuristic() {
        assert_eq!(package_name("openssl-3.0.7-25.el9.x86_64"), "openssl");
        assert_eq!(package_name("kernel-core-5.14.0-362.el9.x86_64"), "kernel");
        assert_eq!(package_name("nodash"), "nodash");
    }

    #[test]
    fn test_snapshot_diff_used_when_log_unavailable() {
        let evidence = Evidence {
            before: Some("openssl-3.0.7-24.el9\nbash-5.1.8-9.el9\nnano-5.6.1-5.el9\n".into()),
            after: Some("openssl-3.0.7-25.el9\nbash-5.1.8-9.el9\ntmux-3.2a-4.el9\n".into()),
            change_log: None,
        };
        let result = classify("web04", &outcome(0, ""), &evidence);
        assert_eq!(result.status, HostStatus::Successful);
        assert_eq!(
            result.counts(),
            PackageCounts {
                updated: 1,
                installed: 1,
                removed: 1
            }
        );
    }

    #[test]
    fn test_empty_log_wins_over_snapshot_diff() {
        let evidence = Evidence {
            before: Some("openssl-3.0.7-24.el9\n".into()),
            after: Some("openssl-3.0.7-25.el9\n".into()),
            change_log: Some(String::new()),
        };
        assert!(count_changes(&evidence).is_empty());
    }

    #[test]
    fn test_name_collision_last_entry_wins() {
        // both kernel-* entries collapse onto "kernel"; only the last one is compared
        let before = "kernel-5.14.0-1\nkernel-core-5.14.0-1\n";
        let after = "kernel-5.14.0-2\nkernel-core-5.14.0-1\n";
        assert!(diff_snapshots(before, after).is_empty());
    }
}
