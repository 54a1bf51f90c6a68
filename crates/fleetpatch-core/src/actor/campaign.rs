//! `CampaignActor`: drives groups through scheduler, ledger and reporter
//!
//! Groups run strictly one after another. The ledger is only written from
//! this actor's handler, after the scheduler's join barrier, so it needs no
//! locking.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tracing::{error, info, instrument, warn};

use crate::error::CoreError;
use crate::ledger::{Ledger, LedgerState, LedgerStore};
use crate::message::{CampaignSummary, GetGroupStates, GetLedger, GroupProgress, RunCampaign};
use crate::notify::{Notification, Notifier, RecipientSource};
use crate::pipeline::HostTask;
use crate::report::{ComplianceReport, build_report, results_attachment};
use crate::roster::Roster;
use crate::scheduler::GroupScheduler;
use crate::state::GroupState;
use crate::types::GroupRun;

/// Arguments for spawning a `CampaignActor`
pub struct CampaignActorArgs {
    /// Groups and their hosts
    pub roster: Arc<dyn Roster>,
    /// Persistence for the progress ledger
    pub ledger_store: Box<dyn LedgerStore>,
    /// Per-host work
    pub task: Arc<dyn HostTask>,
    /// Concurrent hosts per group
    pub worker_limit: usize,
    /// Hosts that make up 100% compliance; `None` counts the roster
    pub fleet_size: Option<u64>,
    /// Report delivery
    pub notifier: Arc<dyn Notifier>,
    /// Report addressees
    pub recipients: Arc<dyn RecipientSource>,
}

/// Groups after the resume point, in lexicographic order
#[must_use]
pub fn pending_groups(groups: &[String], ledger: &LedgerState) -> Vec<String> {
    let mut pending: Vec<String> = groups
        .iter()
        .filter(|g| !ledger.has_completed(g))
        .cloned()
        .collect();
    pending.sort();
    pending.dedup();
    pending
}

/// Orchestration driver
pub struct CampaignActor {
    roster: Arc<dyn Roster>,
    ledger: Ledger,
    scheduler: GroupScheduler,
    fleet_size: Option<u64>,
    notifier: Arc<dyn Notifier>,
    recipients: Arc<dyn RecipientSource>,
    groups: BTreeMap<String, GroupState>,
}

impl CampaignActor {
    fn resolve_fleet_size(&self) -> Result<u64, CoreError> {
        let size = match self.fleet_size {
            Some(size) => size,
            None => self.roster.fleet_size()?,
        };
        if size == 0 {
            return Err(CoreError::ConfigError(
                "fleet size must be greater than zero".to_string(),
            ));
        }
        Ok(size)
    }

    /// Move a group forward, rejecting anything but Pending→Running→Completed
    fn transition(&mut self, group: &str, to: GroupState) -> Result<(), CoreError> {
        let from = self
            .groups
            .get(group)
            .copied()
            .unwrap_or(GroupState::Pending);

        if !from.can_transition_to(to) {
            return Err(CoreError::InvalidTransition {
                group: group.to_string(),
                from,
                to,
            });
        }

        info!(group, from = %from, to = %to, "group state transition");
        self.groups.insert(group.to_string(), to);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn run_group(
        &mut self,
        group: &str,
        fleet_size: u64,
    ) -> Result<ComplianceReport, CoreError> {
        self.transition(group, GroupState::Running)?;

        let hosts = self.roster.hosts(group)?;
        info!(group, hosts = hosts.len(), "processing group");

        let started_at = Utc::now();
        let results = self.scheduler.run_group(&hosts).await;
        let run = GroupRun {
            group_id: group.to_string(),
            hosts,
            results,
            started_at,
            finished_at: Utc::now(),
        };

        let report = build_report(&run, self.ledger.state(), fleet_size);
        self.ledger
            .record_group(group, report.success_delta(), fleet_size)?;
        self.transition(group, GroupState::Completed)?;

        info!(
            group,
            successful = report.successful_count,
            already_patched = report.already_patched_unique_count,
            cumulative = report.cumulative_total,
            compliance = %format!("{:.2}%", report.compliance_percent),
            "group completed"
        );

        self.notify(run, &report).await;
        Ok(report)
    }

    /// Best effort: the group is already recorded, so failures are only logged
    async fn notify(&self, run: GroupRun, report: &ComplianceReport) {
        let attachment = results_attachment(&run.results).unwrap_or_else(|e| {
            warn!(group = %run.group_id, error = %e, "cannot serialize result table");
            Vec::new()
        });

        let recipients = match self.recipients.recipients() {
            Ok(recipients) => recipients,
            Err(e) => {
                warn!(group = %run.group_id, error = %e, "skipping report delivery");
                return;
            }
        };

        let notification = Notification {
            subject: report.subject(),
            report: report.clone(),
            results: run.results,
            attachment,
            attachment_name: report.attachment_name(),
        };

        if let Err(e) = self.notifier.deliver(&recipients, &notification).await {
            error!(group = %run.group_id, error = %e, "report delivery failed");
        }
    }

    async fn run_campaign(&mut self) -> Result<CampaignSummary, CoreError> {
        let ledger = self.ledger.load()?;
        let fleet_size = self.resolve_fleet_size()?;

        let all_groups = self.roster.group_ids()?;
        self.groups = all_groups
            .iter()
            .map(|g| {
                let state = if ledger.has_completed(g) {
                    GroupState::Completed
                } else {
                    GroupState::Pending
                };
                (g.clone(), state)
            })
            .collect();

        let pending = pending_groups(&all_groups, &ledger);
        info!(
            total = all_groups.len(),
            pending = pending.len(),
            resume_after = ?ledger.last_completed_group,
            fleet_size,
            "starting campaign"
        );

        let mut reports = Vec::with_capacity(pending.len());
        let mut groups_completed = Vec::with_capacity(pending.len());

        for group in pending {
            match self.run_group(&group, fleet_size).await {
                Ok(report) => {
                    reports.push(report);
                    groups_completed.push(group);
                }
                Err(e) => {
                    error!(group = %group, error = %e, "halting campaign");
                    return Err(e);
                }
            }
        }

        info!(groups = groups_completed.len(), "campaign finished");

        Ok(CampaignSummary {
            groups_completed,
            reports,
            ledger: self.ledger.state().clone(),
        })
    }
}

impl Actor for CampaignActor {
    type Args = CampaignActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(id = %actor_ref.id(), workers = args.worker_limit, "CampaignActor starting");

        Ok(Self {
            roster: args.roster,
            ledger: Ledger::new(args.ledger_store),
            scheduler: GroupScheduler::new(args.task, args.worker_limit),
            fleet_size: args.fleet_size,
            notifier: args.notifier,
            recipients: args.recipients,
            groups: BTreeMap::new(),
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(reason = ?reason, "CampaignActor stopping");
        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<RunCampaign> for CampaignActor {
    type Reply = Result<CampaignSummary, CoreError>;

    async fn handle(
        &mut self,
        _msg: RunCampaign,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.run_campaign().await
    }
}

impl Message<GetLedger> for CampaignActor {
    type Reply = LedgerState;

    async fn handle(
        &mut self,
        _msg: GetLedger,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.ledger.state().clone()
    }
}

impl Message<GetGroupStates> for CampaignActor {
    type Reply = Vec<GroupProgress>;

    async fn handle(
        &mut self,
        _msg: GetGroupStates,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.groups
            .iter()
            .map(|(group, state)| GroupProgress {
                group: group.clone(),
                state: *state,
            })
            .collect()
    }
}
