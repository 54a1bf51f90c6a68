//! fleetpatch-core: Fleet patch-orchestration engine
//!
//! Probes, patches and classifies hosts group by group under a bounded
//! worker pool, records resumable progress in a ledger, and hands a
//! compliance report per group to a notifier. The driver is the kameo
//! `CampaignActor`.

pub mod actor;
pub mod classify;
pub mod config;
pub mod error;
pub mod ledger;
pub mod message;
pub mod notify;
pub mod pipeline;
pub mod probe;
pub mod report;
pub mod roster;
pub mod scheduler;
pub mod state;
pub mod types;

pub use actor::{CampaignActor, CampaignActorArgs, pending_groups};
pub use classify::{Evidence, classify};
pub use config::{PatchConfig, RetryPolicy, WorkflowConfig};
pub use error::{CoreError, HostFailure, LedgerError, NotifyError, RosterError};
pub use ledger::{
    FileLedgerStore, InMemoryLedgerStore, Ledger, LedgerState, LedgerStore, LedgerUpdate,
};
pub use message::{CampaignSummary, GetGroupStates, GetLedger, GroupProgress, RunCampaign};
pub use notify::{
    LogNotifier, Notification, Notifier, RecipientSource, Recipients, StaticRecipients,
};
pub use pipeline::{ExecutorFactory, HostPipeline, HostTask, execute};
pub use probe::Prober;
pub use report::{ComplianceReport, build_report};
pub use roster::{Roster, StaticRoster};
pub use scheduler::GroupScheduler;
pub use state::GroupState;
pub use types::{GroupRun, HostResult, HostStatus, PackageCounts};
