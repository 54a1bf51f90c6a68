//! Message types for actor communication
//!
//! Message handlers are implemented in their respective actor modules.

use kameo_macros::Reply;

use crate::ledger::LedgerState;
use crate::report::ComplianceReport;
use crate::state::GroupState;

/// Process every group after the ledger's resume point
#[derive(Debug)]
pub struct RunCampaign;

/// Outcome of a campaign that ran to completion
#[derive(Debug, Clone, Reply)]
pub struct CampaignSummary {
    /// Groups processed by this run, in order
    pub groups_completed: Vec<String>,
    /// One report per processed group
    pub reports: Vec<ComplianceReport>,
    /// Ledger after the last recorded group
    pub ledger: LedgerState,
}

/// Read the ledger as last loaded or recorded
#[derive(Debug)]
pub struct GetLedger;

/// List every known group with its state
#[derive(Debug)]
pub struct GetGroupStates;

/// Group name and where it is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Reply)]
pub struct GroupProgress {
    pub group: String,
    pub state: GroupState,
}
