//! Group state machine types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of one group within a campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
    Pending,
    Running,
    Completed,
}

impl GroupState {
    /// Only forward moves are allowed
    #[must_use]
    pub fn can_transition_to(self, next: GroupState) -> bool {
        matches!(
            (self, next),
            (GroupState::Pending, GroupState::Running)
                | (GroupState::Running, GroupState::Completed)
        )
    }
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GroupState::Pending => "pending",
            GroupState::Running => "running",
            GroupState::Completed => "completed",
        };
        f.write_str(name)
    }
}
