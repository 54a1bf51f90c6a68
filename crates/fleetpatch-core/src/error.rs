//! Core error types for fleetpatch-core

use std::path::PathBuf;

use thiserror::Error;

use crate::state::GroupState;

/// Why a single host could not be patched.
///
/// Every variant is terminal for that host and ends up as a `HostResult`;
/// none of them is ever raised past the scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostFailure {
    /// Retries exhausted while waiting for the host to answer
    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    /// Credentials rejected
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// Name does not resolve or host is otherwise unaddressable
    #[error("host unreachable: {0}")]
    HostUnreachable(String),

    /// Workflow exited non-zero
    #[error("remote command failed: {0}")]
    RemoteCommandFailed(String),

    /// Non-zero exit without any diagnostic to go on
    #[error("ambiguous outcome: {0}")]
    ClassificationAmbiguous(String),
}

/// Errors from the progress ledger. All of them halt the campaign.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Reading or writing persisted state failed
    #[error("ledger I/O error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Counter file holds something that is not a non-negative integer
    #[error("ledger counter at {path} is corrupt: {value:?}")]
    Corrupt {
        /// File involved
        path: PathBuf,
        /// Raw contents
        value: String,
    },

    /// Backend-specific failure (used by non-file stores)
    #[error("ledger store error: {0}")]
    Store(String),
}

/// Errors from the host roster
#[derive(Error, Debug, Clone)]
pub enum RosterError {
    /// Requested group does not exist
    #[error("group not found: {0}")]
    GroupNotFound(String),

    /// Roster source could not be read
    #[error("roster unavailable: {0}")]
    Unavailable(String),
}

/// Errors from report delivery. Never fatal to a group.
#[derive(Error, Debug, Clone)]
pub enum NotifyError {
    /// Recipient list could not be loaded
    #[error("recipients unavailable: {0}")]
    Recipients(String),

    /// Message could not be handed to the transport
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Errors that stop a campaign
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Ledger could not be read or written
    #[error("ledger error: {0}")]
    Ledger(String),

    /// Roster could not be read
    #[error("roster error: {0}")]
    Roster(String),

    /// Invalid group state transition attempted
    #[error("invalid state transition for {group} from {from} to {to}")]
    InvalidTransition {
        /// Group being processed
        group: String,
        /// Current state
        from: GroupState,
        /// Attempted target state
        to: GroupState,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Actor communication error
    #[error("actor communication error: {0}")]
    ActorError(String),
}

impl From<LedgerError> for CoreError {
    fn from(e: LedgerError) -> Self {
        CoreError::Ledger(e.to_string())
    }
}

impl From<RosterError> for CoreError {
    fn from(e: RosterError) -> Self {
        CoreError::Roster(e.to_string())
    }
}
