//! fleetpatch-exec: Remote execution abstraction
//!
//! Provides the `RemoteExecutor` trait plus implementations for running
//! commands locally and over SSH.

pub mod error;
pub mod keys;
pub mod local;
pub mod result;
pub mod ssh;
pub mod traits;

pub use error::ExecError;
pub use keys::{KeyError, KeySource};
pub use local::LocalExecutor;
pub use result::{
    ConnectionInfo, ExecutionOutcome, MISSING_EXIT_STATUS, TRANSPORT_FAILURE_STATUS,
};
pub use russh::keys::ssh_key::PrivateKey;
pub use ssh::SshExecutor;
pub use traits::RemoteExecutor;
