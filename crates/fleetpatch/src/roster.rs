//! TOML-backed roster
//!
//! ```toml
//! [groups]
//! batch-01 = ["web01", "web02"]
//! batch-02 = ["db01"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use fleetpatch_core::{RosterError, StaticRoster};

#[derive(Debug, Deserialize)]
struct RosterDocument {
    #[serde(default)]
    groups: BTreeMap<String, Vec<String>>,
}

/// Roster file loader
pub struct RosterFile;

impl RosterFile {
    /// Read and parse the roster at `path`
    ///
    /// # Errors
    /// Returns `RosterError::Unavailable` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<StaticRoster, RosterError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RosterError::Unavailable(format!("{}: {e}", path.display())))?;
        Self::parse(&content)
    }

    /// # Errors
    /// Returns `RosterError::Unavailable` on invalid TOML.
    pub fn parse(content: &str) -> Result<StaticRoster, RosterError> {
        let document: RosterDocument =
            toml::from_str(content).map_err(|e| RosterError::Unavailable(e.to_string()))?;
        Ok(StaticRoster::new(document.groups))
    }
}
