//! Host roster port

use std::collections::{BTreeMap, BTreeSet};

use crate::error::RosterError;

/// Source of groups and their hosts
pub trait Roster: Send + Sync {
    /// Group identifiers, sorted lexicographically
    ///
    /// # Errors
    /// Returns `RosterError::Unavailable` if the source cannot be read.
    fn group_ids(&self) -> Result<Vec<String>, RosterError>;

    /// Hosts of one group, in source order
    ///
    /// # Errors
    /// Returns `RosterError::GroupNotFound` for unknown groups.
    fn hosts(&self, group: &str) -> Result<Vec<String>, RosterError>;

    /// Distinct hosts across every group
    ///
    /// # Errors
    /// Propagates errors from `group_ids` and `hosts`.
    fn fleet_size(&self) -> Result<u64, RosterError> {
        let mut distinct = BTreeSet::new();
        for group in self.group_ids()? {
            distinct.extend(self.hosts(&group)?);
        }
        Ok(distinct.len() as u64)
    }
}

/// In-memory roster
#[derive(Debug, Clone, Default)]
pub struct StaticRoster {
    groups: BTreeMap<String, Vec<String>>,
}

impl StaticRoster {
    /// Blank host entries are dropped and names trimmed
    pub fn new<G, H, I>(groups: I) -> Self
    where
        I: IntoIterator<Item = (G, Vec<H>)>,
        G: Into<String>,
        H: AsRef<str>,
    {
        let groups = groups
            .into_iter()
            .map(|(group, hosts)| {
                let hosts = hosts
                    .iter()
                    .map(|h| h.as_ref().trim())
                    .filter(|h| !h.is_empty())
                    .map(ToString::to_string)
                    .collect();
                (group.into(), hosts)
            })
            .collect();
        Self { groups }
    }
}

impl Roster for StaticRoster {
    fn group_ids(&self) -> Result<Vec<String>, RosterError> {
        Ok(self.groups.keys().cloned().collect())
    }

    fn hosts(&self, group: &str) -> Result<Vec<String>, RosterError> {
        self.groups
            .get(group)
            .cloned()
            .ok_or_else(|| RosterError::GroupNotFound(group.to_string()))
    }
}
