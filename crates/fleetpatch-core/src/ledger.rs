//! Progress ledger: resume point and cumulative compliance counter
//!
//! The state transition is a pure function on [`LedgerState`]; persistence
//! goes through an injected [`LedgerStore`].

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use kameo_macros::Reply;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::LedgerError;

/// Durable progress across runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Reply)]
pub struct LedgerState {
    /// Last group whose results were fully recorded
    pub last_completed_group: Option<String>,
    /// Compliant hosts counted since the last full cycle
    pub cumulative_success_count: u64,
}

/// What a single `record_group` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerUpdate {
    /// Counter after adding this group's delta, before any reset
    pub cumulative_total: u64,
    /// Counter actually persisted (0 when a cycle completed)
    pub persisted_total: u64,
    /// Whether the fleet reached full compliance with this group
    pub cycle_completed: bool,
}

impl LedgerState {
    /// Whether `group` was already recorded in this campaign
    #[must_use]
    pub fn has_completed(&self, group: &str) -> bool {
        self.last_completed_group
            .as_deref()
            .is_some_and(|last| group <= last)
    }

    /// Apply one completed group.
    ///
    /// The counter grows by `success_delta` and wraps to 0 once it meets
    /// `fleet_size`; the resume point always advances.
    #[must_use]
    pub fn advance(
        &self,
        group: &str,
        success_delta: u64,
        fleet_size: u64,
    ) -> (Self, LedgerUpdate) {
        let cumulative_total = self.cumulative_success_count.saturating_add(success_delta);
        let cycle_completed = cumulative_total >= fleet_size;
        let persisted_total = if cycle_completed { 0 } else { cumulative_total };

        let next = Self {
            last_completed_group: Some(group.to_string()),
            cumulative_success_count: persisted_total,
        };

        (
            next,
            LedgerUpdate {
                cumulative_total,
                persisted_total,
                cycle_completed,
            },
        )
    }
}

/// Storage port for the ledger
pub trait LedgerStore: Send + Sync {
    /// Missing state yields `LedgerState::default()`
    ///
    /// # Errors
    /// Returns `LedgerError` if persisted state exists but cannot be read.
    fn load(&self) -> Result<LedgerState, LedgerError>;

    /// Durably persist `state`; must survive a crash once it returns
    ///
    /// # Errors
    /// Returns `LedgerError` on any write failure.
    fn save(&self, state: &LedgerState) -> Result<(), LedgerError>;
}

/// Two plain-text files: one holding the last group name, one the counter
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    last_group_path: PathBuf,
    counter_path: PathBuf,
}

impl FileLedgerStore {
    pub fn new(last_group_path: impl Into<PathBuf>, counter_path: impl Into<PathBuf>) -> Self {
        Self {
            last_group_path: last_group_path.into(),
            counter_path: counter_path.into(),
        }
    }

    fn read_optional(path: &Path) -> Result<Option<String>, LedgerError> {
        match fs::read_to_string(path) {
            Ok(content) => {
                let trimmed = content.trim();
                Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(LedgerError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Write to a randomly named sibling temp file, fsync, persist over the
    /// target, then fsync the directory so the rename itself is durable
    fn write_atomic(path: &Path, content: &str) -> Result<(), LedgerError> {
        let io_err = |source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(io_err)?;
                parent
            }
            None => Path::new("."),
        };

        // O_EXCL + random name: the temp file can never alias the target
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.as_file_mut()
            .write_all(content.as_bytes())
            .map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;

        #[cfg(unix)]
        File::open(dir).and_then(|d| d.sync_all()).map_err(io_err)?;

        Ok(())
    }
}

impl LedgerStore for FileLedgerStore {
    fn load(&self) -> Result<LedgerState, LedgerError> {
        let last_completed_group = Self::read_optional(&self.last_group_path)?;

        let cumulative_success_count = match Self::read_optional(&self.counter_path)? {
            Some(raw) => raw.parse().map_err(|_| LedgerError::Corrupt {
                path: self.counter_path.clone(),
                value: raw,
            })?,
            None => 0,
        };

        Ok(LedgerState {
            last_completed_group,
            cumulative_success_count,
        })
    }

    fn save(&self, state: &LedgerState) -> Result<(), LedgerError> {
        // Counter first. A crash between the two writes leaves the counter
        // holding this group's delta while the resume point still names the
        // previous group, so the re-run counts the group twice. The other
        // order would skip the group and lose its delta instead.
        Self::write_atomic(&self.counter_path, &state.cumulative_success_count.to_string())?;
        Self::write_atomic(
            &self.last_group_path,
            state.last_completed_group.as_deref().unwrap_or_default(),
        )?;
        Ok(())
    }
}

/// Volatile store for tests and dry runs
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<LedgerState>,
}

impl InMemoryLedgerStore {
    #[must_use]
    pub fn with_state(state: LedgerState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn load(&self) -> Result<LedgerState, LedgerError> {
        self.state
            .lock()
            .map(|s| s.clone())
            .map_err(|e| LedgerError::Store(e.to_string()))
    }

    fn save(&self, state: &LedgerState) -> Result<(), LedgerError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|e| LedgerError::Store(e.to_string()))?;
        *guard = state.clone();
        Ok(())
    }
}

/// Single writer over a [`LedgerStore`]
pub struct Ledger {
    store: Box<dyn LedgerStore>,
    state: LedgerState,
}

impl Ledger {
    pub fn new(store: Box<dyn LedgerStore>) -> Self {
        Self {
            store,
            state: LedgerState::default(),
        }
    }

    /// Read persisted state, replacing whatever is cached
    ///
    /// # Errors
    /// Propagates store read failures; callers must not guess a default.
    pub fn load(&mut self) -> Result<LedgerState, LedgerError> {
        self.state = self.store.load()?;
        info!(
            last_group = ?self.state.last_completed_group,
            cumulative = self.state.cumulative_success_count,
            "ledger loaded"
        );
        Ok(self.state.clone())
    }

    /// Last loaded or recorded state
    #[must_use]
    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    /// Record a completed group and persist it before returning
    ///
    /// # Errors
    /// Propagates store write failures; the cached state is left untouched.
    pub fn record_group(
        &mut self,
        group: &str,
        success_delta: u64,
        fleet_size: u64,
    ) -> Result<LedgerUpdate, LedgerError> {
        let (next, update) = self.state.advance(group, success_delta, fleet_size);
        self.store.save(&next)?;
        self.state = next;

        if update.cycle_completed {
            info!(group, total = update.cumulative_total, "fleet fully compliant, counter reset");
        } else {
            debug!(group, total = update.persisted_total, "ledger updated");
        }

        Ok(update)
    }
}
