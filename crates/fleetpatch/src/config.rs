//! Configuration loading and types

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use fleetpatch_core::PatchConfig;
use fleetpatch_exec::KeySource;

/// Top-level configuration for fleetpatch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Campaign tunables and host workflow
    #[serde(default)]
    pub patch: PatchConfig,
    /// SSH transport settings
    #[serde(default)]
    pub ssh: SshConfig,
    /// Ledger file locations
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Roster source
    #[serde(default)]
    pub roster: RosterConfig,
    /// Report delivery
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Log output
    #[serde(default)]
    pub log: LogConfig,
}

/// SSH transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_ssh_user")]
    pub user: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Private key file; takes precedence over `key_env`
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    /// Environment variable holding a base64-encoded private key
    #[serde(default)]
    pub key_env: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            port: default_ssh_port(),
            key_path: None,
            key_env: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl SshConfig {
    #[must_use]
    pub fn key_source(&self) -> KeySource {
        match (&self.key_path, &self.key_env) {
            (Some(path), _) => KeySource::Path(path.clone()),
            (None, Some(var)) => KeySource::Env(var.clone()),
            (None, None) => KeySource::DefaultIdentity,
        }
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout_secs() -> u64 {
    120
}

/// Ledger file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_last_group_path")]
    pub last_group_path: PathBuf,
    #[serde(default = "default_counter_path")]
    pub counter_path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            last_group_path: default_last_group_path(),
            counter_path: default_counter_path(),
        }
    }
}

fn default_last_group_path() -> PathBuf {
    PathBuf::from("last_completed_group.txt")
}

fn default_counter_path() -> PathBuf {
    PathBuf::from("cumulative_success_count.txt")
}

/// Roster source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterConfig {
    /// TOML file with a `[groups]` table
    #[serde(default = "default_roster_path")]
    pub path: PathBuf,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            path: default_roster_path(),
        }
    }
}

fn default_roster_path() -> PathBuf {
    PathBuf::from("roster.toml")
}

/// How reports are delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyMode {
    /// Write the report to the log only
    #[default]
    Log,
    /// Pipe a MIME message to sendmail
    Sendmail,
}

/// Report delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub mode: NotifyMode,
    /// File with `[TO]` and `[CC]` sections
    #[serde(default = "default_recipients_path")]
    pub recipients_path: PathBuf,
    #[serde(default = "default_from")]
    pub from: String,
    #[serde(default = "default_sendmail_path")]
    pub sendmail_path: PathBuf,
    /// Run sendmail through sudo
    #[serde(default)]
    pub use_sudo: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            mode: NotifyMode::default(),
            recipients_path: default_recipients_path(),
            from: default_from(),
            sendmail_path: default_sendmail_path(),
            use_sudo: false,
        }
    }
}

fn default_recipients_path() -> PathBuf {
    PathBuf::from("recipients.txt")
}

fn default_from() -> String {
    "fleetpatch@localhost".to_string()
}

fn default_sendmail_path() -> PathBuf {
    PathBuf::from("/usr/sbin/sendmail")
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of text
    #[serde(default)]
    pub json: bool,
    /// Append to this file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed or validated
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("cannot read {}: {e}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// Returns error on invalid TOML or out-of-range values
    pub fn parse(content: &str) -> eyre::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default paths or use defaults
    ///
    /// # Errors
    /// Returns error if a found file cannot be loaded
    pub fn load_default() -> eyre::Result<Self> {
        // Check environment variable
        if let Ok(path) = std::env::var("FLEETPATCH_CONFIG") {
            return Self::load(&PathBuf::from(path));
        }

        // Try common paths
        let paths = [
            PathBuf::from("fleetpatch.toml"),
            PathBuf::from("/etc/fleetpatch/fleetpatch.toml"),
            dirs::config_dir()
                .map(|p| p.join("fleetpatch/fleetpatch.toml"))
                .unwrap_or_default(),
        ];

        for path in paths {
            if path.is_file() {
                return Self::load(&path);
            }
        }

        // Return default config if no file found
        tracing::warn!("no config file found, using defaults");
        Ok(Config::default())
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.patch.worker_limit == 0 {
            eyre::bail!("patch.worker_limit must be at least 1");
        }
        if self.patch.worker_limit > Semaphore::MAX_PERMITS {
            eyre::bail!(
                "patch.worker_limit must not exceed {}",
                Semaphore::MAX_PERMITS
            );
        }
        if self.patch.fleet_size == Some(0) {
            eyre::bail!("patch.fleet_size must be greater than zero");
        }
        if self.patch.probe.max_attempts == 0 {
            eyre::bail!("patch.probe.max_attempts must be at least 1");
        }
        if self.patch.workflow.script.trim().is_empty() {
            eyre::bail!("patch.workflow.script must not be empty");
        }
        if self.ssh.user.trim().is_empty() {
            eyre::bail!("ssh.user must not be empty");
        }
        Ok(())
    }
}
