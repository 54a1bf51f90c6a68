//! SSH identity resolution
//!
//! A fleet run opens hundreds of sessions with the same identity, so the key
//! is decoded once and shared as an `Arc` across every `SshExecutor`.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::keys::ssh_key::PrivateKey;
use russh::keys::{decode_secret_key, load_secret_key};
use tracing::debug;

/// Identity file names tried when no key is configured, in order
const DEFAULT_IDENTITIES: [&str; 3] = ["id_ed25519", "id_ecdsa", "id_rsa"];

/// Where the private key comes from
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Explicit path to key file
    Path(PathBuf),
    /// Base64-encoded OpenSSH key held in an environment variable
    Env(String),
    /// First of the usual identities under `~/.ssh`
    DefaultIdentity,
}

impl KeySource {
    /// Decode the private key
    ///
    /// # Errors
    /// Returns `KeyError` if the key is missing, readable by group/other,
    /// not valid base64, or cannot be parsed.
    pub fn load(&self) -> Result<Arc<PrivateKey>, KeyError> {
        let key = match self {
            KeySource::Path(path) => load_from_path(path)?,
            KeySource::Env(var_name) => {
                let encoded =
                    env::var(var_name).map_err(|_| KeyError::EnvNotSet(var_name.clone()))?;
                let pem = base64_decode(&encoded)?;
                let pem = String::from_utf8(pem).map_err(|_| KeyError::InvalidBase64)?;
                decode_secret_key(&pem, None).map_err(|e| KeyError::Parse(e.to_string()))?
            }
            KeySource::DefaultIdentity => {
                let path = default_identity().ok_or_else(|| {
                    KeyError::NotFound(format!("~/.ssh/{{{}}}", DEFAULT_IDENTITIES.join(",")))
                })?;
                load_from_path(&path)?
            }
        };

        Ok(Arc::new(key))
    }
}

/// Key resolution errors
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("environment variable {0} not set")]
    EnvNotSet(String),

    #[error("invalid base64 encoding")]
    InvalidBase64,

    #[error("key file permissions too open: {0} (should be 600)")]
    BadPermissions(String),

    #[error("key file not found: {0}")]
    NotFound(String),

    #[error("cannot parse private key: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn default_identity() -> Option<PathBuf> {
    let ssh_dir = dirs::home_dir()?.join(".ssh");
    DEFAULT_IDENTITIES
        .iter()
        .map(|name| ssh_dir.join(name))
        .find(|path| path.is_file())
}

fn load_from_path(path: &Path) -> Result<PrivateKey, KeyError> {
    if !path.exists() {
        return Err(KeyError::NotFound(path.display().to_string()));
    }
    validate_key_permissions(path)?;
    debug!(path = %path.display(), "loading SSH key");
    load_secret_key(path, None).map_err(|e| KeyError::Parse(e.to_string()))
}

fn base64_decode(input: &str) -> Result<Vec<u8>, KeyError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(input.trim())
        .map_err(|_| KeyError::InvalidBase64)
}

fn validate_key_permissions(path: &Path) -> Result<(), KeyError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode();

    // group and other bits must be clear
    if mode & 0o77 != 0 {
        return Err(KeyError::BadPermissions(path.display().to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    #[test]
    fn test_missing_path() {
        let result = KeySource::Path(PathBuf::from("/nonexistent/fleetpatch/id_rsa")).load();
        assert!(matches!(result, Err(KeyError::NotFound(_))));
    }

    #[test]
    fn test_open_permissions_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_ed25519");
        std::fs::write(&path, "not a key").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let result = KeySource::Path(path).load();
        assert!(matches!(result, Err(KeyError::BadPermissions(_))));
    }

    #[test]
    fn test_garbage_key_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_ed25519");
        std::fs::write(&path, "not a key").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();

        let result = KeySource::Path(path).load();
        assert!(matches!(result, Err(KeyError::Parse(_))));
    }

    #[test]
    fn test_env_not_set() {
        let result = KeySource::Env("FLEETPATCH_TEST_KEY_THAT_IS_NOT_SET".to_string()).load();
        assert!(matches!(result, Err(KeyError::EnvNotSet(_))));
    }

    #[test]
    fn test_base64_decode_rejects_garbage() {
        assert!(matches!(
            base64_decode("%%% not base64 %%%"),
            Err(KeyError::InvalidBase64)
        ));
        assert_eq!(base64_decode(" aGVsbG8= \n").unwrap(), b"hello");
    }
}
