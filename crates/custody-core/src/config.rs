//! Project configuration loaded from `custody.toml`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for a custody deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustodyConfig {
    /// Storage and append-path settings.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Chain verification settings.
    #[serde(default)]
    pub verify: VerifyConfig,
}

/// Storage and append-path settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Ledger database path, relative to the project root.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Tail lock file path, relative to the project root.
    #[serde(default = "default_lock_path")]
    pub lock_path: PathBuf,

    /// Bounded wait for the append serialization scope, in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            lock_path: default_lock_path(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl LedgerConfig {
    /// The lock timeout as a [`Duration`].
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Chain verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Entries per verification batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".custody/ledger.sqlite3")
}

fn default_lock_path() -> PathBuf {
    PathBuf::from(".custody/ledger.lock")
}

const fn default_lock_timeout_ms() -> u64 {
    2000
}

const fn default_batch_size() -> usize {
    1000
}

/// Config file name inside a project root.
pub const CONFIG_FILE: &str = "custody.toml";

/// Load configuration from `<root>/custody.toml`, falling back to defaults
/// when the file does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(root: &Path) -> Result<CustodyConfig> {
    let path = root.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(CustodyConfig::default());
    }
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
}

/// Write configuration to `<root>/custody.toml`.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn save_config(root: &Path, config: &CustodyConfig) -> Result<()> {
    let path = root.join(CONFIG_FILE);
    let raw = toml::to_string_pretty(config).context("serialize config")?;
    std::fs::write(&path, raw).with_context(|| format!("write config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_file_missing() {
        let dir = TempDir::new().expect("tmp");
        let config = load_config(dir.path()).expect("load");
        assert_eq!(config.ledger.db_path, PathBuf::from(".custody/ledger.sqlite3"));
        assert_eq!(config.ledger.lock_timeout_ms, 2000);
        assert_eq!(config.verify.batch_size, 1000);
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = TempDir::new().expect("tmp");
        let mut config = CustodyConfig::default();
        config.ledger.lock_timeout_ms = 500;
        config.verify.batch_size = 250;
        save_config(dir.path(), &config).expect("save");

        let loaded = load_config(dir.path()).expect("load");
        assert_eq!(loaded.ledger.lock_timeout_ms, 500);
        assert_eq!(loaded.verify.batch_size, 250);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().expect("tmp");
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[verify]\nbatch_size = 10\n",
        )
        .expect("write");

        let config = load_config(dir.path()).expect("load");
        assert_eq!(config.verify.batch_size, 10);
        assert_eq!(config.ledger.lock_timeout_ms, 2000);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().expect("tmp");
        std::fs::write(dir.path().join(CONFIG_FILE), "not valid toml [").expect("write");
        assert!(load_config(dir.path()).is_err());
    }
}
