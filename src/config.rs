//! Runtime settings for the installer.
//!
//! Every numeric threshold and filesystem path the program uses lives here,
//! so deployments can override them from a JSON file instead of recompiling.
//! Missing fields fall back to the built-in defaults, which match a stock
//! Arch system.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const GIB: u64 = 1024 * 1024 * 1024;

/// Tunables and paths for a full installer run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Install attempts per item, first try included
    pub max_attempts: u32,
    /// Base retry delay; the wait after attempt n is `base * n`
    pub backoff_base_secs: u64,
    /// Hard ceiling for a single install command
    pub install_timeout_secs: u64,
    /// Ceiling for index refresh, listing and key-trust commands
    pub index_timeout_secs: u64,
    /// Ceiling for the optional full system upgrade
    pub upgrade_timeout_secs: u64,
    /// How long the confirmation prompt waits for operator input
    pub confirm_timeout_secs: u64,
    /// Minimum free disk space on / before a run is allowed
    pub min_disk_bytes: u64,
    /// Minimum available memory before a run is allowed
    pub min_mem_bytes: u64,
    /// Skip the mirror reachability probe (air-gapped local mirrors)
    pub skip_network_check: bool,
    /// Minimum milliseconds between progress line repaints
    pub render_interval_ms: u64,

    /// Single-instance lock file
    pub lock_path: PathBuf,
    /// Run log; the previous generation is kept as `<log>.bak`
    pub log_path: PathBuf,
    /// Saved queue for `--resume`
    pub queue_path: PathBuf,
    /// Machine-readable run report
    pub report_path: PathBuf,
    /// pacman configuration to probe and, if needed, extend
    pub pacman_conf: PathBuf,
    /// pacman database lock, checked during readiness
    pub pacman_db_lock: PathBuf,

    /// Repository name as it appears in pacman.conf
    pub repo_name: String,
    /// Server line written when the repository has to be registered
    pub repo_server: String,
    /// Master signing key fingerprint for the repository
    pub repo_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_secs: 2,
            install_timeout_secs: 300,
            index_timeout_secs: 600,
            upgrade_timeout_secs: 3600,
            confirm_timeout_secs: 60,
            min_disk_bytes: 10 * GIB,
            min_mem_bytes: 2 * GIB,
            skip_network_check: false,
            render_interval_ms: 200,
            lock_path: PathBuf::from("/run/lock/arsenalup.lock"),
            log_path: PathBuf::from("/var/log/arsenalup.log"),
            queue_path: PathBuf::from("/var/lib/arsenalup/queue.txt"),
            report_path: PathBuf::from("/var/log/arsenalup-report.json"),
            pacman_conf: PathBuf::from("/etc/pacman.conf"),
            pacman_db_lock: PathBuf::from("/var/lib/pacman/db.lck"),
            repo_name: "blackarch".to_string(),
            repo_server: "https://blackarch.org/blackarch/$repo/os/$arch".to_string(),
            repo_key: "4345771566D76038C7FEB43863EC0ADBEA87E4E3".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file and validate them.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings from {:?}", path.as_ref()))?;

        let settings: Self =
            serde_json::from_str(&content).context("Failed to parse settings JSON")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Load from `path` when given, otherwise use the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            anyhow::bail!("max_attempts must be at least 1");
        }
        if self.install_timeout_secs == 0 {
            anyhow::bail!("install_timeout_secs must be greater than 0");
        }
        if self.index_timeout_secs == 0 {
            anyhow::bail!("index_timeout_secs must be greater than 0");
        }
        if self.repo_name.trim().is_empty() {
            anyhow::bail!("repo_name must not be empty");
        }
        if self.repo_server.trim().is_empty() {
            anyhow::bail!("repo_server must not be empty");
        }
        Ok(())
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_secs(self.index_timeout_secs)
    }

    pub fn upgrade_timeout(&self) -> Duration {
        Duration::from_secs(self.upgrade_timeout_secs)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }
}
