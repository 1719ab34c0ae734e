//! Package source boundary.
//!
//! The orchestrator never shells out to pacman directly; everything goes
//! through the [`PackageSource`] trait so the run loop can be exercised in
//! tests without a package manager on the host. [`PacmanSource`] is the real
//! implementation, driving pacman and pacman-key with bounded timeouts.

use crate::config::Settings;
use crate::error::{ArsenalError, DiscoveryError, Result};
use crate::runner::{self, CommandOutcome};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::process::Command;
use std::time::Duration;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Tool categories recognized by the arsenal repository.
///
/// Each category maps to a package group named `<repo>-<category>`, so the
/// kebab-case serialization doubles as the group-name suffix.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    InformationGathering,
    VulnerabilityAnalysis,
    WebApplications,
    Exploitation,
    PasswordAttacks,
    WirelessAttacks,
    ReverseEngineering,
    Forensics,
}

impl Category {
    /// Package group this category maps to, e.g. `blackarch-forensics`.
    pub fn group_name(&self, repo: &str) -> String {
        format!("{}-{}", repo, self)
    }

    /// All recognized category names, for CLI error messages.
    pub fn valid_names() -> Vec<String> {
        Category::iter().map(|c| c.to_string()).collect()
    }
}

/// Result of one install attempt, as seen by the executor.
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub diagnostic: String,
}

impl InstallOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    fn from_command(outcome: &CommandOutcome) -> Self {
        InstallOutcome {
            exit_code: outcome.exit_code,
            timed_out: outcome.timed_out,
            diagnostic: if outcome.success() {
                String::new()
            } else {
                outcome.diagnostic()
            },
        }
    }

    /// A clean zero-exit outcome.
    pub fn ok() -> Self {
        InstallOutcome {
            exit_code: Some(0),
            timed_out: false,
            diagnostic: String::new(),
        }
    }

    /// A normal process failure with the given exit code.
    pub fn failed(code: i32, diagnostic: &str) -> Self {
        InstallOutcome {
            exit_code: Some(code),
            timed_out: false,
            diagnostic: diagnostic.to_string(),
        }
    }

    /// An attempt that hit the hard deadline and was killed.
    pub fn timed_out() -> Self {
        InstallOutcome {
            exit_code: None,
            timed_out: true,
            diagnostic: "timed out".to_string(),
        }
    }
}

/// Command boundary between the orchestrator and the package manager.
pub trait PackageSource {
    /// Make sure the arsenal repository is registered and its key trusted.
    fn ensure_trusted(&mut self) -> Result<()>;

    /// Refresh the package index from the mirrors.
    fn refresh_index(&mut self) -> Result<()>;

    /// List installable identifiers, optionally restricted to one category.
    /// Returns raw newline-separated text for the caller to sanitize.
    fn list_items(&mut self, category: Option<Category>) -> Result<String>;

    /// Install a single item. Process-level failures come back as an
    /// [`InstallOutcome`]; `Err` means the tool could not be run at all.
    fn install(&mut self, item: &str) -> Result<InstallOutcome>;

    /// Full system upgrade, index refresh included.
    fn upgrade_system(&mut self) -> Result<()>;
}

/// The real pacman-backed source.
pub struct PacmanSource {
    settings: Settings,
}

impl PacmanSource {
    pub fn new(settings: &Settings) -> Self {
        PacmanSource {
            settings: settings.clone(),
        }
    }

    fn run_tool(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> anyhow::Result<CommandOutcome> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        debug!("Running {} {:?}", program, args);
        runner::run_with_timeout(&mut cmd, timeout)
    }
}

impl PackageSource for PacmanSource {
    fn ensure_trusted(&mut self) -> Result<()> {
        let conf = std::fs::read_to_string(&self.settings.pacman_conf).map_err(|e| {
            DiscoveryError::SourceRegistration(format!(
                "cannot read {}: {}",
                self.settings.pacman_conf.display(),
                e
            ))
        })?;

        if conf_declares_repo(&conf, &self.settings.repo_name) {
            debug!("Repository [{}] already registered", self.settings.repo_name);
            return Ok(());
        }

        info!("Registering [{}] repository", self.settings.repo_name);
        let key = self.settings.repo_key.as_str();
        let timeout = self.settings.index_timeout();

        for (step, args) in [
            ("initialize keyring", vec!["--init"]),
            ("fetch signing key", vec!["--recv-keys", key]),
            ("locally sign key", vec!["--lsign-key", key]),
        ] {
            let result = self.run_tool("pacman-key", &args, timeout);
            expect_success(step, result)
                .map_err(DiscoveryError::SourceRegistration)?;
        }

        let stanza = format!(
            "\n[{}]\nServer = {}\n",
            self.settings.repo_name, self.settings.repo_server
        );
        OpenOptions::new()
            .append(true)
            .open(&self.settings.pacman_conf)
            .and_then(|mut f| f.write_all(stanza.as_bytes()))
            .map_err(|e| {
                DiscoveryError::SourceRegistration(format!(
                    "cannot append to {}: {}",
                    self.settings.pacman_conf.display(),
                    e
                ))
            })?;

        info!("Repository [{}] registered", self.settings.repo_name);
        Ok(())
    }

    fn refresh_index(&mut self) -> Result<()> {
        info!("Refreshing package index");
        let result = self.run_tool(
            "pacman",
            &["-Syy", "--noconfirm"],
            self.settings.index_timeout(),
        );
        expect_success("refresh index", result).map_err(DiscoveryError::IndexRefresh)?;
        Ok(())
    }

    fn list_items(&mut self, category: Option<Category>) -> Result<String> {
        let repo = self.settings.repo_name.as_str();
        let outcome = match category {
            None => self.run_tool(
                "pacman",
                &["-Slq", repo],
                self.settings.index_timeout(),
            ),
            Some(cat) => {
                let group = cat.group_name(repo);
                self.run_tool("pacman", &["-Sgq", &group], self.settings.index_timeout())
            }
        };
        let outcome =
            expect_success("list items", outcome).map_err(DiscoveryError::IndexRefresh)?;
        Ok(outcome.stdout)
    }

    fn install(&mut self, item: &str) -> Result<InstallOutcome> {
        let outcome = self
            .run_tool(
                "pacman",
                &["-S", "--noconfirm", "--needed", "--overwrite=*", item],
                self.settings.install_timeout(),
            )
            .map_err(|e| ArsenalError::command(format!("pacman -S {}: {}", item, e)))?;

        if !outcome.success() {
            warn!("Install of {} failed: {}", item, outcome.diagnostic());
        }
        Ok(InstallOutcome::from_command(&outcome))
    }

    fn upgrade_system(&mut self) -> Result<()> {
        info!("Running full system upgrade");
        let outcome = self
            .run_tool(
                "pacman",
                &["-Syyu", "--noconfirm"],
                self.settings.upgrade_timeout(),
            )
            .map_err(|e| ArsenalError::command(format!("pacman -Syyu: {}", e)))?;

        if !outcome.success() {
            return Err(ArsenalError::command(format!(
                "system upgrade: {}",
                outcome.diagnostic()
            )));
        }
        info!("System upgrade complete");
        Ok(())
    }
}

/// Map a bounded run to its outcome, folding spawn errors and nonzero exits
/// into one failure string for the discovery error variants.
fn expect_success(
    step: &str,
    result: anyhow::Result<CommandOutcome>,
) -> std::result::Result<CommandOutcome, String> {
    match result {
        Ok(outcome) if outcome.success() => Ok(outcome),
        Ok(outcome) => Err(format!("{}: {}", step, outcome.diagnostic())),
        Err(e) => Err(format!("{}: {}", step, e)),
    }
}

/// True when pacman.conf already declares `[repo]` as a section header.
fn conf_declares_repo(conf: &str, repo: &str) -> bool {
    let header = format!("[{}]", repo);
    conf.lines().any(|line| line.trim() == header)
}
