//! Host readiness checks.
//!
//! All checks run before anything on the host is touched, in a fixed order
//! that fails fast on the cheapest problem first: privilege, disk, memory,
//! OS identity, network, package-manager availability. Every failure produces
//! an operator-facing reason; the checks themselves are read-only.

use crate::config::Settings;
use crate::error::{ArsenalError, Result};
use log::debug;
use nix::sys::statvfs::statvfs;
use nix::unistd::geteuid;
use std::fs;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

// Pinned DNS endpoints so the probe tests routing, not name resolution
const NETWORK_PROBE_ADDRS: &[&str] = &["8.8.8.8:53", "1.1.1.1:53", "9.9.9.9:53"];
const NETWORK_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Read-only snapshot of the host taken before any mutating work.
#[derive(Debug, Clone)]
pub struct HostProfile {
    pub is_root: bool,
    pub disk_free_bytes: u64,
    pub mem_available_bytes: u64,
    pub os_name: String,
    /// `None` when the probe was skipped by configuration.
    pub network_ok: Option<bool>,
}

impl HostProfile {
    /// One-line description for the run log.
    pub fn summary(&self) -> String {
        format!(
            "root={} disk_free={} mem_available={} os={:?} network={}",
            self.is_root,
            humanize_bytes(self.disk_free_bytes),
            humanize_bytes(self.mem_available_bytes),
            self.os_name,
            match self.network_ok {
                Some(true) => "ok",
                Some(false) => "unreachable",
                None => "skipped",
            }
        )
    }
}

/// Verify the host can take an arsenal run, short-circuiting on the first
/// failed check.
pub fn check(settings: &Settings) -> Result<HostProfile> {
    if !geteuid().is_root() {
        return Err(ArsenalError::unready(
            "root privileges required; rerun with sudo",
        ));
    }

    let disk_free_bytes = free_disk_bytes("/")?;
    if disk_free_bytes < settings.min_disk_bytes {
        return Err(ArsenalError::unready(format!(
            "insufficient disk space: {} free, {} required",
            humanize_bytes(disk_free_bytes),
            humanize_bytes(settings.min_disk_bytes)
        )));
    }

    let meminfo = fs::read_to_string("/proc/meminfo")?;
    let mem_available_bytes = parse_mem_available(&meminfo)
        .ok_or_else(|| ArsenalError::unready("cannot determine available memory"))?;
    if mem_available_bytes < settings.min_mem_bytes {
        return Err(ArsenalError::unready(format!(
            "insufficient memory: {} available, {} required",
            humanize_bytes(mem_available_bytes),
            humanize_bytes(settings.min_mem_bytes)
        )));
    }

    let os_release = fs::read_to_string("/etc/os-release")
        .map_err(|e| ArsenalError::unready(format!("cannot read /etc/os-release: {}", e)))?;
    if !is_supported_os(&os_release) {
        return Err(ArsenalError::unready(
            "unsupported distribution: an Arch-based system is required",
        ));
    }
    let os_name = os_release_field(&os_release, "PRETTY_NAME")
        .or_else(|| os_release_field(&os_release, "NAME"))
        .unwrap_or("unknown")
        .to_string();

    let network_ok = if settings.skip_network_check {
        debug!("Network probe skipped by configuration");
        None
    } else if probe_network() {
        Some(true)
    } else {
        return Err(ArsenalError::unready(
            "no network connectivity: cannot reach any probe endpoint",
        ));
    };

    if settings.pacman_db_lock.exists() {
        return Err(ArsenalError::unready(format!(
            "package manager is busy ({} exists); wait for it or remove a stale lock",
            settings.pacman_db_lock.display()
        )));
    }

    Ok(HostProfile {
        is_root: true,
        disk_free_bytes,
        mem_available_bytes,
        os_name,
        network_ok,
    })
}

/// Free bytes on the filesystem holding `path`, as seen by an unprivileged
/// writer (f_bavail, not f_bfree).
fn free_disk_bytes(path: &str) -> Result<u64> {
    let stat = statvfs(path)
        .map_err(|e| ArsenalError::unready(format!("cannot stat {}: {}", path, e)))?;
    Ok(stat.fragment_size() as u64 * stat.blocks_available() as u64)
}

/// Available memory in bytes from /proc/meminfo. Falls back to MemFree on
/// kernels without MemAvailable.
fn parse_mem_available(meminfo: &str) -> Option<u64> {
    meminfo_field(meminfo, "MemAvailable")
        .or_else(|| meminfo_field(meminfo, "MemFree"))
        .map(|kib| kib * 1024)
}

fn meminfo_field(meminfo: &str, field: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        line.strip_prefix(field)
            .and_then(|rest| rest.strip_prefix(':'))
            .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse().ok())
    })
}

fn os_release_field<'a>(content: &'a str, key: &str) -> Option<&'a str> {
    content.lines().find_map(|line| {
        line.strip_prefix(key)
            .and_then(|rest| rest.strip_prefix('='))
            .map(|value| value.trim().trim_matches('"'))
    })
}

/// Arch and derivatives only: ID is arch/blackarch, or ID_LIKE names arch.
fn is_supported_os(os_release: &str) -> bool {
    let id = os_release_field(os_release, "ID").unwrap_or("");
    if id == "arch" || id == "blackarch" {
        return true;
    }
    os_release_field(os_release, "ID_LIKE")
        .map(|like| like.split_whitespace().any(|token| token == "arch"))
        .unwrap_or(false)
}

fn probe_network() -> bool {
    for addr in NETWORK_PROBE_ADDRS {
        let Ok(sockaddr) = addr.parse::<SocketAddr>() else {
            continue;
        };
        match TcpStream::connect_timeout(&sockaddr, NETWORK_PROBE_TIMEOUT) {
            Ok(_) => {
                debug!("Network probe reached {}", addr);
                return true;
            }
            Err(e) => debug!("Network probe to {} failed: {}", addr, e),
        }
    }
    false
}

fn humanize_bytes(bytes: u64) -> String {
    const GIB: u64 = 1024 * 1024 * 1024;
    const MIB: u64 = 1024 * 1024;
    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else {
        format!("{} B", bytes)
    }
}
