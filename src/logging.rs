//! Log-file setup with single-generation rotation.
//!
//! Each run writes a fresh log file; the previous run's log is moved aside to
//! `<log>.bak` first, keeping exactly one generation of history. The console
//! stays reserved for the progress line and summary, so log records go to the
//! file only.

use anyhow::{Context, Result};
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Move an existing file aside to `<path>.bak`.
///
/// Returns the backup path when a rotation happened, `None` when there was
/// nothing to rotate.
pub fn rotate_existing(path: &Path) -> std::io::Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut backup = OsString::from(path.as_os_str());
    backup.push(".bak");
    let backup = PathBuf::from(backup);

    fs::rename(path, &backup)?;
    Ok(Some(backup))
}

/// Initialize file logging for this run.
///
/// Must be called after the instance lock is held: rotation replaces the
/// previous `.bak`, and only the lock holder may touch the shared log files.
pub fn init(log_path: &Path, verbose: bool) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {:?}", parent))?;
    }

    let rotated = rotate_existing(log_path)
        .with_context(|| format!("Failed to rotate previous log {:?}", log_path))?;

    let file = File::create(log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(level)
        .parse_default_env() // Allows RUST_LOG env var to override
        .target(Target::Pipe(Box::new(file)))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    if let Some(backup) = rotated {
        log::info!("Previous log rotated to {:?}", backup);
    }
    Ok(())
}
