//! Single-instance lock file.
//!
//! Two concurrent runs would race each other on the pacman database, the saved
//! queue, and the log files, so exactly one instance may hold the lock at a
//! time. The lock is a plain file created with `create_new`, which the kernel
//! guarantees is atomic: whichever process wins the create owns the run.
//!
//! # Design
//!
//! - The file holds the owner's PID for diagnostics only; it is never used to
//!   decide staleness. A leftover lock after a crash must be removed by hand,
//!   which is the safe choice for a tool that mutates the package database.
//! - `Drop` releases the lock so early returns and panics do not leave the
//!   file behind while the process is still exiting.

use crate::error::{ArsenalError, Result};
use log::{debug, warn};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Guard for the single-instance lock file.
///
/// Acquired once at startup, before any file the tool owns is touched.
/// Released explicitly at the end of the run, or implicitly on drop.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    released: bool,
}

impl InstanceLock {
    /// Atomically create the lock file, failing if another instance holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                // PID is advisory, for the operator inspecting a stuck lock
                if let Err(e) = writeln!(file, "{}", std::process::id()) {
                    warn!("Failed to record PID in lock file {:?}: {}", path, e);
                }
                debug!("Acquired instance lock at {:?}", path);
                Ok(InstanceLock {
                    path: path.to_path_buf(),
                    released: false,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(ArsenalError::AlreadyRunning {
                    path: path.to_path_buf(),
                    holder: read_holder_pid(path),
                })
            }
            Err(e) => Err(ArsenalError::Io(e)),
        }
    }

    /// Release the lock, removing the file.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove lock file {:?}: {}", self.path, e);
        } else {
            debug!("Released instance lock at {:?}", self.path);
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Best-effort read of the PID recorded by the lock holder.
fn read_holder_pid(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_writes_own_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.lock");

        let lock = InstanceLock::acquire(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());
        lock.release();
        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_reports_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.lock");

        let _lock = InstanceLock::acquire(&path).unwrap();
        match InstanceLock::acquire(&path) {
            Err(ArsenalError::AlreadyRunning { holder, .. }) => {
                assert_eq!(holder, Some(std::process::id()));
            }
            other => panic!("expected AlreadyRunning, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_drop_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.lock");

        {
            let _lock = InstanceLock::acquire(&path).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());

        // Reacquire succeeds after the previous guard is gone
        let lock = InstanceLock::acquire(&path).unwrap();
        lock.release();
    }

    #[test]
    fn test_foreign_lock_without_pid_reports_no_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.lock");
        fs::write(&path, "not a pid\n").unwrap();

        match InstanceLock::acquire(&path) {
            Err(ArsenalError::AlreadyRunning { holder, .. }) => assert_eq!(holder, None),
            other => panic!("expected AlreadyRunning, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_acquire_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("test.lock");

        let lock = InstanceLock::acquire(&path).unwrap();
        assert!(path.exists());
        lock.release();
    }
}
