//! Error handling for arsenalup
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Fatal errors all funnel through [`ArsenalError`]; discovery failures carry
//! their own sub-enum so callers can distinguish an empty catalog from an
//! unreachable one.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for arsenalup
#[derive(Error, Debug)]
pub enum ArsenalError {
    /// IO errors (lock file, queue file, probe reads)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Another instance holds the single-instance lock
    #[error("another instance is already running (lock file {}{})", path.display(), holder_suffix(*holder))]
    AlreadyRunning {
        path: PathBuf,
        /// Pid recorded in the existing lock file, if it parsed
        holder: Option<u32>,
    },

    /// A readiness precondition failed (privileges, disk, memory, OS, network)
    #[error("host not ready: {0}")]
    Unready(String),

    /// Discovery could not produce a usable work queue
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// An external command could not be driven at all (spawn or wait failure)
    #[error("command failed: {0}")]
    Command(String),
}

/// Failures while building the work queue
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The listing succeeded but produced zero identifiers
    #[error("package source returned no installable items for {scope}")]
    EmptySet { scope: String },

    /// Registering the repository or trusting its key failed
    #[error("failed to register the package source: {0}")]
    SourceRegistration(String),

    /// Refreshing or querying the package index failed
    #[error("failed to refresh the package index: {0}")]
    IndexRefresh(String),

    /// `--resume` was requested but no saved queue exists
    #[error("nothing to resume: no saved queue at {}", path.display())]
    ResumeUnavailable { path: PathBuf },
}

/// Result type alias for arsenalup operations
pub type Result<T> = std::result::Result<T, ArsenalError>;

// Convenient error constructors
impl ArsenalError {
    /// Create a readiness error
    pub fn unready(msg: impl Into<String>) -> Self {
        Self::Unready(msg.into())
    }

    /// Create a command error
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }
}

fn holder_suffix(holder: Option<u32>) -> String {
    match holder {
        Some(pid) => format!(", held by pid {}", pid),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ArsenalError::unready("root privileges required");
        assert_eq!(err.to_string(), "host not ready: root privileges required");

        let err = ArsenalError::command("pacman -Syy: spawn failed");
        assert_eq!(err.to_string(), "command failed: pacman -Syy: spawn failed");
    }

    #[test]
    fn test_already_running_display() {
        let err = ArsenalError::AlreadyRunning {
            path: PathBuf::from("/run/lock/arsenalup.lock"),
            holder: Some(4242),
        };
        let msg = err.to_string();
        assert!(msg.contains("/run/lock/arsenalup.lock"));
        assert!(msg.contains("held by pid 4242"));

        let err = ArsenalError::AlreadyRunning {
            path: PathBuf::from("/run/lock/arsenalup.lock"),
            holder: None,
        };
        assert!(!err.to_string().contains("held by pid"));
    }

    #[test]
    fn test_discovery_errors_pass_through() {
        let err: ArsenalError = DiscoveryError::EmptySet {
            scope: "category forensics".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "package source returned no installable items for category forensics"
        );

        let err: ArsenalError = DiscoveryError::IndexRefresh("pacman -Syy failed".to_string()).into();
        assert!(matches!(err, ArsenalError::Discovery(DiscoveryError::IndexRefresh(_))));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ArsenalError = io_err.into();
        assert!(matches!(err, ArsenalError::Io(_)));
    }
}
