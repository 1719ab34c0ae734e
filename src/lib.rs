//! arsenalup - privileged batch installer for the BlackArch tool arsenal.
//!
//! A run moves through fixed phases: acquire the single-instance lock, verify
//! host readiness, confirm with the operator, discover the ordered work queue
//! from the package source, then drive every item through a retrying,
//! timeout-bounded install loop that survives individual failures and stops
//! cleanly on signals. Unfinished work is saved so an interrupted run can be
//! resumed with `--resume`.

pub mod cli;
pub mod config;
pub mod confirm;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod lock;
pub mod logging;
pub mod orchestrator;
pub mod progress;
pub mod queue;
pub mod readiness;
pub mod report;
pub mod runner;
pub mod signals;
pub mod source;

// Re-export the types most callers need
pub use error::{ArsenalError, DiscoveryError, Result};
pub use executor::RetryPolicy;
pub use lock::InstanceLock;
pub use progress::{ProgressSnapshot, RunProgress, RunReport};
pub use queue::{ItemStatus, WorkItem, WorkQueue};
pub use signals::CancelToken;
pub use source::{Category, InstallOutcome, PackageSource, PacmanSource};
