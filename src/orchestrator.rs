//! Top-level run sequencing.
//!
//! Wires the components together in their required order: settings, instance
//! lock, logging, signals, readiness, confirmation, optional upgrade,
//! discovery, the execution loop, and the final report. Every failure path
//! maps to a process exit code here; nothing below this module decides one.
//!
//! The lock is taken before logging is initialized on purpose: a contending
//! instance must exit without rotating or truncating the files the running
//! instance is still writing.

use crate::cli::Cli;
use crate::config::Settings;
use crate::confirm::{self, ConfirmOutcome};
use crate::discovery;
use crate::error::Result;
use crate::executor::{self, RetryPolicy};
use crate::lock::InstanceLock;
use crate::logging;
use crate::progress::RunProgress;
use crate::queue::WorkQueue;
use crate::readiness;
use crate::report::Reporter;
use crate::signals::{self, CancelToken};
use crate::source::{Category, PackageSource, PacmanSource};
use log::{error, info, warn};
use std::path::Path;
use std::str::FromStr;

/// Run completed; item-level failures do not change this.
pub const EXIT_OK: i32 = 0;
/// Precondition failure, discovery failure, or cancellation.
pub const EXIT_FAILURE: i32 = 1;

/// Entry point behind `main`. Returns the process exit code.
pub fn run(cli: &Cli) -> i32 {
    let settings = match Settings::load_or_default(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ ERROR: {:#}", e);
            return EXIT_FAILURE;
        }
    };

    let category = match parse_category(cli.category.as_deref()) {
        Ok(category) => category,
        Err(message) => {
            eprintln!("❌ ERROR: {}", message);
            return EXIT_FAILURE;
        }
    };

    let mut reporter = Reporter::new(settings.render_interval());

    let lock = match InstanceLock::acquire(&settings.lock_path) {
        Ok(lock) => lock,
        Err(e) => {
            reporter.fatal(&e.to_string());
            return EXIT_FAILURE;
        }
    };

    if let Err(e) = logging::init(&settings.log_path, cli.verbose) {
        reporter.fatal(&format!("{:#}", e));
        return EXIT_FAILURE;
    }
    info!(
        "arsenalup {} starting (pid {})",
        env!("CARGO_PKG_VERSION"),
        std::process::id()
    );

    let cancel = CancelToken::new();
    if let Err(e) = signals::install(&cancel) {
        // Degraded but workable: Ctrl-C will be abrupt instead of graceful
        warn!("Could not install signal handlers: {}", e);
    }

    let exit = execute(cli, &settings, category, &cancel, &mut reporter);
    lock.release();
    exit
}

fn execute(
    cli: &Cli,
    settings: &Settings,
    category: Option<Category>,
    cancel: &CancelToken,
    reporter: &mut Reporter,
) -> i32 {
    let profile = match readiness::check(settings) {
        Ok(profile) => profile,
        Err(e) => {
            error!("Readiness check failed: {}", e);
            reporter.fatal(&e.to_string());
            return EXIT_FAILURE;
        }
    };
    info!("Host ready: {}", profile.summary());

    reporter.banner(category, cli.resume);

    if !cli.noconfirm {
        let outcome = confirm::require_confirmation(settings.confirm_timeout());
        if !outcome.accepted() {
            let message = match outcome {
                ConfirmOutcome::TimedOut => "Confirmation timed out; nothing was changed.",
                _ => "Confirmation declined; nothing was changed.",
            };
            warn!("{}", message);
            reporter.announce(message);
            return EXIT_FAILURE;
        }
        info!("Operator confirmed the run");
    }

    let mut source = PacmanSource::new(settings);
    run_installation(cli, settings, category, cancel, reporter, &mut source)
}

/// The post-confirmation phases of a run, driven against `source`.
///
/// The cancellation token is checked between phases: an interrupt delivered
/// during one phase stops the run before the next host-mutating phase
/// starts. Returns the process exit code.
pub fn run_installation(
    cli: &Cli,
    settings: &Settings,
    category: Option<Category>,
    cancel: &CancelToken,
    reporter: &mut Reporter,
    source: &mut dyn PackageSource,
) -> i32 {
    if stop_requested(cancel, reporter) {
        return EXIT_FAILURE;
    }

    if cli.upgrade {
        reporter.announce("Upgrading system before arsenal installation...");
        if let Err(e) = source.upgrade_system() {
            error!("System upgrade failed: {}", e);
            reporter.fatal(&e.to_string());
            return EXIT_FAILURE;
        }
        reporter.announce("System upgrade complete.");
    }

    if stop_requested(cancel, reporter) {
        return EXIT_FAILURE;
    }

    let mut queue = match build_queue(cli, settings, category, source) {
        Ok(queue) => queue,
        Err(e) => {
            error!("Discovery failed: {}", e);
            reporter.fatal(&e.to_string());
            return EXIT_FAILURE;
        }
    };

    // Persist the full queue up front so even a hard crash leaves a resumable file
    match queue.save_unfinished(&settings.queue_path) {
        Ok(count) => info!("Saved {} queued items to {:?}", count, settings.queue_path),
        Err(e) => warn!("Could not save work queue: {:#}", e),
    }

    let policy = RetryPolicy::from(settings);
    let mut progress = RunProgress::new(queue.len(), cancel.clone());
    reporter.announce(&format!("Processing {} items...", queue.len()));

    let report = executor::run(&mut queue, source, policy, &mut progress, reporter);

    if queue.unfinished().is_empty() {
        clear_saved_queue(&settings.queue_path);
    } else {
        match queue.save_unfinished(&settings.queue_path) {
            Ok(count) => info!(
                "Saved {} unfinished items to {:?}",
                count, settings.queue_path
            ),
            Err(e) => warn!("Could not save unfinished queue: {:#}", e),
        }
    }

    if let Err(e) = reporter.summarize(&report, category, &settings.report_path) {
        warn!("Could not write run report: {}", e);
    }

    if report.cancelled {
        reporter.announce("Run cancelled; rerun with --resume to pick up where it stopped.");
        return EXIT_FAILURE;
    }
    EXIT_OK
}

fn build_queue(
    cli: &Cli,
    settings: &Settings,
    category: Option<Category>,
    source: &mut dyn PackageSource,
) -> Result<WorkQueue> {
    if cli.resume {
        discovery::load_saved(&settings.queue_path)
    } else {
        discovery::discover(source, category)
    }
}

/// True when cancellation was requested; reports the stop when it was.
fn stop_requested(cancel: &CancelToken, reporter: &mut Reporter) -> bool {
    if !cancel.is_tripped() {
        return false;
    }
    warn!("Cancellation requested; stopping before the next phase");
    reporter.announce("Run cancelled; no items were processed.");
    true
}

fn parse_category(raw: Option<&str>) -> std::result::Result<Option<Category>, String> {
    match raw {
        None => Ok(None),
        Some(name) => Category::from_str(name).map(Some).map_err(|_| {
            format!(
                "unknown category '{}' (expected one of: {})",
                name,
                Category::valid_names().join(", ")
            )
        }),
    }
}

fn clear_saved_queue(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => info!("Removed saved queue {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove saved queue {:?}: {}", path, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_category_accepts_known_names() {
        assert_eq!(parse_category(None).unwrap(), None);
        assert_eq!(
            parse_category(Some("forensics")).unwrap(),
            Some(Category::Forensics)
        );
        assert_eq!(
            parse_category(Some("information-gathering")).unwrap(),
            Some(Category::InformationGathering)
        );
    }

    #[test]
    fn test_parse_category_lists_valid_names_on_error() {
        let message = parse_category(Some("webapps")).unwrap_err();
        assert!(message.contains("webapps"));
        assert!(message.contains("web-applications"));
    }
}
