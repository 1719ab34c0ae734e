//! The install loop: retries, backoff, and cancellation.
//!
//! Items are processed strictly in queue order, one at a time. A failing item
//! is retried up to the policy ceiling with a linearly growing pause between
//! attempts; an item that exhausts its attempts is recorded as failed and the
//! run moves on. Item failures never abort the run, only cancellation does.
//!
//! # Design
//!
//! Cancellation is polled, never preemptive. An in-flight install attempt
//! always runs to its own outcome (bounded by the hard timeout); the flag is
//! checked between items and during backoff pauses. An item interrupted
//! between attempts is requeued as pending so a resumed run retries it from
//! scratch.

use crate::config::Settings;
use crate::progress::{RunProgress, RunReport};
use crate::queue::WorkQueue;
use crate::report::Reporter;
use crate::source::PackageSource;
use log::{debug, info, warn};
use std::thread;
use std::time::{Duration, Instant};

/// How often backoff pauses re-check the cancellation flag.
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Retry ceiling and backoff shape for install attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Pause before the attempt after `attempt`. Grows linearly, so attempt 1
    /// waits one base interval, attempt 2 waits two.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.backoff_base * attempt
    }
}

impl From<&Settings> for RetryPolicy {
    fn from(settings: &Settings) -> Self {
        RetryPolicy {
            max_attempts: settings.max_attempts,
            backoff_base: settings.backoff_base(),
        }
    }
}

/// Drive the queue to completion or cancellation, returning the final report.
pub fn run(
    queue: &mut WorkQueue,
    source: &mut dyn PackageSource,
    policy: RetryPolicy,
    progress: &mut RunProgress,
    reporter: &mut Reporter,
) -> RunReport {
    let total = queue.len();

    for idx in 0..total {
        if progress.is_cancelled() {
            info!("Cancellation observed, stopping before item {}", idx + 1);
            break;
        }

        let name = queue.items()[idx].name().to_string();
        progress.set_current(&name);
        reporter.render(&progress.snapshot(), false);

        if !run_item(idx, &name, queue, source, policy, progress, reporter) {
            // Interrupted between attempts: back to pending for a resume
            queue.items_mut()[idx].requeue();
            break;
        }
    }

    let report = RunReport::from_queue(queue, progress.is_cancelled(), progress.elapsed());
    info!(
        "Run finished: {}/{} succeeded, {} failed, {} unresolved, cancelled={}",
        report.succeeded,
        report.total,
        report.failed_count(),
        report.pending.len(),
        report.cancelled
    );
    report
}

/// Process one item through its retry loop.
///
/// Returns `false` when cancellation interrupted the item between attempts;
/// the caller requeues it and stops the run.
fn run_item(
    idx: usize,
    name: &str,
    queue: &mut WorkQueue,
    source: &mut dyn PackageSource,
    policy: RetryPolicy,
    progress: &mut RunProgress,
    reporter: &mut Reporter,
) -> bool {
    loop {
        if progress.is_cancelled() {
            return false;
        }

        if let Err(e) = queue.items_mut()[idx].begin_attempt() {
            // Transition bug; skip the item rather than wedge the run
            warn!("Skipping {}: {}", name, e);
            return true;
        }
        let attempt = queue.items_mut()[idx].attempts();
        info!(
            "Installing {} (attempt {}/{})",
            name, attempt, policy.max_attempts
        );

        let (succeeded, diagnostic) = match source.install(name) {
            Ok(outcome) if outcome.success() => (true, String::new()),
            Ok(outcome) => (false, outcome.diagnostic),
            Err(e) => (false, e.to_string()),
        };

        if succeeded {
            if let Err(e) = queue.items_mut()[idx].mark_succeeded() {
                warn!("Bookkeeping error for {}: {}", name, e);
            }
            info!("Installed {}", name);
            progress.complete_one();
            reporter.render(
                &progress.snapshot(),
                progress.processed() == progress.total(),
            );
            return true;
        }

        warn!(
            "Attempt {}/{} for {} failed: {}",
            attempt, policy.max_attempts, name, diagnostic
        );
        if let Err(e) = queue.items_mut()[idx].mark_failed(diagnostic) {
            warn!("Bookkeeping error for {}: {}", name, e);
        }

        if attempt >= policy.max_attempts {
            warn!(
                "Giving up on {} after {} attempts",
                name, policy.max_attempts
            );
            progress.complete_one();
            reporter.render(
                &progress.snapshot(),
                progress.processed() == progress.total(),
            );
            return true;
        }

        let pause = policy.backoff_after(attempt);
        debug!("Backing off {:?} before retrying {}", pause, name);
        if sleep_cancellable(pause, progress) {
            return false;
        }
    }
}

/// Sleep in short slices, returning `true` if cancellation arrived.
fn sleep_cancellable(delay: Duration, progress: &RunProgress) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if progress.is_cancelled() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        let remaining = deadline.saturating_duration_since(now);
        thread::sleep(CANCEL_POLL.min(remaining));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::queue::ItemStatus;
    use crate::signals::CancelToken;
    use crate::source::{Category, InstallOutcome};
    use std::collections::HashMap;

    /// Source with pre-scripted install outcomes per item name.
    /// Unscripted installs succeed; scripted outcomes are consumed in order.
    struct ScriptedSource {
        outcomes: HashMap<String, Vec<InstallOutcome>>,
        install_calls: Vec<String>,
        trip_on: Option<(String, CancelToken)>,
    }

    impl ScriptedSource {
        fn new() -> Self {
            ScriptedSource {
                outcomes: HashMap::new(),
                install_calls: Vec::new(),
                trip_on: None,
            }
        }

        fn script(mut self, name: &str, outcomes: Vec<InstallOutcome>) -> Self {
            self.outcomes.insert(name.to_string(), outcomes);
            self
        }

        fn trip_when_installing(mut self, name: &str, token: &CancelToken) -> Self {
            self.trip_on = Some((name.to_string(), token.clone()));
            self
        }
    }

    impl PackageSource for ScriptedSource {
        fn ensure_trusted(&mut self) -> Result<()> {
            Ok(())
        }

        fn refresh_index(&mut self) -> Result<()> {
            Ok(())
        }

        fn list_items(&mut self, _category: Option<Category>) -> Result<String> {
            Ok(String::new())
        }

        fn install(&mut self, item: &str) -> Result<InstallOutcome> {
            self.install_calls.push(item.to_string());
            if let Some((name, token)) = &self.trip_on {
                if name == item {
                    token.trip();
                }
            }
            let outcome = self
                .outcomes
                .get_mut(item)
                .and_then(|queued| {
                    if queued.is_empty() {
                        None
                    } else {
                        Some(queued.remove(0))
                    }
                })
                .unwrap_or_else(InstallOutcome::ok);
            Ok(outcome)
        }

        fn upgrade_system(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::ZERO,
        }
    }

    fn quiet_reporter() -> Reporter {
        Reporter::new(Duration::from_secs(3600))
    }

    // ==================== Policy ====================

    #[test]
    fn test_backoff_grows_linearly() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
        };
        assert_eq!(policy.backoff_after(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_after(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_after(3), Duration::from_secs(6));
    }

    #[test]
    fn test_policy_from_settings() {
        let settings = Settings::default();
        let policy = RetryPolicy::from(&settings);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff_base, Duration::from_secs(2));
    }

    // ==================== Run Loop ====================

    #[test]
    fn test_all_items_succeed_first_try() {
        let mut queue = WorkQueue::from_identifiers(["a", "b", "c"]);
        let mut source = ScriptedSource::new();
        let mut progress = RunProgress::new(queue.len(), CancelToken::new());

        let report = run(
            &mut queue,
            &mut source,
            fast_policy(),
            &mut progress,
            &mut quiet_reporter(),
        );

        assert!(report.fully_succeeded());
        assert_eq!(report.succeeded, 3);
        assert_eq!(source.install_calls, vec!["a", "b", "c"]);
        assert!(queue.items().iter().all(|i| i.attempts() == 1));
    }

    #[test]
    fn test_transient_failure_is_retried_to_success() {
        let mut queue = WorkQueue::from_identifiers(["flaky"]);
        let mut source = ScriptedSource::new().script(
            "flaky",
            vec![
                InstallOutcome::failed(1, "mirror timeout"),
                InstallOutcome::failed(1, "mirror timeout"),
            ],
        );
        let mut progress = RunProgress::new(queue.len(), CancelToken::new());

        let report = run(
            &mut queue,
            &mut source,
            fast_policy(),
            &mut progress,
            &mut quiet_reporter(),
        );

        assert!(report.fully_succeeded());
        assert_eq!(queue.items()[0].attempts(), 3);
        assert_eq!(queue.items()[0].status(), ItemStatus::Succeeded);
    }

    #[test]
    fn test_exhausted_item_fails_without_stopping_the_run() {
        let mut queue = WorkQueue::from_identifiers(["broken", "fine"]);
        let mut source = ScriptedSource::new().script(
            "broken",
            vec![
                InstallOutcome::failed(1, "no such package"),
                InstallOutcome::failed(1, "no such package"),
                InstallOutcome::failed(1, "no such package"),
            ],
        );
        let mut progress = RunProgress::new(queue.len(), CancelToken::new());

        let report = run(
            &mut queue,
            &mut source,
            fast_policy(),
            &mut progress,
            &mut quiet_reporter(),
        );

        assert!(!report.fully_succeeded());
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.failed[0].name, "broken");
        assert_eq!(report.failed[0].error, "no such package");
        assert_eq!(queue.items()[0].attempts(), 3);
        // The run carried on to the next item
        assert!(source.install_calls.contains(&"fine".to_string()));
        assert!(!report.cancelled);
    }

    #[test]
    fn test_timeout_outcome_counts_as_failed_attempt() {
        let mut queue = WorkQueue::from_identifiers(["slow"]);
        let mut source =
            ScriptedSource::new().script("slow", vec![InstallOutcome::timed_out()]);
        let mut progress = RunProgress::new(queue.len(), CancelToken::new());

        run(
            &mut queue,
            &mut source,
            fast_policy(),
            &mut progress,
            &mut quiet_reporter(),
        );

        // Timed out once, then the retries succeeded
        assert_eq!(queue.items()[0].status(), ItemStatus::Succeeded);
        assert_eq!(queue.items()[0].attempts(), 2);
    }

    #[test]
    fn test_cancel_before_start_processes_nothing() {
        let mut queue = WorkQueue::from_identifiers(["a", "b"]);
        let mut source = ScriptedSource::new();
        let cancel = CancelToken::new();
        cancel.trip();
        let mut progress = RunProgress::new(queue.len(), cancel);

        let report = run(
            &mut queue,
            &mut source,
            fast_policy(),
            &mut progress,
            &mut quiet_reporter(),
        );

        assert!(report.cancelled);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.pending, vec!["a", "b"]);
        assert!(source.install_calls.is_empty());
    }

    #[test]
    fn test_cancel_mid_run_requeues_interrupted_item() {
        let mut queue = WorkQueue::from_identifiers(["a", "b", "c"]);
        let cancel = CancelToken::new();
        let mut source = ScriptedSource::new()
            .script("b", vec![InstallOutcome::failed(1, "interrupted")])
            .trip_when_installing("b", &cancel);
        let mut progress = RunProgress::new(queue.len(), cancel);

        let report = run(
            &mut queue,
            &mut source,
            fast_policy(),
            &mut progress,
            &mut quiet_reporter(),
        );

        assert!(report.cancelled);
        assert_eq!(report.succeeded, 1);
        // The interrupted item went back to pending instead of failed
        assert_eq!(queue.items()[1].status(), ItemStatus::Pending);
        assert_eq!(queue.items()[1].attempts(), 1);
        assert_eq!(report.pending, vec!["b", "c"]);
        // No attempt was ever started on the item after the interrupted one
        assert!(!source.install_calls.contains(&"c".to_string()));
    }

    #[test]
    fn test_sleep_cancellable_notices_trip() {
        let cancel = CancelToken::new();
        let progress = RunProgress::new(1, cancel.clone());

        assert!(!sleep_cancellable(Duration::from_millis(1), &progress));
        cancel.trip();
        assert!(sleep_cancellable(Duration::from_secs(60), &progress));
    }
}
