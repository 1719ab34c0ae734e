//! Run progress tracking and the final run report.
//!
//! [`RunProgress`] is the executor's live counter; [`RunReport`] is the
//! immutable summary derived from the queue once the run ends. The reporter
//! renders snapshots of the former during the run and the latter at the end.

use crate::queue::{ItemStatus, WorkQueue};
use crate::signals::CancelToken;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Live counters for a run in flight.
pub struct RunProgress {
    total: usize,
    processed: usize,
    current: Option<String>,
    cancel: CancelToken,
    started: Instant,
}

impl RunProgress {
    pub fn new(total: usize, cancel: CancelToken) -> Self {
        RunProgress {
            total,
            processed: 0,
            current: None,
            cancel,
            started: Instant::now(),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Items fully resolved so far, succeeded or permanently failed.
    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_tripped()
    }

    pub fn set_current(&mut self, name: &str) {
        self.current = Some(name.to_string());
    }

    /// Count one item as resolved.
    pub fn complete_one(&mut self) {
        debug_assert!(self.processed < self.total);
        if self.processed < self.total {
            self.processed += 1;
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total,
            processed: self.processed,
            current: self.current.clone(),
            cancelled: self.is_cancelled(),
            elapsed: self.elapsed(),
        }
    }
}

/// Point-in-time view of the run, safe to hand to the renderer.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub processed: usize,
    pub current: Option<String>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Completion percentage, 0.0 for an empty run.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.processed as f64 / self.total as f64) * 100.0
        }
    }
}

/// One permanently failed item with its last diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct FailedItem {
    pub name: String,
    pub error: String,
}

/// Final accounting for a finished (or cancelled) run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedItem>,
    /// Items never resolved, in queue order. Empty unless cancelled.
    pub pending: Vec<String>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl RunReport {
    /// Derive the report from the queue's final state.
    pub fn from_queue(queue: &WorkQueue, cancelled: bool, elapsed: Duration) -> Self {
        let mut succeeded = 0;
        let mut failed = Vec::new();
        let mut pending = Vec::new();

        for item in queue.items() {
            match item.status() {
                ItemStatus::Succeeded => succeeded += 1,
                ItemStatus::Failed => failed.push(FailedItem {
                    name: item.name().to_string(),
                    error: item
                        .last_error()
                        .unwrap_or("unknown failure")
                        .to_string(),
                }),
                ItemStatus::Pending | ItemStatus::InProgress => {
                    pending.push(item.name().to_string());
                }
            }
        }

        RunReport {
            total: queue.len(),
            succeeded,
            failed,
            pending,
            cancelled,
            elapsed,
        }
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Success rate over the whole queue, 0.0 for an empty run.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }

    /// True when every item succeeded and nothing was cut short.
    pub fn fully_succeeded(&self) -> bool {
        !self.cancelled && self.succeeded == self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_counts_toward_total() {
        let mut progress = RunProgress::new(3, CancelToken::new());
        assert_eq!(progress.processed(), 0);

        progress.set_current("nmap");
        progress.complete_one();
        progress.complete_one();

        let snap = progress.snapshot();
        assert_eq!(snap.processed, 2);
        assert_eq!(snap.total, 3);
        assert_eq!(snap.current.as_deref(), Some("nmap"));
        assert!(!snap.cancelled);
    }

    #[test]
    fn test_snapshot_reflects_cancellation() {
        let cancel = CancelToken::new();
        let progress = RunProgress::new(1, cancel.clone());
        assert!(!progress.snapshot().cancelled);
        cancel.trip();
        assert!(progress.snapshot().cancelled);
    }

    #[test]
    fn test_percent_handles_empty_run() {
        let progress = RunProgress::new(0, CancelToken::new());
        assert_eq!(progress.snapshot().percent(), 0.0);

        let mut progress = RunProgress::new(4, CancelToken::new());
        progress.complete_one();
        assert!((progress.snapshot().percent() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_report_from_queue_buckets_by_status() {
        let mut queue = WorkQueue::from_identifiers(["a", "b", "c", "d"]);
        {
            let items = queue.items_mut();
            items[0].begin_attempt().unwrap();
            items[0].mark_succeeded().unwrap();
            items[1].begin_attempt().unwrap();
            items[1].mark_failed("exit code 1").unwrap();
        }

        let report = RunReport::from_queue(&queue, true, Duration::from_secs(5));
        assert_eq!(report.total, 4);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.failed[0].name, "b");
        assert_eq!(report.failed[0].error, "exit code 1");
        assert_eq!(report.pending, vec!["c", "d"]);
        assert!(report.cancelled);
        assert!(!report.fully_succeeded());
    }

    #[test]
    fn test_fully_succeeded_requires_clean_sweep() {
        let mut queue = WorkQueue::from_identifiers(["a", "b"]);
        for item in queue.items_mut() {
            item.begin_attempt().unwrap();
            item.mark_succeeded().unwrap();
        }

        let clean = RunReport::from_queue(&queue, false, Duration::from_secs(1));
        assert!(clean.fully_succeeded());
        assert!((clean.success_rate() - 100.0).abs() < f64::EPSILON);

        let cancelled = RunReport::from_queue(&queue, true, Duration::from_secs(1));
        assert!(!cancelled.fully_succeeded());
    }
}
