//! Work queue and per-item lifecycle.
//!
//! Discovery produces an ordered queue of [`WorkItem`]s; the executor walks it
//! strictly in order, one item at a time. Each item tracks its own attempt
//! count and last failure so the final report can explain what happened
//! without consulting the log.
//!
//! # Design
//!
//! State transitions are guarded: an item can only enter `InProgress` from
//! `Pending` or `Failed` (a retry), and only leave it via an explicit success
//! or failure mark. Invalid transitions are bugs in the caller, surfaced as
//! [`TransitionError`] rather than silently corrupting the run accounting.
//!
//! `Succeeded` is terminal. Cancellation uses [`WorkItem::requeue`] to put an
//! interrupted item back to `Pending` so a resumed run picks it up again.

use log::warn;
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;
use strum::Display;
use thiserror::Error;

/// Lifecycle state of a single queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ItemStatus {
    /// Not yet attempted in this run.
    #[strum(to_string = "pending")]
    Pending,
    /// An install attempt is currently running.
    #[strum(to_string = "in progress")]
    InProgress,
    /// Installed successfully. Terminal.
    #[strum(to_string = "succeeded")]
    Succeeded,
    /// Last attempt failed; may be retried.
    #[strum(to_string = "failed")]
    Failed,
}

/// Invalid lifecycle transition, always a caller bug.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// Attempt started on an item that is not startable.
    #[error("cannot start attempt on '{name}' while {status}")]
    NotStartable { name: String, status: ItemStatus },

    /// Success or failure marked without a running attempt.
    #[error("no attempt in progress for '{name}' (status: {status})")]
    NoAttemptInProgress { name: String, status: ItemStatus },
}

/// One installable identifier with its run-local bookkeeping.
#[derive(Debug, Clone)]
pub struct WorkItem {
    name: String,
    status: ItemStatus,
    attempts: u32,
    last_error: Option<String>,
    resolved_at: Option<Instant>,
}

impl WorkItem {
    pub fn new(name: impl Into<String>) -> Self {
        WorkItem {
            name: name.into(),
            status: ItemStatus::Pending,
            attempts: 0,
            last_error: None,
            resolved_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    /// Attempts started so far, including the one in progress.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// When the most recent attempt resolved (success or failure).
    /// `None` while pending or in progress.
    pub fn resolved_at(&self) -> Option<Instant> {
        self.resolved_at
    }

    /// Begin a new attempt. Valid from `Pending` (first try) and `Failed`
    /// (retry); counts the attempt immediately.
    pub fn begin_attempt(&mut self) -> Result<(), TransitionError> {
        match self.status {
            ItemStatus::Pending | ItemStatus::Failed => {
                self.status = ItemStatus::InProgress;
                self.attempts += 1;
                self.resolved_at = None;
                Ok(())
            }
            status => Err(TransitionError::NotStartable {
                name: self.name.clone(),
                status,
            }),
        }
    }

    /// Mark the running attempt as succeeded.
    pub fn mark_succeeded(&mut self) -> Result<(), TransitionError> {
        self.expect_in_progress()?;
        self.status = ItemStatus::Succeeded;
        self.last_error = None;
        self.resolved_at = Some(Instant::now());
        Ok(())
    }

    /// Mark the running attempt as failed, recording the diagnostic.
    pub fn mark_failed(&mut self, diagnostic: impl Into<String>) -> Result<(), TransitionError> {
        self.expect_in_progress()?;
        self.status = ItemStatus::Failed;
        self.last_error = Some(diagnostic.into());
        self.resolved_at = Some(Instant::now());
        Ok(())
    }

    /// Put a non-succeeded item back to `Pending`, e.g. when cancellation
    /// interrupts it between attempts. Attempt count is preserved.
    pub fn requeue(&mut self) {
        if self.status != ItemStatus::Succeeded {
            self.status = ItemStatus::Pending;
            self.resolved_at = None;
        }
    }

    fn expect_in_progress(&self) -> Result<(), TransitionError> {
        if self.status == ItemStatus::InProgress {
            Ok(())
        } else {
            Err(TransitionError::NoAttemptInProgress {
                name: self.name.clone(),
                status: self.status,
            })
        }
    }
}

/// Sanitize a raw identifier listing into clean, unique names.
///
/// Drops blank lines, comment lines, and anything containing whitespace or
/// control characters (a package identifier never does; such lines are noise
/// or corruption). First occurrence wins on duplicates, preserving order.
pub fn parse_identifier_list(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
            warn!("Dropping malformed identifier line: {:?}", trimmed);
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            items.push(trimmed.to_string());
        }
    }

    items
}

/// Ordered collection of work items for one run.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    items: Vec<WorkItem>,
}

impl WorkQueue {
    /// Build a queue from identifiers, deduplicating while preserving order.
    pub fn from_identifiers<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for id in identifiers {
            let id = id.into();
            if seen.insert(id.clone()) {
                items.push(WorkItem::new(id));
            }
        }
        WorkQueue { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [WorkItem] {
        &mut self.items
    }

    /// Names of all items that have not succeeded, in queue order.
    pub fn unfinished(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|item| item.status() != ItemStatus::Succeeded)
            .map(|item| item.name())
            .collect()
    }

    /// Persist the unfinished names for a later `--resume` run.
    ///
    /// Returns how many names were written.
    pub fn save_unfinished(&self, path: &Path) -> anyhow::Result<usize> {
        use anyhow::Context;

        let unfinished = self.unfinished();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create queue directory {:?}", parent))?;
        }

        let mut content = unfinished.join("\n");
        content.push('\n');
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write queue file {:?}", path))?;

        Ok(unfinished.len())
    }
}
