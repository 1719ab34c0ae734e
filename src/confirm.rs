//! Operator confirmation gate.
//!
//! Installing the arsenal rewrites pacman.conf and pulls thousands of
//! packages, so an interactive run must be confirmed with an explicit typed
//! acknowledgement, not a bare Enter. The prompt times out rather than
//! blocking a forgotten terminal forever; a timeout counts as a decline.

use log::warn;
use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Exact response the operator must type to proceed.
pub const ACKNOWLEDGEMENT: &str = "AGREE";

/// How an interactive confirmation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Accepted,
    Declined,
    TimedOut,
}

impl ConfirmOutcome {
    pub fn accepted(&self) -> bool {
        *self == ConfirmOutcome::Accepted
    }
}

/// Classify a raw response line. `None` means stdin closed without input.
pub fn evaluate_response(line: Option<&str>) -> ConfirmOutcome {
    match line {
        Some(text) if text.trim() == ACKNOWLEDGEMENT => ConfirmOutcome::Accepted,
        _ => ConfirmOutcome::Declined,
    }
}

/// Prompt the operator and wait up to `timeout` for the acknowledgement.
pub fn require_confirmation(timeout: Duration) -> ConfirmOutcome {
    println!("⚠ This will register the arsenal repository and install packages");
    println!("  through pacman. The package database and pacman.conf will be");
    println!("  modified. A full run can take hours and significant disk space.");
    println!();
    print!(
        "Type {} (all capitals) within {}s to continue: ",
        ACKNOWLEDGEMENT,
        timeout.as_secs()
    );
    let _ = io::stdout().flush();

    // Reader thread, because stdin has no timeout of its own
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut line = String::new();
        let result = io::stdin().lock().read_line(&mut line);
        let _ = tx.send(result.map(|read| (read, line)));
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok((0, _))) => {
            // EOF without input
            ConfirmOutcome::Declined
        }
        Ok(Ok((_, line))) => evaluate_response(Some(&line)),
        Ok(Err(e)) => {
            warn!("Failed to read confirmation: {}", e);
            ConfirmOutcome::Declined
        }
        Err(_) => {
            println!();
            warn!("Confirmation prompt timed out after {:?}", timeout);
            ConfirmOutcome::TimedOut
        }
    }
}
