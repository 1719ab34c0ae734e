//! Cancellation signal handling.
//!
//! The first SIGINT/SIGTERM/SIGHUP flips a shared flag and nothing else; the
//! run keeps going until the executor notices the flag at its next safe point
//! (between polls, never mid-syscall). A second signal means the operator has
//! lost patience, so the process exits immediately with code 1.
//!
//! # Design
//!
//! Handlers only touch an `AtomicBool`, which is async-signal-safe. All real
//! work (finishing the in-flight item, saving the queue, writing the summary)
//! happens on the main thread after it observes the flag.

use log::debug;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::flag;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Signals that request a graceful stop.
const CANCEL_SIGNALS: &[i32] = &[SIGINT, SIGTERM, SIGHUP];

static HANDLERS_INSTALLED: OnceLock<()> = OnceLock::new();

/// Shared cancellation flag, cheap to clone across threads.
///
/// Once tripped the token stays tripped; there is no way to re-arm it within
/// a run.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a cancellation signal has been received.
    pub fn is_tripped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Trip the token directly, as the signal handler would.
    pub fn trip(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// Install the two-stage signal handlers for the given token.
///
/// For each signal the conditional-shutdown handler is registered first, then
/// the flag handler. signal-hook runs handlers in registration order, so the
/// first delivery sees the flag still false and only flips it, while a second
/// delivery finds the flag already set and exits with code 1.
///
/// Installing twice is a no-op; handlers stay bound to the first token.
pub fn install(token: &CancelToken) -> io::Result<()> {
    if HANDLERS_INSTALLED.get().is_some() {
        debug!("Signal handlers already installed, skipping");
        return Ok(());
    }

    for &sig in CANCEL_SIGNALS {
        flag::register_conditional_shutdown(sig, 1, token.flag())?;
        flag::register(sig, token.flag())?;
    }

    let _ = HANDLERS_INSTALLED.set(());
    debug!("Installed cancellation handlers for INT, TERM, HUP");
    Ok(())
}
