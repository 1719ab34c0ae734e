//! Timeout-bounded subprocess execution.
//!
//! Every external tool invocation goes through [`run_with_timeout`], which
//! enforces a hard wall-clock ceiling. A process that overruns its deadline is
//! sent SIGTERM, given a short grace period, then SIGKILLed. Children run in
//! their own process group so the kill reaches the whole tree, not just the
//! direct child.
//!
//! # Design
//!
//! - stdout/stderr are drained on dedicated threads while the main thread
//!   polls `try_wait`. Draining concurrently prevents the child from blocking
//!   on a full pipe, which would turn every chatty run into a timeout.
//! - `PR_SET_PDEATHSIG` makes the kernel deliver SIGTERM to the child if this
//!   process dies first. This prevents orphaned package-manager processes
//!   from holding the database lock after a crash.

use anyhow::{Context, Result};
use log::{debug, warn};
use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often the runner checks whether the child has exited.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a child gets between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Captured result of a bounded command run.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub stdout: String,
    pub stderr: String,
    /// Exit code if the process exited normally. `None` when it was killed by
    /// a signal, including our own timeout kill.
    pub exit_code: Option<i32>,
    /// True when the process hit the deadline and was terminated by us.
    pub timed_out: bool,
}

impl CommandOutcome {
    /// True only for a clean zero exit within the deadline.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// One-line failure description suitable for the run report.
    pub fn diagnostic(&self) -> String {
        if self.timed_out {
            return "timed out".to_string();
        }
        match self.exit_code {
            Some(code) => {
                // pacman reports some failures on stdout only
                let mut tail = last_line(&self.stderr);
                if tail.is_empty() {
                    tail = last_line(&self.stdout);
                }
                if tail.is_empty() {
                    format!("exit code {}", code)
                } else {
                    format!("exit code {}: {}", code, tail)
                }
            }
            None => "terminated by signal".to_string(),
        }
    }
}

/// Extension trait to run a child in its own process group with a death pact.
pub trait CommandProcessGroup {
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        unsafe {
            self.pre_exec(|| {
                // New process group so a timeout kill reaches grandchildren too
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                // Death pact: kernel delivers SIGTERM to the child if we die.
                // This prevents orphaned processes from outliving the run.
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            })
        }
    }
}

/// Run a command with a hard wall-clock deadline, capturing its output.
///
/// Returns `Err` only when the process cannot be spawned or reaped; a nonzero
/// exit or a timeout is reported through the [`CommandOutcome`].
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<CommandOutcome> {
    let program = cmd.get_program().to_string_lossy().into_owned();

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .in_new_process_group()
        .spawn()
        .with_context(|| format!("Failed to spawn {}", program))?;

    let pid = child.id();
    debug!("Spawned {} (pid {}) with {:?} deadline", program, pid, timeout);

    let stdout_drain = spawn_drain(child.stdout.take());
    let stderr_drain = spawn_drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let mut timed_out = false;

    let status: ExitStatus = loop {
        match child
            .try_wait()
            .with_context(|| format!("Failed to poll {} (pid {})", program, pid))?
        {
            Some(status) => break status,
            None if Instant::now() >= deadline => {
                warn!(
                    "{} (pid {}) exceeded {:?} deadline, terminating group",
                    program, pid, timeout
                );
                timed_out = true;
                break kill_group(&mut child, pid)?;
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    };

    let stdout = join_drain(stdout_drain);
    let stderr = join_drain(stderr_drain);

    let exit_code = if timed_out { None } else { status.code() };
    debug!(
        "{} (pid {}) finished: exit_code={:?} timed_out={}",
        program, pid, exit_code, timed_out
    );

    Ok(CommandOutcome {
        stdout,
        stderr,
        exit_code,
        timed_out,
    })
}

/// Terminate a child's whole process group: SIGTERM, grace period, SIGKILL.
fn kill_group(child: &mut Child, pgid: u32) -> Result<ExitStatus> {
    signal_group(pgid, Signal::SIGTERM);

    let grace_deadline = Instant::now() + KILL_GRACE;
    while Instant::now() < grace_deadline {
        if let Some(status) = child.try_wait().context("Failed to poll child during grace period")? {
            return Ok(status);
        }
        thread::sleep(POLL_INTERVAL);
    }

    warn!("Process group {} survived SIGTERM, sending SIGKILL", pgid);
    signal_group(pgid, Signal::SIGKILL);
    child.wait().context("Failed to reap killed child")
}

/// Send a signal to every process in the group. Errors are logged, not fatal:
/// the group may already be gone.
fn signal_group(pgid: u32, sig: Signal) {
    if let Err(e) = signal::kill(Pid::from_raw(-(pgid as i32)), sig) {
        debug!("Signal {} to group {} failed: {}", sig, pgid, e);
    }
}

/// Drain a pipe to a String on a background thread. Raw bytes are captured
/// first: package-manager output is not guaranteed to be UTF-8.
fn spawn_drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut reader| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).to_string()
        })
    })
}

fn join_drain(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Last non-empty line of a command's output, trimmed.
fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}
