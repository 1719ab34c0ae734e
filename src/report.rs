//! Console reporting: the live progress line and the end-of-run summary.
//!
//! The progress line redraws in place with `\r` and is throttled so a burst
//! of fast items does not flood the terminal. Log records go to the log file,
//! never to the console, so the line is the only thing moving during a run.
//! The summary is printed for the operator and also written as JSON for
//! tooling.

use crate::error::Result;
use crate::progress::{FailedItem, ProgressSnapshot, RunReport};
use crate::source::Category;
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, Instant};

/// Width of the progress bar in characters.
const BAR_WIDTH: usize = 28;

/// Maximum width of the redraw line. Keeps `\r` overdraw clean on an
/// 80-column rescue console.
const LINE_WIDTH: usize = 79;

/// Minimum-interval gate for progress redraws.
struct RenderThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl RenderThrottle {
    fn new(interval: Duration) -> Self {
        RenderThrottle {
            interval,
            last: None,
        }
    }

    /// True when enough time has passed since the last render, or when the
    /// caller forces the update (start, finish, last item).
    fn should_render(&mut self, forced: bool) -> bool {
        let now = Instant::now();
        let due = self
            .last
            .map_or(true, |last| now.duration_since(last) >= self.interval);
        if forced || due {
            self.last = Some(now);
            true
        } else {
            false
        }
    }
}

/// Owns the console during a run.
pub struct Reporter {
    throttle: RenderThrottle,
    line_active: bool,
}

impl Reporter {
    pub fn new(render_interval: Duration) -> Self {
        Reporter {
            throttle: RenderThrottle::new(render_interval),
            line_active: false,
        }
    }

    /// Redraw the progress line, subject to the throttle.
    pub fn render(&mut self, snapshot: &ProgressSnapshot, forced: bool) {
        if !self.throttle.should_render(forced) {
            return;
        }
        let line = progress_line(snapshot);
        print!("\r{:<width$}", line, width = LINE_WIDTH);
        let _ = io::stdout().flush();
        self.line_active = true;
    }

    /// Finish the in-place line so following output starts on a fresh row.
    pub fn break_line(&mut self) {
        if self.line_active {
            println!();
            self.line_active = false;
        }
    }

    /// Print a plain message on its own line.
    pub fn announce(&mut self, message: &str) {
        self.break_line();
        println!("{}", message);
    }

    /// Print a fatal error to stderr.
    pub fn fatal(&mut self, message: &str) {
        self.break_line();
        eprintln!("❌ ERROR: {}", message);
    }

    /// Print the startup banner describing what this run will do.
    pub fn banner(&mut self, category: Option<Category>, resume: bool) {
        println!();
        println!("╔══════════════════════════════════════════════════════════════════╗");
        println!("║              arsenalup - BlackArch Arsenal Installer             ║");
        println!("╚══════════════════════════════════════════════════════════════════╝");
        println!();
        println!("  Scope: {}", scope_text(category));
        println!(
            "  Mode:  {}",
            if resume {
                "resume unfinished queue"
            } else {
                "fresh discovery"
            }
        );
        println!();
    }

    /// Print the human summary and write the JSON report file.
    pub fn summarize(
        &mut self,
        report: &RunReport,
        category: Option<Category>,
        report_path: &Path,
    ) -> Result<()> {
        self.break_line();
        println!();
        println!("╔══════════════════════════════════════════════════════════════════╗");
        println!("║                        Arsenal Run Summary                       ║");
        println!("╚══════════════════════════════════════════════════════════════════╝");
        println!();
        println!("  Scope:        {}", scope_text(category));
        println!("  Selected:     {}", report.total);
        println!("  Succeeded:    {}", report.succeeded);
        println!("  Failed:       {}", report.failed_count());
        println!("  Untried:      {}", report.pending.len());
        println!("  Success rate: {:.1}%", report.success_rate());
        println!("  Elapsed:      {}", format_elapsed(report.elapsed));

        if report.cancelled {
            println!();
            println!("  Run was cancelled before completion.");
        }

        if !report.failed.is_empty() {
            println!();
            println!("  Failed items:");
            for item in &report.failed {
                println!("   • {} ({})", item.name, item.error);
            }
        }

        write_json_report(report, category, report_path)?;
        println!();
        println!("  Full report: {}", report_path.display());
        println!();
        Ok(())
    }
}

fn scope_text(category: Option<Category>) -> String {
    match category {
        Some(cat) => format!("category {}", cat),
        None => "full arsenal catalog".to_string(),
    }
}

/// Build the one-line progress display.
fn progress_line(snapshot: &ProgressSnapshot) -> String {
    let filled = if snapshot.total == 0 {
        0
    } else {
        (snapshot.processed * BAR_WIDTH) / snapshot.total
    };
    let mut bar = String::with_capacity(BAR_WIDTH);
    for i in 0..BAR_WIDTH {
        bar.push(if i < filled { '#' } else { '-' });
    }

    let mut line = format!(
        "[{}] {}/{} ({:.1}%)",
        bar,
        snapshot.processed,
        snapshot.total,
        snapshot.percent()
    );
    if let Some(current) = &snapshot.current {
        line.push(' ');
        line.push_str(current);
    }
    truncate_display(line, LINE_WIDTH)
}

/// Truncate to at most `max` bytes without splitting a character.
fn truncate_display(mut line: String, max: usize) -> String {
    if line.len() <= max {
        return line;
    }
    let mut cut = max;
    while cut > 0 && !line.is_char_boundary(cut) {
        cut -= 1;
    }
    line.truncate(cut);
    line
}

fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Machine-readable mirror of the run summary.
#[derive(Serialize)]
struct JsonReport<'a> {
    timestamp_secs: u64,
    category: Option<Category>,
    total: usize,
    succeeded: usize,
    failed_count: usize,
    untried_count: usize,
    success_rate_percent: f64,
    cancelled: bool,
    elapsed_secs: u64,
    failed: &'a [FailedItem],
    untried: &'a [String],
}

fn write_json_report(
    report: &RunReport,
    category: Option<Category>,
    path: &Path,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = JsonReport {
        timestamp_secs: std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        category,
        total: report.total,
        succeeded: report.succeeded,
        failed_count: report.failed_count(),
        untried_count: report.pending.len(),
        success_rate_percent: report.success_rate(),
        cancelled: report.cancelled,
        elapsed_secs: report.elapsed.as_secs(),
        failed: &report.failed,
        untried: &report.pending,
    };

    let text = serde_json::to_string_pretty(&json)?;
    std::fs::write(path, text)?;
    Ok(())
}
