//! arsenalup - entry point.
//!
//! All real work happens in the library; main only parses arguments and
//! forwards the orchestrator's exit code.

use arsenalup::cli::Cli;
use arsenalup::orchestrator;

fn main() {
    let cli = Cli::parse_args();
    std::process::exit(orchestrator::run(&cli));
}
