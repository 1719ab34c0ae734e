use clap::Parser;
use std::path::PathBuf;

// NOTE: build.rs includes this file to generate the man page and shell
// completions, so it must not reference other modules of the crate.

/// arsenalup - BlackArch arsenal installer
#[derive(Parser, Debug)]
#[command(name = "arsenalup")]
#[command(about = "Install or update the BlackArch penetration-testing arsenal via pacman")]
#[command(version)]
pub struct Cli {
    /// Restrict the run to one tool category (e.g. information-gathering)
    #[arg(short, long, conflicts_with = "resume")]
    pub category: Option<String>,

    /// Resume the queue left behind by an interrupted run
    #[arg(short, long)]
    pub resume: bool,

    /// Skip the interactive confirmation gate (unattended mode)
    #[arg(short = 'y', long = "noconfirm")]
    pub noconfirm: bool,

    /// Run a full system upgrade before installing tools
    #[arg(long)]
    pub upgrade: bool,

    /// JSON settings file overriding the built-in defaults
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug-level logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
