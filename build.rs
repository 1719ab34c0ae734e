// Generates the man page and shell completions from the CLI definition.
// src/cli.rs is included directly so the definition is compiled once, here,
// without building the rest of the crate first.
#![allow(dead_code)]

use clap::CommandFactory;
use clap_complete::{generate_to, Shell};
use std::env;
use std::error::Error;
use std::fs;

// `use std::path::PathBuf` comes in via the include below.
include!("src/cli.rs");

fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let out_dir = match env::var_os("OUT_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => return Ok(()),
    };

    let mut cmd = Cli::command();

    let man = clap_mangen::Man::new(cmd.clone());
    let mut buffer: Vec<u8> = Vec::new();
    man.render(&mut buffer)?;
    fs::write(out_dir.join("arsenalup.1"), buffer)?;

    for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
        generate_to(shell, &mut cmd, "arsenalup", &out_dir)?;
    }

    Ok(())
}
