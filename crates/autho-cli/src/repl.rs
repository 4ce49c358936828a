//! Subcommand: `autho repl` -- interactive command prompt.

use std::io::{self, BufRead, Write as _};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::AuthoConfig;
use crate::helpers::{build_interface, print_outcome};

/// Read commands from stdin until `quit`, `exit` or end of input.
pub fn cmd_repl(config: &AuthoConfig, workflows: &[PathBuf]) -> Result<ExitCode> {
    let mut nli = build_interface(config, workflows)?;

    println!();
    println!("  Autho v{}", env!("CARGO_PKG_VERSION"));
    println!("  Type a command, 'help' for examples, or 'quit' to exit.");
    if !nli.workflows().is_empty() {
        println!("  Workflows: {}", nli.workflows().join(", "));
    }
    println!();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("autho> ");
        io::stdout().flush().context("failed to flush stdout")?;

        let Some(line) = lines.next() else {
            println!();
            break;
        };
        let line = line.context("failed to read input")?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            info!("user requested exit");
            break;
        }

        let outcome = nli.process(trimmed);
        print_outcome(&outcome);
        println!();
    }

    info!(commands = nli.history().len(), "session ended");
    Ok(ExitCode::SUCCESS)
}
