//! CLI argument definitions for Autho.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;

/// Autho -- workflow automation driven by plain-language commands.
#[derive(Parser)]
#[command(
    name = "autho",
    version,
    about = "Autho -- workflow automation and natural-language commands",
    long_about = "Runs JSON workflow files step by step, answers plain-language commands \
                  such as \"copy report.txt to backup/\", and schedules workflows with cron \
                  expressions."
)]
pub struct Cli {
    /// Path to the TOML configuration file (default: $AUTHO_CONFIG or autho.toml).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a workflow file and print its run report.
    Run {
        /// Workflow definition (JSON).
        file: PathBuf,

        /// Seed a context variable; the value is parsed as JSON when possible.
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        set: Vec<(String, Value)>,
    },

    /// Show what a workflow would do without executing it.
    DryRun {
        /// Workflow definition (JSON).
        file: PathBuf,
    },

    /// Execute a single natural-language command.
    Ask {
        /// The command, e.g. "list files in reports".
        #[arg(required = true, num_args = 1..)]
        command: Vec<String>,

        /// Workflow files made available to "run workflow <name>".
        #[arg(long = "workflow", short, value_name = "FILE")]
        workflows: Vec<PathBuf>,
    },

    /// Start an interactive command prompt.
    Repl {
        /// Workflow files made available to "run workflow <name>".
        #[arg(long = "workflow", short, value_name = "FILE")]
        workflows: Vec<PathBuf>,
    },

    /// Run a workflow file on a cron schedule until interrupted.
    Schedule {
        /// Workflow definition (JSON).
        file: PathBuf,

        /// Cron expression; 5-field expressions get a seconds field of 0.
        #[arg(long)]
        cron: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

/// Parse `KEY=VALUE`.  The value is read as JSON when it parses, otherwise
/// it is kept as a string.
pub fn parse_key_value(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
