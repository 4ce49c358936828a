//! CLI entry point for Autho.
//!
//! This binary provides the `autho` command: run or preview workflow files,
//! execute natural-language commands once or in a REPL, and run a workflow
//! on a cron schedule.
//!
//! The workflow engine is synchronous; only `schedule` starts a tokio
//! runtime.

mod cli;
mod config;
mod helpers;
mod repl;
mod schedule;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use serde_json::Value;
use tracing::{debug, info};

use crate::cli::{Cli, Commands};
use crate::config::AuthoConfig;
use crate::helpers::{
    build_executor, build_interface, build_registry, init_tracing, load_workflow, pretty,
    print_outcome,
};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config_path = config::resolve_path(cli.config.as_deref());
    let config = AuthoConfig::load(&config_path)?;
    init_tracing(&config.logging.level, cli.log_format);
    if config_path.exists() {
        info!(path = %config_path.display(), "configuration loaded");
    } else {
        debug!(path = %config_path.display(), "no configuration file, using defaults");
    }

    match cli.command {
        Commands::Run { file, set } => cmd_run(&config, &file, set),
        Commands::DryRun { file } => cmd_dry_run(&file),
        Commands::Ask { command, workflows } => cmd_ask(&config, &command.join(" "), &workflows),
        Commands::Repl { workflows } => repl::cmd_repl(&config, &workflows),
        Commands::Schedule { file, cron } => schedule::cmd_schedule(&config, file, &cron),
    }
}

// ---------------------------------------------------------------------------
// Subcommand: run
// ---------------------------------------------------------------------------

fn cmd_run(config: &AuthoConfig, file: &Path, set: Vec<(String, Value)>) -> Result<ExitCode> {
    let mut workflow = load_workflow(file)?;
    let executor = build_executor(config, build_registry(config));

    let report = executor.run_with_context(&mut workflow, set);
    println!("{}", pretty(&report));

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

// ---------------------------------------------------------------------------
// Subcommand: dry-run
// ---------------------------------------------------------------------------

fn cmd_dry_run(file: &Path) -> Result<ExitCode> {
    let workflow = load_workflow(file)?;

    println!();
    println!("  Workflow: {}", workflow.name);
    if !workflow.description.is_empty() {
        println!("  {}", workflow.description);
    }
    println!();
    println!("{}", pretty(&workflow.dry_run()));
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// Subcommand: ask
// ---------------------------------------------------------------------------

fn cmd_ask(config: &AuthoConfig, command: &str, workflows: &[PathBuf]) -> Result<ExitCode> {
    let mut nli = build_interface(config, workflows)?;

    let outcome = nli.process(command);
    print_outcome(&outcome);

    Ok(if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
