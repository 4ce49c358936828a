//! Shared helpers for the CLI subcommands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use autho_adapters::register_defaults;
use autho_agent::LlmClient;
use autho_intent::{
    IntentParser, NaturalLanguageInterface, ProcessOutcome, Workflow, WorkflowExecutor,
};
use autho_kernel::CapabilityRegistry;
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::LogFormat;
use crate::config::AuthoConfig;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber.  `RUST_LOG` overrides `default_level`.
pub fn init_tracing(default_level: &str, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Registry with the built-in adapters.
pub fn build_registry(config: &AuthoConfig) -> Arc<CapabilityRegistry> {
    let registry = CapabilityRegistry::new();
    register_defaults(&registry, &config.adapter_settings());
    info!(operations = registry.count(), "capabilities registered");
    Arc::new(registry)
}

pub fn build_executor(config: &AuthoConfig, registry: Arc<CapabilityRegistry>) -> WorkflowExecutor {
    WorkflowExecutor::new(registry).with_options(config.executor_options())
}

/// Intent parser, with the LLM tier attached when a credential is
/// available.  LLM setup problems fall back to rules-only parsing.
pub fn build_parser(config: &AuthoConfig) -> IntentParser {
    let parser = IntentParser::new();

    let llm_config = match config.llm_client_config(|name| std::env::var(name).ok()) {
        Ok(Some(llm_config)) => llm_config,
        Ok(None) => {
            info!("intent parser ready (rules only)");
            return parser;
        }
        Err(e) => {
            warn!(error = %e, "invalid LLM configuration, using rules only");
            return parser;
        }
    };

    match LlmClient::new(llm_config) {
        Ok(client) => {
            info!(
                provider = client.provider().as_str(),
                model = %client.model(),
                "intent parser ready (LLM + rules)"
            );
            parser.with_llm(Arc::new(client))
        }
        Err(e) => {
            warn!(error = %e, "failed to create LLM client, using rules only");
            parser
        }
    }
}

/// Natural-language interface with the given workflows in its catalogue.
pub fn build_interface(
    config: &AuthoConfig,
    workflows: &[PathBuf],
) -> Result<NaturalLanguageInterface> {
    let registry = build_registry(config);
    let executor = build_executor(config, Arc::clone(&registry));
    let mut nli =
        NaturalLanguageInterface::new(build_parser(config), registry).with_executor(executor);
    for path in workflows {
        nli.register_workflow(load_workflow(path)?);
    }
    Ok(nli)
}

pub fn load_workflow(path: &Path) -> Result<Workflow> {
    let workflow = Workflow::load_from_file(path)
        .with_context(|| format!("failed to load workflow {}", path.display()))?;
    info!(workflow = %workflow.name, steps = workflow.len(), path = %path.display(), "workflow loaded");
    Ok(workflow)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Print the result of a natural-language command.
pub fn print_outcome(outcome: &ProcessOutcome) {
    if let Some(error) = &outcome.error {
        eprintln!("  Error: {error}");
        return;
    }
    match &outcome.result {
        Some(Value::String(text)) => println!("{text}"),
        Some(value) => println!("{}", pretty(value)),
        None => println!("{}", outcome.action),
    }
}

pub fn pretty(value: &impl serde::Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}
