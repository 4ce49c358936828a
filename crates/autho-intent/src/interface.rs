//! Natural-language front end.
//!
//! [`NaturalLanguageInterface::process`] parses a command, records it in the
//! history and dispatches the intent to a single capability call.  Missing
//! entities produce a guidance string instead of an error, and capability
//! failures are folded into the returned [`ProcessOutcome`].

use std::collections::HashMap;
use std::sync::Arc;

use autho_kernel::{CapabilityError, CapabilityRegistry, Params};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info};

use crate::executor::WorkflowExecutor;
use crate::parser::{Intent, IntentKind, IntentParser};
use crate::workflow::Workflow;

const HELP_TEXT: &str = r#"
AUTHO - Natural Language Commands
=================================

FILE OPERATIONS:
  • "read file report.txt"
  • "show me the contents of data.json"
  • "list files in documents/"
  • "copy report.txt to backup/"
  • "move old.txt to archive/"
  • "delete temp.txt"

SPREADSHEET OPERATIONS:
  • "load data from sales.csv"
  • "load report.xlsx"

DOCUMENT OPERATIONS:
  • "create a word document called report.docx"
  • "fill form application.docx"
  • "create a pdf summary.pdf"
  • "extract text from document.pdf"

WEB OPERATIONS:
  • "fetch https://api.example.com/data"
  • "scrape the page example.com"

WORKFLOWS:
  • "run workflow nightly_report"

OTHER:
  • "help" - Show this help
  • "status" - Show system status

TIP: You can speak naturally. The system understands variations like:
  "what's in the file?", "show me files", "grab the webpage", etc.
"#;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Result of one [`NaturalLanguageInterface::process`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub success: bool,
    pub intent: IntentKind,
    pub confidence: f64,
    /// Human-readable description of the action taken.
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One processed command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub command: String,
    pub intent: IntentKind,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Interface
// ---------------------------------------------------------------------------

pub struct NaturalLanguageInterface {
    parser: IntentParser,
    registry: Arc<CapabilityRegistry>,
    executor: WorkflowExecutor,
    workflows: HashMap<String, Workflow>,
    history: Vec<HistoryEntry>,
}

impl NaturalLanguageInterface {
    pub fn new(parser: IntentParser, registry: Arc<CapabilityRegistry>) -> Self {
        let executor = WorkflowExecutor::new(Arc::clone(&registry));
        Self {
            parser,
            registry,
            executor,
            workflows: HashMap::new(),
            history: Vec::new(),
        }
    }

    /// Replace the executor used for `run workflow` commands.
    pub fn with_executor(mut self, executor: WorkflowExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Make a workflow runnable by name.  Each command runs a fresh copy.
    pub fn register_workflow(&mut self, workflow: Workflow) {
        info!(workflow = %workflow.name, "workflow registered for natural-language use");
        self.workflows.insert(workflow.name.clone(), workflow);
    }

    /// Names of registered workflows, sorted.
    pub fn workflows(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.workflows.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn parser(&self) -> &IntentParser {
        &self.parser
    }

    pub fn parser_mut(&mut self) -> &mut IntentParser {
        &mut self.parser
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Parse and execute a command.  Never fails; errors are reported in
    /// the outcome.
    pub fn process(&mut self, command: &str) -> ProcessOutcome {
        let intent = self.parser.parse(command);
        info!(intent = %intent.kind, confidence = intent.confidence, "parsed intent");

        self.history.push(HistoryEntry {
            command: command.to_string(),
            intent: intent.kind,
            confidence: intent.confidence,
            timestamp: Utc::now(),
        });

        let (result, error) = match self.dispatch(&intent) {
            Ok(value) => (Some(value), None),
            Err(e) => {
                error!(intent = %intent.kind, error = %e, "command failed");
                (None, Some(e.to_string()))
            }
        };

        ProcessOutcome {
            success: error.is_none(),
            intent: intent.kind,
            confidence: intent.confidence,
            action: intent.suggested_action,
            result,
            error,
        }
    }

    // -- Dispatch -------------------------------------------------------------

    fn dispatch(&self, intent: &Intent) -> std::result::Result<Value, CapabilityError> {
        let entity = |role: &str| intent.entity(role);

        match intent.kind {
            IntentKind::ReadFile => match entity("path") {
                Some(path) => self.invoke("read_file", [("path", path)]),
                None => guidance("Please specify a file path. Example: 'read file report.txt'"),
            },
            IntentKind::WriteFile => match entity("path") {
                Some(path) => self.invoke(
                    "write_file",
                    [("path", path), ("content", entity("content").unwrap_or_default())],
                ),
                None => guidance("Please specify a file path. Example: 'write \"Hello\" to greeting.txt'"),
            },
            IntentKind::CopyFile => match (entity("source"), entity("destination")) {
                (Some(source), Some(dest)) => {
                    self.invoke("copy_file", [("source", source), ("destination", dest)])
                }
                _ => guidance(
                    "Please specify source and destination. Example: 'copy file.txt to backup/file.txt'",
                ),
            },
            IntentKind::MoveFile => match (entity("source"), entity("destination")) {
                (Some(source), Some(dest)) => {
                    self.invoke("move_file", [("source", source), ("destination", dest)])
                }
                _ => guidance("Please specify source and destination. Example: 'move old.txt to new.txt'"),
            },
            IntentKind::DeleteFile => match entity("path") {
                Some(path) => self.invoke("delete_file", [("path", path)]),
                None => guidance("Please specify a file path. Example: 'delete temp.txt'"),
            },
            IntentKind::ListFiles => {
                let listing = self.invoke("list_files", [("path", entity("path").unwrap_or("."))])?;
                match listing {
                    Value::Array(items) if items.is_empty() => Ok(json!(["No files found"])),
                    other => Ok(other),
                }
            }
            IntentKind::ReadSpreadsheet => match entity("path") {
                Some(path) if path.to_ascii_lowercase().ends_with(".csv") => {
                    self.invoke("read_csv", [("path", path)])
                }
                Some(path) => self.invoke("read_excel", [("path", path)]),
                None => guidance("Please specify a spreadsheet path. Example: 'read spreadsheet data.csv'"),
            },
            IntentKind::CreateDocument => self.invoke(
                "create_word",
                [
                    ("output_path", entity("output_path").unwrap_or("document.docx")),
                    ("title", entity("title").unwrap_or("Untitled Document")),
                    ("content", entity("content").unwrap_or_default()),
                ],
            ),
            IntentKind::FillForm => match entity("form_path") {
                Some(_) => guidance(
                    "Form filling requires field mappings. Use a fill_form workflow step or provide more details.",
                ),
                None => guidance("Please specify a form path. Example: 'fill form application.docx'"),
            },
            IntentKind::CreatePdf => self.invoke(
                "create_pdf",
                [
                    ("output_path", entity("output_path").unwrap_or("document.pdf")),
                    ("content", entity("content").unwrap_or_default()),
                ],
            ),
            IntentKind::ExtractPdf => match entity("path") {
                Some(path) => self.invoke("extract_pdf_text", [("path", path)]),
                None => guidance("Please specify a PDF path. Example: 'extract text from report.pdf'"),
            },
            IntentKind::FetchUrl => match entity("url") {
                Some(url) => self.invoke("http_get", [("url", url)]),
                None => guidance("Please specify a URL. Example: 'fetch https://example.com'"),
            },
            IntentKind::ScrapePage => match entity("url") {
                Some(url) => self.invoke("http_get", [("url", url)]),
                None => guidance("Please specify a URL. Example: 'scrape https://example.com'"),
            },
            IntentKind::RunWorkflow => match entity("workflow") {
                Some(name) => self.run_workflow(name),
                None => guidance("Please specify a workflow. Example: 'run workflow nightly_report'"),
            },
            IntentKind::Help => Ok(Value::String(HELP_TEXT.to_string())),
            IntentKind::Status => Ok(Value::String(self.status_text())),
            IntentKind::Unknown => Ok(Value::String(intent.suggested_action.clone())),
            other => Ok(Value::String(format!(
                "Intent '{other}' recognized but not yet implemented."
            ))),
        }
    }

    fn invoke<const N: usize>(
        &self,
        operation: &str,
        params: [(&str, &str); N],
    ) -> std::result::Result<Value, CapabilityError> {
        let params: Params = params
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        self.registry.invoke(operation, &params)
    }

    fn run_workflow(&self, name: &str) -> std::result::Result<Value, CapabilityError> {
        let Some(template) = self.workflows.get(name) else {
            let known = self.workflows();
            let known = if known.is_empty() {
                "none registered".to_string()
            } else {
                known.join(", ")
            };
            return Err(CapabilityError::failed(
                "run_workflow",
                format!("unknown workflow '{name}' (available: {known})"),
            ));
        };

        let mut workflow = template.clone();
        let report = self.executor.run(&mut workflow);
        if let Some(step) = &report.failed_step {
            let reason = report
                .step(step)
                .and_then(|s| s.error.as_deref())
                .unwrap_or("unknown error");
            return Err(CapabilityError::failed(
                "run_workflow",
                format!("workflow '{name}' failed at step '{step}': {reason}"),
            ));
        }
        Ok(serde_json::to_value(&report)?)
    }

    fn status_text(&self) -> String {
        let engine = if self.parser.llm_enabled() && self.parser.llm_backend().is_some() {
            "LLM-powered"
        } else {
            "Rule-based"
        };
        let llm = match self.parser.llm_backend() {
            Some(name) => format!("Available ({name})"),
            None => "Not configured (using rule-based parsing)".to_string(),
        };
        format!(
            "\nAUTHO Status\n============\nNLP Engine: {engine}\nLLM API: {llm}\nCommands Processed: {}\nOperations Registered: {}\nWorkflows Registered: {}\n",
            self.history.len(),
            self.registry.count(),
            self.workflows.len(),
        )
    }
}

fn guidance(text: &str) -> std::result::Result<Value, CapabilityError> {
    Ok(Value::String(text.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
