//! Intent parser -- turns free-text commands into structured intents.
//!
//! The parser has two tiers:
//!
//! 1. **LLM tier** (optional): when a [`LlmBackend`] is attached and enabled,
//!    the command is sent to the model, which must answer with a JSON object
//!    `{intent, confidence, entities, suggested_action}`.  Any failure (network,
//!    malformed JSON, unknown intent) is logged and the rule tier runs instead.
//! 2. **Rule tier**: an ordered table of case-insensitive regex rules held in
//!    the kernel's [`PatternRouter`].  Every matching rule is scored by the
//!    fraction of the input it covers; the best score wins, ties going to the
//!    rule registered first.  No match yields [`IntentKind::Unknown`].
//!
//! [`IntentParser::parse`] never fails.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use autho_agent::LlmBackend;
use autho_kernel::{PatternRouter, RouteMatch};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::{IntentError, Result};

/// Suggestion returned with [`IntentKind::Unknown`].
pub const UNKNOWN_SUGGESTION: &str = "I didn't understand that. Try 'help' for available commands.";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The kind of action a command asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    // File operations
    ReadFile,
    WriteFile,
    CopyFile,
    MoveFile,
    DeleteFile,
    ListFiles,

    // Spreadsheet operations
    ReadSpreadsheet,
    WriteSpreadsheet,
    FilterData,

    // Document operations
    CreateDocument,
    FillForm,
    CreatePdf,
    ExtractPdf,

    // Web operations
    FetchUrl,
    ScrapePage,
    ApiCall,
    Download,

    // Database operations
    QueryDatabase,

    // Email operations
    SendEmail,

    // Workflow operations
    RunWorkflow,
    CreateWorkflow,

    // Help and info
    Help,
    Status,
    Unknown,
}

impl IntentKind {
    /// Every kind, in rule-registration order.
    pub const ALL: [IntentKind; 24] = [
        Self::ReadFile,
        Self::WriteFile,
        Self::CopyFile,
        Self::MoveFile,
        Self::DeleteFile,
        Self::ListFiles,
        Self::ReadSpreadsheet,
        Self::WriteSpreadsheet,
        Self::FilterData,
        Self::CreateDocument,
        Self::FillForm,
        Self::CreatePdf,
        Self::ExtractPdf,
        Self::FetchUrl,
        Self::ScrapePage,
        Self::ApiCall,
        Self::Download,
        Self::QueryDatabase,
        Self::SendEmail,
        Self::RunWorkflow,
        Self::CreateWorkflow,
        Self::Help,
        Self::Status,
        Self::Unknown,
    ];

    /// Stable wire name (`read_file`, `fetch_url`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadFile => "read_file",
            Self::WriteFile => "write_file",
            Self::CopyFile => "copy_file",
            Self::MoveFile => "move_file",
            Self::DeleteFile => "delete_file",
            Self::ListFiles => "list_files",
            Self::ReadSpreadsheet => "read_spreadsheet",
            Self::WriteSpreadsheet => "write_spreadsheet",
            Self::FilterData => "filter_data",
            Self::CreateDocument => "create_document",
            Self::FillForm => "fill_form",
            Self::CreatePdf => "create_pdf",
            Self::ExtractPdf => "extract_pdf",
            Self::FetchUrl => "fetch_url",
            Self::ScrapePage => "scrape_page",
            Self::ApiCall => "api_call",
            Self::Download => "download",
            Self::QueryDatabase => "query_database",
            Self::SendEmail => "send_email",
            Self::RunWorkflow => "run_workflow",
            Self::CreateWorkflow => "create_workflow",
            Self::Help => "help",
            Self::Status => "status",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentKind {
    type Err = IntentError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| IntentError::ParseFailed {
                reason: format!("unknown intent `{s}`"),
            })
    }
}

/// A parsed command.  Built once per [`IntentParser::parse`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// What the command asks for.
    pub kind: IntentKind,

    /// Score in `[0, 1]`.
    pub confidence: f64,

    /// Role name to extracted value (e.g. `path`, `source`, `url`).
    pub entities: HashMap<String, String>,

    /// The input text, trimmed.
    pub raw_text: String,

    /// Human-readable description of what will happen.
    pub suggested_action: String,

    /// Which tier produced this result.
    pub source: ParseSource,
}

impl Intent {
    /// Look up an entity, treating empty strings as absent.
    pub fn entity(&self, role: &str) -> Option<&str> {
        self.entities
            .get(role)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn unknown(raw_text: &str) -> Self {
        Self {
            kind: IntentKind::Unknown,
            confidence: 0.0,
            entities: HashMap::new(),
            raw_text: raw_text.to_string(),
            suggested_action: UNKNOWN_SUGGESTION.to_string(),
            source: ParseSource::Rules,
        }
    }
}

/// The tier that produced an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseSource {
    /// Matched by the regex rule table.
    Rules,
    /// Classified by a language model.
    Llm,
}

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

/// Rules per kind, in registration order.  Kinds absent here have no rules.
const RULES: &[(IntentKind, &[&str])] = &[
    (
        IntentKind::ReadFile,
        &[
            r"read\s+(?:the\s+)?(?:file\s+)?(.+)",
            r"open\s+(?:the\s+)?(?:file\s+)?(.+)",
            r"show\s+(?:me\s+)?(?:the\s+)?(?:contents?\s+of\s+)?(.+)",
            r"what(?:'s| is)\s+in\s+(.+)",
        ],
    ),
    (
        IntentKind::WriteFile,
        &[
            r#"write\s+['"](.+?)['"]\s+to\s+(.+)"#,
            r"save\s+(?:to\s+)?(.+)",
            r"create\s+(?:a\s+)?(?:new\s+)?file\s+(?:called\s+)?(.+)",
        ],
    ),
    (
        IntentKind::CopyFile,
        &[r"copy\s+(.+?)\s+to\s+(.+)", r"duplicate\s+(.+)"],
    ),
    (
        IntentKind::MoveFile,
        &[r"move\s+(.+?)\s+to\s+(.+)", r"rename\s+(.+?)\s+to\s+(.+)"],
    ),
    (
        IntentKind::DeleteFile,
        &[
            r"delete\s+(?:the\s+)?(?:file\s+)?(.+)",
            r"remove\s+(?:the\s+)?(?:file\s+)?(.+)",
        ],
    ),
    (
        IntentKind::ListFiles,
        &[
            r"list\s+(?:all\s+)?files?\s+in\s+(.+)",
            r"list\s+(?:all\s+)?files?$",
            r"show\s+(?:me\s+)?(?:all\s+)?files?\s+in\s+(.+)",
            r"show\s+(?:me\s+)?(?:all\s+)?files?$",
            r"what\s+files?\s+(?:are\s+)?in\s+(.+)",
            r"what\s+files?\s+(?:are\s+there|do\s+we\s+have)",
        ],
    ),
    (
        IntentKind::ReadSpreadsheet,
        &[
            r"read\s+(?:the\s+)?(?:spreadsheet|csv|excel)\s+(.+)",
            r"open\s+(?:the\s+)?(?:spreadsheet|csv|excel)\s+(.+)",
            r"load\s+(?:data\s+from\s+)?(.+\.(?:csv|xlsx?))",
        ],
    ),
    (
        IntentKind::WriteSpreadsheet,
        &[
            r"(?:save|write|export)\s+(?:to\s+)?(?:spreadsheet|csv|excel)\s+(.+)",
            r"create\s+(?:a\s+)?(?:spreadsheet|csv|excel)\s+(.+)",
        ],
    ),
    (
        IntentKind::CreateDocument,
        &[
            r"create\s+(?:a\s+)?(?:word\s+)?(?:document|doc)\s+(?:called\s+)?(.+)?",
            r"write\s+(?:a\s+)?(?:word\s+)?(?:document|doc)\s+(.+)?",
            r"generate\s+(?:a\s+)?(?:word\s+)?(?:document|doc|report)\s+(.+)?",
        ],
    ),
    (
        IntentKind::FillForm,
        &[
            r"fill\s+(?:out\s+)?(?:the\s+)?form\s+(.+)?",
            r"complete\s+(?:the\s+)?form\s+(.+)?",
            r"populate\s+(?:the\s+)?(?:form\s+)?(.+)?",
        ],
    ),
    (
        IntentKind::CreatePdf,
        &[
            r"create\s+(?:a\s+)?pdf\s+(.+)?",
            r"generate\s+(?:a\s+)?pdf\s+(.+)?",
            r"convert\s+(?:to\s+)?pdf\s+(.+)?",
        ],
    ),
    (
        IntentKind::ExtractPdf,
        &[
            r"extract\s+(?:text\s+)?from\s+(?:pdf\s+)?(.+)",
            r"read\s+(?:the\s+)?pdf\s+(.+)",
            r"get\s+text\s+from\s+(.+\.pdf)",
        ],
    ),
    (
        IntentKind::FetchUrl,
        &[
            r"fetch\s+(?:the\s+)?(?:url\s+)?(.+)",
            r"get\s+(?:the\s+)?(?:page|content|data)\s+(?:from\s+)?(.+)",
            r"download\s+(?:the\s+)?page\s+(.+)",
        ],
    ),
    (
        IntentKind::ScrapePage,
        &[
            r"scrape\s+(?:the\s+)?(?:page\s+)?(.+)",
            r"extract\s+(?:data\s+)?from\s+(?:website\s+)?(.+)",
        ],
    ),
    (
        IntentKind::ApiCall,
        &[
            r"(?:call|hit|request)\s+(?:the\s+)?api\s+(.+)?",
            r"(?:make\s+)?(?:an?\s+)?api\s+(?:call|request)\s+(?:to\s+)?(.+)?",
        ],
    ),
    (
        IntentKind::SendEmail,
        &[r"send\s+(?:an?\s+)?email\s+(?:to\s+)?(.+)?", r"email\s+(.+)"],
    ),
    (
        IntentKind::QueryDatabase,
        &[
            r"query\s+(?:the\s+)?(?:database|db)\s+(.+)?",
            r"run\s+(?:a\s+)?(?:sql\s+)?query\s+(.+)?",
            r"select\s+.+\s+from\s+.+",
        ],
    ),
    (
        IntentKind::RunWorkflow,
        &[
            r"run\s+(?:the\s+)?workflow\s+(.+)?",
            r"execute\s+(?:the\s+)?workflow\s+(.+)?",
            r"start\s+(?:the\s+)?(?:workflow|automation)\s+(.+)?",
        ],
    ),
    (
        IntentKind::Help,
        &[
            r"^help$",
            r"what\s+can\s+(?:you|i)\s+do",
            r"how\s+(?:do\s+i|to)\s+(.+)",
            r"show\s+(?:me\s+)?(?:the\s+)?(?:commands|help)",
        ],
    ),
    (
        IntentKind::Status,
        &[
            r"^status$",
            r"what(?:'s| is)\s+(?:the\s+)?status",
            r"show\s+(?:me\s+)?(?:the\s+)?status",
        ],
    ),
];

// ---------------------------------------------------------------------------
// System prompt for LLM-based parsing
// ---------------------------------------------------------------------------

fn llm_system_prompt() -> String {
    let names: Vec<&str> = IntentKind::ALL.iter().map(|k| k.as_str()).collect();
    format!(
        r#"You are an RPA (Robotic Process Automation) command parser.
Parse the user's natural language request and extract:
1. The intent (what action they want)
2. The entities (files, paths, URLs, data mentioned)

Respond ONLY with valid JSON in this format:
{{
    "intent": "one of: {}",
    "confidence": 0.0 to 1.0,
    "entities": {{"key": "value"}},
    "suggested_action": "human readable description of what will happen"
}}"#,
        names.join(", ")
    )
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// The intent parser.
pub struct IntentParser {
    /// Compiled rule table; handler ids are intent wire names.
    router: PatternRouter,

    /// Optional language model for the first tier.
    llm: Option<Arc<dyn LlmBackend>>,

    /// Whether the LLM tier is consulted when a backend is attached.
    llm_enabled: bool,
}

impl IntentParser {
    /// Create a rules-only parser.
    pub fn new() -> Self {
        let mut router = PatternRouter::new();
        for (kind, patterns) in RULES {
            for pattern in *patterns {
                if let Err(e) = router.add_pattern(*pattern, kind.as_str()) {
                    error!(intent = %kind, error = %e, "skipping invalid intent rule");
                }
            }
        }
        debug!(rules = router.pattern_count(), "intent rule table compiled");

        Self {
            router,
            llm: None,
            llm_enabled: false,
        }
    }

    /// Attach a language model and enable the LLM tier.
    pub fn with_llm(mut self, llm: Arc<dyn LlmBackend>) -> Self {
        self.llm = Some(llm);
        self.llm_enabled = true;
        self
    }

    /// Toggle the LLM tier without detaching the backend.
    pub fn set_llm_enabled(&mut self, enabled: bool) {
        self.llm_enabled = enabled;
    }

    /// Whether the LLM tier is requested.
    pub fn llm_enabled(&self) -> bool {
        self.llm_enabled
    }

    /// Name of the attached backend, if any.
    pub fn llm_backend(&self) -> Option<&str> {
        self.llm.as_deref().map(|llm| llm.name())
    }

    /// Number of compiled rules.
    pub fn rule_count(&self) -> usize {
        self.router.pattern_count()
    }

    /// Parse a command.  Never fails; unmatched input yields
    /// [`IntentKind::Unknown`] with confidence `0.0`.  Matching ignores
    /// surrounding whitespace; `raw_text` keeps the input as given.
    pub fn parse(&self, text: &str) -> Intent {
        if self.llm_enabled
            && let Some(llm) = &self.llm
        {
            match self.parse_with_llm(llm.as_ref(), text) {
                Ok(intent) => {
                    info!(
                        intent = %intent.kind,
                        confidence = intent.confidence,
                        backend = llm.name(),
                        "intent parsed via LLM"
                    );
                    return intent;
                }
                Err(e) => {
                    warn!(error = %e, "LLM parsing failed, falling back to rules");
                }
            }
        }

        self.parse_with_rules(text)
    }

    /// Run only the rule tier.
    pub fn parse_with_rules(&self, text: &str) -> Intent {
        let Some(hit) = self.router.best_match(text.trim()) else {
            debug!(text = text, "no intent rule matched");
            return Intent::unknown(text);
        };

        let kind = match hit.handler.parse::<IntentKind>() {
            Ok(kind) => kind,
            Err(_) => return Intent::unknown(text),
        };
        let entities = extract_entities(kind, &hit);
        let suggested_action = suggested_action(kind, &entities);

        debug!(
            intent = %kind,
            confidence = hit.confidence,
            rule = hit.rule_index,
            "intent parsed via rules"
        );

        Intent {
            kind,
            confidence: hit.confidence,
            entities,
            raw_text: text.to_string(),
            suggested_action,
            source: ParseSource::Rules,
        }
    }

    fn parse_with_llm(&self, llm: &dyn LlmBackend, text: &str) -> Result<Intent> {
        let reply = llm.complete(&llm_system_prompt(), text.trim())?;
        parse_llm_json_response(&reply, text)
    }
}

impl Default for IntentParser {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Entity extraction
// ---------------------------------------------------------------------------

fn clean(raw: &str) -> String {
    raw.trim().trim_matches(|c| c == '\'' || c == '"').to_string()
}

fn extract_entities(kind: IntentKind, hit: &RouteMatch) -> HashMap<String, String> {
    let mut entities = HashMap::new();
    let first = hit.group(1);
    let second = hit.group(2);

    let mut put = |role: &str, value: String| {
        entities.insert(role.to_string(), value);
    };

    match kind {
        IntentKind::ReadFile
        | IntentKind::DeleteFile
        | IntentKind::ExtractPdf
        | IntentKind::ReadSpreadsheet
        | IntentKind::WriteSpreadsheet => {
            if let Some(path) = first {
                put("path", clean(path));
            }
        }
        IntentKind::WriteFile => match (first, second) {
            (Some(content), Some(path)) => {
                put("content", content.to_string());
                put("path", clean(path));
            }
            (Some(path), None) => put("path", clean(path)),
            _ => {}
        },
        IntentKind::CopyFile | IntentKind::MoveFile => match (first, second) {
            (Some(source), Some(destination)) => {
                put("source", clean(source));
                put("destination", clean(destination));
            }
            (Some(source), None) => put("source", clean(source)),
            _ => {}
        },
        IntentKind::ListFiles => {
            put("path", first.map(clean).unwrap_or_else(|| ".".to_string()));
        }
        IntentKind::CreateDocument | IntentKind::CreatePdf => {
            if let Some(path) = first {
                put("output_path", clean(path));
            }
        }
        IntentKind::FillForm => {
            if let Some(path) = first {
                put("form_path", clean(path));
            }
        }
        IntentKind::FetchUrl | IntentKind::ScrapePage => {
            if let Some(raw) = first {
                put("url", normalize_url(&clean(raw)));
            }
        }
        IntentKind::ApiCall => {
            if let Some(endpoint) = first {
                put("endpoint", clean(endpoint));
            }
        }
        IntentKind::SendEmail => {
            if let Some(recipient) = first {
                put("recipient", recipient.trim().to_string());
            }
        }
        IntentKind::QueryDatabase => {
            let query = first.unwrap_or(hit.matched.as_str());
            put("query", query.trim().to_string());
        }
        IntentKind::RunWorkflow => {
            if let Some(name) = first {
                put("workflow", clean(name));
            }
        }
        IntentKind::FilterData
        | IntentKind::Download
        | IntentKind::CreateWorkflow
        | IntentKind::Help
        | IntentKind::Status
        | IntentKind::Unknown => {}
    }

    entities
}

/// Prefix `https://` when the value does not already carry an http scheme.
fn normalize_url(raw: &str) -> String {
    if raw.starts_with("http") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    }
}

/// Deterministic description of an intent.
pub fn suggested_action(kind: IntentKind, entities: &HashMap<String, String>) -> String {
    let get = |role: &str, fallback: &'static str| -> String {
        entities
            .get(role)
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    };

    match kind {
        IntentKind::ReadFile => format!("Read file: {}", get("path", "<path>")),
        IntentKind::WriteFile => format!("Write to: {}", get("path", "<path>")),
        IntentKind::CopyFile => format!(
            "Copy {} to {}",
            get("source", "<source>"),
            get("destination", "<dest>")
        ),
        IntentKind::MoveFile => format!(
            "Move {} to {}",
            get("source", "<source>"),
            get("destination", "<dest>")
        ),
        IntentKind::DeleteFile => format!("Delete: {}", get("path", "<path>")),
        IntentKind::ListFiles => format!("List files in: {}", get("path", ".")),
        IntentKind::ReadSpreadsheet => format!("Read spreadsheet: {}", get("path", "<path>")),
        IntentKind::WriteSpreadsheet => format!("Write spreadsheet: {}", get("path", "<path>")),
        IntentKind::CreateDocument => format!("Create document: {}", get("output_path", "<path>")),
        IntentKind::FillForm => format!("Fill form: {}", get("form_path", "<path>")),
        IntentKind::CreatePdf => format!("Create PDF: {}", get("output_path", "<path>")),
        IntentKind::ExtractPdf => format!("Extract text from: {}", get("path", "<path>")),
        IntentKind::FetchUrl => format!("Fetch: {}", get("url", "<url>")),
        IntentKind::ScrapePage => format!("Scrape: {}", get("url", "<url>")),
        IntentKind::SendEmail => format!("Send email to: {}", get("recipient", "<recipient>")),
        IntentKind::Help => "Show available commands".to_string(),
        IntentKind::Status => "Show system status".to_string(),
        IntentKind::Unknown => UNKNOWN_SUGGESTION.to_string(),
        _ => "Execute action".to_string(),
    }
}

// ---------------------------------------------------------------------------
// LLM reply validation
// ---------------------------------------------------------------------------

/// Validate a model reply and map it onto an [`Intent`].
///
/// Markdown code fences around the JSON are tolerated.
fn parse_llm_json_response(json_text: &str, original_text: &str) -> Result<Intent> {
    let cleaned = json_text.trim();
    let cleaned = cleaned.strip_prefix("```json").unwrap_or(cleaned);
    let cleaned = cleaned.strip_prefix("```").unwrap_or(cleaned);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned);
    let cleaned = cleaned.trim();

    let parsed: Value = serde_json::from_str(cleaned).map_err(|e| IntentError::ParseFailed {
        reason: format!("failed to parse LLM response as JSON: {e}"),
    })?;
    let obj = parsed.as_object().ok_or_else(|| IntentError::ParseFailed {
        reason: "LLM response is not a JSON object".into(),
    })?;

    let kind: IntentKind = obj
        .get("intent")
        .and_then(Value::as_str)
        .ok_or_else(|| IntentError::ParseFailed {
            reason: "LLM response lacks a string `intent`".into(),
        })?
        .parse()?;

    let confidence = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| IntentError::ParseFailed {
            reason: "LLM response lacks a numeric `confidence`".into(),
        })?
        .clamp(0.0, 1.0);

    let entities: HashMap<String, String> = match obj.get("entities") {
        None | Some(Value::Null) => HashMap::new(),
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| match v {
                Value::Null => None,
                Value::String(s) => Some((k.clone(), s.clone())),
                other => Some((k.clone(), other.to_string())),
            })
            .collect(),
        Some(_) => {
            return Err(IntentError::ParseFailed {
                reason: "LLM response `entities` is not an object".into(),
            });
        }
    };

    let suggested_action = obj
        .get("suggested_action")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| suggested_action(kind, &entities));

    Ok(Intent {
        kind,
        confidence,
        entities,
        raw_text: original_text.to_string(),
        suggested_action,
        source: ParseSource::Llm,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use autho_agent::AgentError;

    struct StubLlm {
        reply: std::result::Result<String, String>,
        calls: AtomicU32,
    }

    impl StubLlm {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                calls: AtomicU32::new(0),
            })
        }

        fn failing(reason: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(reason.to_string()),
                calls: AtomicU32::new(0),
            })
        }
    }

    impl LlmBackend for StubLlm {
        fn name(&self) -> &str {
            "stub"
        }

        fn complete(&self, system: &str, _user: &str) -> autho_agent::Result<String> {
            assert!(system.contains("read_file"));
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().map_err(|reason| AgentError::Request { reason })
        }
    }

    // -- Rule tier ----------------------------------------------------------

    #[test]
    fn every_rule_compiles() {
        let expected: usize = RULES.iter().map(|(_, p)| p.len()).sum();
        assert_eq!(IntentParser::new().rule_count(), expected);
    }

    #[test]
    fn read_the_file() {
        let intent = IntentParser::new().parse("read the file report.txt");
        assert_eq!(intent.kind, IntentKind::ReadFile);
        assert_eq!(intent.entity("path"), Some("report.txt"));
        assert!(intent.confidence >= 0.3);
        assert_eq!(intent.suggested_action, "Read file: report.txt");
        assert_eq!(intent.source, ParseSource::Rules);
    }

    #[test]
    fn copy_with_source_and_destination() {
        let intent = IntentParser::new().parse("copy a.txt to backup/a.txt");
        assert_eq!(intent.kind, IntentKind::CopyFile);
        assert_eq!(intent.entity("source"), Some("a.txt"));
        assert_eq!(intent.entity("destination"), Some("backup/a.txt"));
        assert_eq!(intent.suggested_action, "Copy a.txt to backup/a.txt");
    }

    #[test]
    fn write_quoted_content() {
        let intent = IntentParser::new().parse(r#"write "hello world" to greeting.txt"#);
        assert_eq!(intent.kind, IntentKind::WriteFile);
        assert_eq!(intent.entity("content"), Some("hello world"));
        assert_eq!(intent.entity("path"), Some("greeting.txt"));
    }

    #[test]
    fn entities_are_trimmed_but_raw_text_is_kept() {
        let intent = IntentParser::new().parse("  delete 'old notes.txt'  ");
        assert_eq!(intent.kind, IntentKind::DeleteFile);
        assert_eq!(intent.entity("path"), Some("old notes.txt"));
        assert_eq!(intent.raw_text, "  delete 'old notes.txt'  ");
    }

    #[test]
    fn list_files_defaults_to_current_dir() {
        let intent = IntentParser::new().parse("list files");
        assert_eq!(intent.kind, IntentKind::ListFiles);
        assert_eq!(intent.entity("path"), Some("."));

        let intent = IntentParser::new().parse("list all files in documents/");
        assert_eq!(intent.entity("path"), Some("documents/"));
    }

    #[test]
    fn bare_host_gets_https_scheme() {
        let parser = IntentParser::new();
        let intent = parser.parse("fetch example.com");
        assert_eq!(intent.kind, IntentKind::FetchUrl);
        assert_eq!(intent.entity("url"), Some("https://example.com"));

        let intent = parser.parse("fetch http://example.com/a");
        assert_eq!(intent.entity("url"), Some("http://example.com/a"));

        let intent = parser.parse("scrape the page news.example.org");
        assert_eq!(intent.kind, IntentKind::ScrapePage);
        assert_eq!(intent.entity("url"), Some("https://news.example.org"));
    }

    #[test]
    fn help_and_status() {
        let parser = IntentParser::new();
        let help = parser.parse("help");
        assert_eq!(help.kind, IntentKind::Help);
        assert_eq!(help.suggested_action, "Show available commands");

        let status = parser.parse("STATUS");
        assert_eq!(status.kind, IntentKind::Status);
        assert_eq!(status.confidence, 0.9);
    }

    #[test]
    fn email_and_workflow_entities() {
        let parser = IntentParser::new();
        let email = parser.parse("send an email to bob@example.com");
        assert_eq!(email.kind, IntentKind::SendEmail);
        assert_eq!(email.entity("recipient"), Some("bob@example.com"));

        let run = parser.parse("run the workflow nightly-report");
        assert_eq!(run.kind, IntentKind::RunWorkflow);
        assert_eq!(run.entity("workflow"), Some("nightly-report"));
    }

    #[test]
    fn unmatched_input_is_unknown() {
        let parser = IntentParser::new();
        for text in ["xyzzy plugh", "", "   "] {
            let intent = parser.parse(text);
            assert_eq!(intent.kind, IntentKind::Unknown);
            assert_eq!(intent.confidence, 0.0);
            assert!(intent.entities.is_empty());
            assert!(!intent.suggested_action.is_empty());
        }
    }

    #[test]
    fn confidence_grows_with_covered_span() {
        let parser = IntentParser::new();
        // Same total length; the delete rule covers more of each later input.
        let inputs = [
            "zzzzzzzzz delete a",
            "zzzzzzz delete abc",
            "zzzzz delete abcde",
            "zzz delete abcdefg",
        ];
        let mut previous = 0.0;
        for text in inputs {
            let intent = parser.parse(text);
            assert_eq!(intent.kind, IntentKind::DeleteFile, "{text}");
            assert!(intent.confidence >= previous, "{text}");
            previous = intent.confidence;
        }
        assert!(previous <= 0.9);
    }

    #[test]
    fn intent_kind_wire_names_round_trip() {
        for kind in IntentKind::ALL {
            assert_eq!(kind.as_str().parse::<IntentKind>().unwrap(), kind);
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, Value::String(kind.as_str().to_string()));
        }
        assert!("teleport".parse::<IntentKind>().is_err());
    }

    // -- LLM tier -----------------------------------------------------------

    #[test]
    fn llm_reply_is_used_when_valid() {
        let stub = StubLlm::replying(
            r#"```json
{"intent": "fetch_url", "confidence": 0.95, "entities": {"url": "https://x.test", "retries": 2}, "suggested_action": "Grab it"}
```"#,
        );
        let parser = IntentParser::new().with_llm(stub.clone());

        let intent = parser.parse("grab the webpage x.test");
        assert_eq!(intent.kind, IntentKind::FetchUrl);
        assert_eq!(intent.source, ParseSource::Llm);
        assert_eq!(intent.confidence, 0.95);
        assert_eq!(intent.entity("url"), Some("https://x.test"));
        assert_eq!(intent.entity("retries"), Some("2"));
        assert_eq!(intent.suggested_action, "Grab it");
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn llm_confidence_is_clamped_and_suggestion_derived() {
        let stub = StubLlm::replying(r#"{"intent": "read_file", "confidence": 7, "entities": {"path": "a.txt"}}"#);
        let parser = IntentParser::new().with_llm(stub);

        let intent = parser.parse("anything");
        assert_eq!(intent.confidence, 1.0);
        assert_eq!(intent.suggested_action, "Read file: a.txt");
    }

    #[test]
    fn llm_failures_fall_back_to_rules() {
        let replies = [
            "not json at all",
            r#"{"intent": "teleport", "confidence": 0.9}"#,
            r#"{"intent": "read_file", "confidence": "high"}"#,
            r#"["read_file"]"#,
        ];
        for reply in replies {
            let parser = IntentParser::new().with_llm(StubLlm::replying(reply));
            let intent = parser.parse("copy a.txt to b.txt");
            assert_eq!(intent.source, ParseSource::Rules, "{reply}");
            assert_eq!(intent.kind, IntentKind::CopyFile);
        }

        let parser = IntentParser::new().with_llm(StubLlm::failing("connection refused"));
        let intent = parser.parse("copy a.txt to b.txt");
        assert_eq!(intent.source, ParseSource::Rules);
    }

    #[test]
    fn disabled_llm_is_not_called() {
        let stub = StubLlm::replying(r#"{"intent": "help", "confidence": 1.0}"#);
        let mut parser = IntentParser::new().with_llm(stub.clone());
        parser.set_llm_enabled(false);

        let intent = parser.parse("list files");
        assert_eq!(intent.kind, IntentKind::ListFiles);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
        assert_eq!(parser.llm_backend(), Some("stub"));
    }
}
