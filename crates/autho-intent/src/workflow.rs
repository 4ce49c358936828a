//! Workflow model: steps, workflows, builders and (de)serialization.
//!
//! A [`Workflow`] is an ordered list of [`Step`]s plus the
//! [`VariableContext`] they share.  Steps name an operation tag that the
//! [`WorkflowExecutor`](crate::executor::WorkflowExecutor) dispatches through
//! the capability registry; their parameters may hold `{{name}}`
//! placeholders that are resolved against the context when the step runs.
//!
//! Custom steps carry only the *name* of their action.  The closure itself
//! lives in the workflow's action table, is never serialized, and must be
//! registered again after a workflow is loaded from JSON.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use autho_kernel::{CapabilityError, Params};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::context::VariableContext;
use crate::error::{IntentError, Result};

/// Operation tag of steps that run a closure from the workflow's action table.
pub const CUSTOM_OPERATION: &str = "custom";

/// Parameter key naming the action a custom step runs.
pub const ACTION_PARAM: &str = "action";

/// Closure behind a custom step.
///
/// Receives the resolved step parameters (without the `action` key) and a
/// read-only view of the context.
pub type ActionFn =
    Arc<dyn Fn(&Params, &VariableContext) -> std::result::Result<Value, CapabilityError> + Send + Sync>;

// ---------------------------------------------------------------------------
// Step types
// ---------------------------------------------------------------------------

/// What to do once a step has exhausted its attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Record the step as failed and stop the run.
    #[default]
    Fail,
    /// Record the step as skipped and continue with the next step.
    Skip,
    /// Retry up to `retry_count` times, then behave like [`ErrorPolicy::Fail`].
    Retry,
}

/// Execution status of a step within the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-run execution state of a step.  Never serialized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepState {
    pub status: StepStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub duration: Duration,
}

/// One declarative unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique name within the workflow.
    pub name: String,
    /// Operation tag dispatched through the capability registry.
    #[serde(rename = "type")]
    pub operation: String,
    /// Parameters; string values may contain `{{name}}` placeholders.
    #[serde(default)]
    pub params: Params,
    /// Optional condition; the step only runs when it evaluates true.
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub on_error: ErrorPolicy,
    /// Extra attempts after the first failure.
    #[serde(default)]
    pub retry_count: u32,
    /// Seconds to wait between attempts.  `None` uses the executor default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<f64>,
    /// Context variable the step's result is written to.
    #[serde(default, rename = "save_result_as", alias = "save_as")]
    pub save_as: Option<String>,
    /// Steps that must complete earlier in the same run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip)]
    pub state: StepState,
}

impl Step {
    /// Create a step with no parameters.
    pub fn new(name: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operation: operation.into(),
            params: Params::new(),
            condition: None,
            on_error: ErrorPolicy::Fail,
            retry_count: 0,
            retry_delay: None,
            save_as: None,
            depends_on: Vec::new(),
            state: StepState::default(),
        }
    }

    /// Replace all parameters.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Set a single parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_on_error(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    /// Set the retry count and the delay between attempts in seconds.
    pub fn with_retry(mut self, count: u32, delay_secs: f64) -> Self {
        self.retry_count = count;
        self.retry_delay = Some(delay_secs);
        self
    }

    pub fn with_save_as(mut self, var: impl Into<String>) -> Self {
        self.save_as = Some(var.into());
        self
    }

    pub fn with_depends_on(mut self, step: impl Into<String>) -> Self {
        self.depends_on.push(step.into());
        self
    }

    /// Delay between attempts, falling back to `default` when unset.
    pub fn retry_delay_or(&self, default: Duration) -> Duration {
        match self.retry_delay {
            Some(secs) if secs.is_nan() || secs <= 0.0 => Duration::ZERO,
            Some(secs) => Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX),
            None => default,
        }
    }

    /// Total number of attempts the step may make.
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    /// Whether this step runs a closure from the action table.
    pub fn is_custom(&self) -> bool {
        self.operation == CUSTOM_OPERATION
    }

    /// Action name of a custom step.
    pub fn action_name(&self) -> Option<&str> {
        self.params.get(ACTION_PARAM).and_then(Value::as_str)
    }

    pub fn status(&self) -> StepStatus {
        self.state.status
    }

    /// Clear per-run state.
    pub fn reset(&mut self) {
        self.state = StepState::default();
    }
}

/// Preview entry produced by [`Workflow::dry_run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPreview {
    pub name: String,
    #[serde(rename = "type")]
    pub operation: String,
    pub params: Params,
    pub saves_as: Option<String>,
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// Ordered steps plus the context they share.
#[derive(Clone, Default)]
pub struct Workflow {
    pub name: String,
    pub description: String,
    pub steps: Vec<Step>,
    pub context: VariableContext,
    actions: HashMap<String, ActionFn>,
}

/// Serialized shape of a workflow definition.
#[derive(Serialize)]
struct DefinitionRef<'a> {
    name: &'a str,
    description: &'a str,
    steps: &'a [Step],
}

#[derive(Deserialize)]
struct Definition {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    steps: Vec<Step>,
}

impl Workflow {
    /// Create an empty workflow.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Seed a context variable.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.set(key, value.into());
        self
    }

    /// Append a step.
    pub fn add_step(mut self, step: Step) -> Self {
        if self.get_step(&step.name).is_some() {
            warn!(workflow = %self.name, step = %step.name, "duplicate step name");
        }
        self.steps.push(step);
        self
    }

    // -- Step builders --------------------------------------------------------

    /// Read a file; the content is saved under the step name.
    pub fn read_file(self, name: &str, path: &str) -> Self {
        self.add_step(Step::new(name, "read_file").with_param("path", path).with_save_as(name))
    }

    pub fn write_file(self, name: &str, path: &str, content: impl Into<Value>) -> Self {
        self.add_step(
            Step::new(name, "write_file")
                .with_param("path", path)
                .with_param("content", content),
        )
    }

    pub fn copy_file(self, name: &str, source: &str, destination: &str) -> Self {
        self.add_step(
            Step::new(name, "copy_file")
                .with_param("source", source)
                .with_param("destination", destination),
        )
    }

    pub fn move_file(self, name: &str, source: &str, destination: &str) -> Self {
        self.add_step(
            Step::new(name, "move_file")
                .with_param("source", source)
                .with_param("destination", destination),
        )
    }

    pub fn delete_file(self, name: &str, path: &str) -> Self {
        self.add_step(Step::new(name, "delete_file").with_param("path", path))
    }

    /// List a directory; the listing is saved under the step name.
    pub fn list_files(self, name: &str, path: &str, pattern: &str) -> Self {
        self.add_step(
            Step::new(name, "list_files")
                .with_param("path", path)
                .with_param("pattern", pattern)
                .with_save_as(name),
        )
    }

    /// HTTP GET; the response is saved under the step name.
    pub fn http_get(self, name: &str, url: &str) -> Self {
        self.add_step(
            Step::new(name, "http_get")
                .with_param("url", url)
                .with_param("headers", json!({}))
                .with_save_as(name),
        )
    }

    /// HTTP POST with a JSON body; the response is saved under the step name.
    pub fn http_post(self, name: &str, url: &str, body: Value) -> Self {
        self.add_step(
            Step::new(name, "http_post")
                .with_param("url", url)
                .with_param("json", body)
                .with_param("headers", json!({}))
                .with_save_as(name),
        )
    }

    /// Generic API request; the response is saved under the step name.
    pub fn api_call(self, name: &str, url: &str, method: &str) -> Self {
        self.add_step(
            Step::new(name, "api_call")
                .with_param("url", url)
                .with_param("method", method)
                .with_param("headers", json!({}))
                .with_save_as(name),
        )
    }

    pub fn download_file(self, name: &str, url: &str, output_path: &str) -> Self {
        self.add_step(
            Step::new(name, "download_file")
                .with_param("url", url)
                .with_param("output_path", output_path),
        )
    }

    pub fn log(self, name: &str, message: &str) -> Self {
        self.add_step(Step::new(name, "log_message").with_param("message", message))
    }

    pub fn wait(self, name: &str, seconds: f64) -> Self {
        self.add_step(Step::new(name, "wait").with_param("seconds", seconds))
    }

    /// Run a closure registered under `action`.
    ///
    /// `params` are stored on the step next to the action name and resolved
    /// against the context before the closure is called.
    pub fn custom<F>(mut self, name: &str, action: &str, func: F, params: Params) -> Self
    where
        F: Fn(&Params, &VariableContext) -> std::result::Result<Value, CapabilityError> + Send + Sync + 'static,
    {
        self.register_action(action, func);
        let mut step_params = params;
        step_params.insert(ACTION_PARAM.into(), Value::String(action.into()));
        self.add_step(Step::new(name, CUSTOM_OPERATION).with_params(step_params))
    }

    /// Transform the context variable `source_var`; the output is saved under
    /// the step name.  The closure sees `None` when the variable is missing.
    pub fn transform<F>(mut self, name: &str, source_var: &str, func: F) -> Self
    where
        F: Fn(Option<&Value>) -> std::result::Result<Value, CapabilityError> + Send + Sync + 'static,
    {
        self.register_action(name, move |params: &Params, ctx: &VariableContext| {
            let source = params.get("source_var").and_then(Value::as_str);
            func(source.and_then(|var| ctx.get(var)))
        });
        self.add_step(
            Step::new(name, CUSTOM_OPERATION)
                .with_param(ACTION_PARAM, name)
                .with_param("source_var", source_var)
                .with_save_as(name),
        )
    }

    // -- Last-step modifiers --------------------------------------------------

    /// Save the most recently added step's result under `var`.
    pub fn save_as(self, var: &str) -> Self {
        self.map_last(|step| step.with_save_as(var))
    }

    /// Guard the most recently added step with a condition.
    pub fn when(self, condition: &str) -> Self {
        self.map_last(|step| step.with_condition(condition))
    }

    /// Set the error policy of the most recently added step.
    pub fn on_error(self, policy: ErrorPolicy) -> Self {
        self.map_last(|step| step.with_on_error(policy))
    }

    /// Set retries on the most recently added step.
    pub fn retry(self, count: u32, delay_secs: f64) -> Self {
        self.map_last(|step| step.with_retry(count, delay_secs))
    }

    /// Make the most recently added step depend on `step`.
    pub fn after(self, step: &str) -> Self {
        self.map_last(|last| last.with_depends_on(step))
    }

    /// Set a parameter on the most recently added step.
    pub fn param(self, key: &str, value: impl Into<Value>) -> Self {
        self.map_last(|step| step.with_param(key, value))
    }

    fn map_last(mut self, f: impl FnOnce(Step) -> Step) -> Self {
        match self.steps.pop() {
            Some(step) => self.steps.push(f(step)),
            None => warn!(workflow = %self.name, "step modifier used before any step was added"),
        }
        self
    }

    // -- Actions --------------------------------------------------------------

    /// Register (or replace) a custom action.
    pub fn register_action<F>(&mut self, action: &str, func: F)
    where
        F: Fn(&Params, &VariableContext) -> std::result::Result<Value, CapabilityError> + Send + Sync + 'static,
    {
        if self.actions.insert(action.to_string(), Arc::new(func)).is_some() {
            debug!(workflow = %self.name, action, "replaced custom action");
        }
    }

    pub fn action(&self, action: &str) -> Option<&ActionFn> {
        self.actions.get(action)
    }

    /// Actions referenced by custom steps that have no registered closure.
    pub fn missing_actions(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.is_custom())
            .filter_map(Step::action_name)
            .filter(|name| !self.actions.contains_key(*name))
            .collect()
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut [Step], &mut VariableContext, &HashMap<String, ActionFn>) {
        (self.steps.as_mut_slice(), &mut self.context, &self.actions)
    }

    // -- Inspection -----------------------------------------------------------

    pub fn get_step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Remove a step by name.
    pub fn remove_step(&mut self, name: &str) -> Result<Step> {
        let index = self
            .steps
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| IntentError::StepNotFound { name: name.to_string() })?;
        Ok(self.steps.remove(index))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Preview every step without executing anything.
    pub fn dry_run(&self) -> Vec<StepPreview> {
        self.steps
            .iter()
            .map(|s| StepPreview {
                name: s.name.clone(),
                operation: s.operation.clone(),
                params: s.params.clone(),
                saves_as: s.save_as.clone(),
            })
            .collect()
    }

    /// Clear the context and every step's per-run state.
    pub fn reset(&mut self) {
        self.context.clear();
        for step in &mut self.steps {
            step.reset();
        }
    }

    /// Check structural invariants: non-empty unique step names, non-empty
    /// operation tags and dependencies that name other steps.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(invalid("step with empty name"));
            }
            if step.operation.trim().is_empty() {
                return Err(invalid(format!("step `{}` has no type", step.name)));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(invalid(format!("duplicate step name `{}`", step.name)));
            }
        }
        for step in &self.steps {
            if let Some(dep) = step.depends_on.iter().find(|d| !seen.contains(d.as_str())) {
                return Err(invalid(format!("step `{}` depends on unknown step `{dep}`", step.name)));
            }
        }
        Ok(())
    }

    // -- Serialization --------------------------------------------------------

    /// Export the definition as pretty JSON.  Custom closures are not
    /// exported; their steps keep only the action name.
    pub fn to_json(&self) -> Result<String> {
        let def = DefinitionRef {
            name: &self.name,
            description: &self.description,
            steps: &self.steps,
        };
        Ok(serde_json::to_string_pretty(&def)?)
    }

    /// Import a definition.  Custom actions must be registered again.
    pub fn from_json(json: &str) -> Result<Self> {
        let def: Definition = serde_json::from_str(json)?;
        let workflow = Self {
            name: def.name,
            description: def.description,
            steps: def.steps,
            ..Self::default()
        };
        workflow.validate()?;
        let missing = workflow.missing_actions();
        if !missing.is_empty() {
            debug!(workflow = %workflow.name, actions = ?missing, "custom actions need registering");
        }
        Ok(workflow)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|source| file_error(path, source))
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| file_error(path, source))?;
        Self::from_json(&json)
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<&String> = self.actions.keys().collect();
        actions.sort();
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("steps", &self.steps)
            .field("context", &self.context)
            .field("actions", &actions)
            .finish()
    }
}

fn invalid(reason: impl Into<String>) -> IntentError {
    IntentError::InvalidWorkflow { reason: reason.into() }
}

fn file_error(path: &Path, source: std::io::Error) -> IntentError {
    IntentError::WorkflowFile {
        path: path.display().to_string(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
