//! Workflow executor.
//!
//! Walks a workflow's steps strictly in order on the calling thread.  Each
//! step moves through `Pending -> Running -> Completed | Failed | Skipped`:
//!
//! 1. Dependencies named in `depends_on` must have completed earlier in the
//!    same run, otherwise the step is skipped.
//! 2. The condition, if any, is evaluated against the context.  A false
//!    condition skips the step; an evaluation error is handled per
//!    [`ConditionErrorPolicy`].
//! 3. Parameters are resolved against the context and the operation is
//!    dispatched, either through the [`CapabilityRegistry`] or, for custom
//!    steps, through the workflow's action table.
//! 4. Failures are retried with a fixed delay.  Once attempts run out the
//!    step is skipped (`on_error = "skip"`) or fails the whole run.
//!
//! Nothing inside a run is returned as an error; every outcome lands in the
//! [`RunReport`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use autho_kernel::{CapabilityError, CapabilityRegistry, Params, display_value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::condition::{self, truthy};
use crate::context::VariableContext;
use crate::workflow::{ACTION_PARAM, ActionFn, ErrorPolicy, Step, StepStatus, Workflow};

/// Maximum characters kept in a step record's result preview.
pub const RESULT_PREVIEW_CHARS: usize = 200;

/// Delay between attempts for steps that do not set one.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How a condition that cannot be evaluated is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionErrorPolicy {
    /// Skip the step.
    #[default]
    Skip,
    /// Run the step as if the condition were true.
    Proceed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorOptions {
    pub condition_error: ConditionErrorPolicy,
    /// Used for steps whose `retry_delay` is unset.
    pub default_retry_delay: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            condition_error: ConditionErrorPolicy::Skip,
            default_retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Outcome of one step within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub operation: String,
    pub status: StepStatus,
    pub attempts: u32,
    /// Wall-clock seconds.
    pub duration: f64,
    /// String form of the result, truncated.  `None` for empty results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Why the step was skipped without running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Structured outcome of one [`WorkflowExecutor::run`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub workflow: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Wall-clock seconds.
    pub duration: f64,
    /// Step records in execution order.
    pub steps: Vec<StepRecord>,
    /// Values saved by steps with a `save_as` target during this run.
    pub results: Map<String, Value>,
    pub failed_step: Option<String>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Runs workflows against a capability registry.
#[derive(Clone)]
pub struct WorkflowExecutor {
    registry: Arc<CapabilityRegistry>,
    options: ExecutorOptions,
}

impl WorkflowExecutor {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            options: ExecutorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Run a workflow with its current context.
    pub fn run(&self, workflow: &mut Workflow) -> RunReport {
        self.run_with_context(workflow, std::iter::empty())
    }

    /// Merge `initial` into the workflow's context, then run it.
    ///
    /// Per-step state is reset at the start of every run; the context keeps
    /// values from earlier runs until [`Workflow::reset`] is called.
    pub fn run_with_context<I>(&self, workflow: &mut Workflow, initial: I) -> RunReport
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        let clock = Instant::now();
        let name = workflow.name.clone();

        info!(workflow = %name, %run_id, steps = workflow.steps.len(), "starting workflow");

        let (steps, context, actions) = workflow.parts_mut();
        context.extend(initial);
        for step in steps.iter_mut() {
            step.reset();
        }

        let mut records = Vec::with_capacity(steps.len());
        let mut results = Map::new();
        let mut completed: HashSet<String> = HashSet::new();
        let mut failed_step = None;

        for step in steps.iter_mut() {
            let outcome = self.run_step(step, context, actions, &completed, &mut results);
            match outcome.status {
                StepStatus::Completed => {
                    completed.insert(step.name.clone());
                }
                StepStatus::Failed => failed_step = Some(step.name.clone()),
                _ => {}
            }
            records.push(outcome);
            if failed_step.is_some() {
                break;
            }
        }

        let status = if failed_step.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        let duration = clock.elapsed().as_secs_f64();

        match status {
            RunStatus::Completed => info!(workflow = %name, %run_id, duration, "workflow completed"),
            RunStatus::Failed => error!(
                workflow = %name,
                %run_id,
                duration,
                failed_step = failed_step.as_deref().unwrap_or_default(),
                "workflow failed"
            ),
        }

        RunReport {
            run_id,
            workflow: name,
            status,
            started_at,
            completed_at: Utc::now(),
            duration,
            steps: records,
            results,
            failed_step,
        }
    }

    // -- Step state machine ---------------------------------------------------

    fn run_step(
        &self,
        step: &mut Step,
        context: &mut VariableContext,
        actions: &HashMap<String, ActionFn>,
        completed: &HashSet<String>,
        results: &mut Map<String, Value>,
    ) -> StepRecord {
        if let Some(dep) = step.depends_on.iter().find(|d| !completed.contains(*d)) {
            let reason = format!("dependency '{dep}' not completed");
            info!(step = %step.name, %reason, "skipping step");
            return skipped(step, reason);
        }

        if let Some(expression) = step.condition.as_deref() {
            match condition::evaluate(expression, context) {
                Ok(true) => {}
                Ok(false) => {
                    info!(step = %step.name, "skipping step: condition not met");
                    return skipped(step, "condition not met".into());
                }
                Err(e) => match self.options.condition_error {
                    ConditionErrorPolicy::Skip => {
                        warn!(step = %step.name, error = %e, "condition error, skipping step");
                        return skipped(step, format!("condition error: {e}"));
                    }
                    ConditionErrorPolicy::Proceed => {
                        warn!(step = %step.name, error = %e, "condition error, running step anyway");
                    }
                },
            }
        }

        info!(step = %step.name, operation = %step.operation, "executing step");
        step.state.status = StepStatus::Running;
        let started = Instant::now();
        let max_attempts = step.max_attempts();
        let delay = step.retry_delay_or(self.options.default_retry_delay);

        loop {
            step.state.attempts += 1;
            let attempt = step.state.attempts;
            let params = context.resolve_map(&step.params);

            match self.dispatch(step, params, context, actions) {
                Ok(value) => {
                    let summary = truthy(&value).then(|| preview(&value));
                    if let Some(var) = &step.save_as {
                        context.set(var.clone(), value.clone());
                        results.insert(var.clone(), value);
                    }
                    step.state.status = StepStatus::Completed;
                    step.state.last_error = None;
                    step.state.duration = started.elapsed();
                    info!(
                        step = %step.name,
                        attempt,
                        duration = step.state.duration.as_secs_f64(),
                        "completed step"
                    );
                    return record(step, summary, None, None);
                }
                Err(e) => {
                    let message = e.to_string();
                    step.state.last_error = Some(message.clone());

                    if attempt < max_attempts {
                        warn!(
                            step = %step.name,
                            attempt,
                            max_attempts,
                            error = %message,
                            "step failed, retrying"
                        );
                        std::thread::sleep(delay);
                        continue;
                    }

                    step.state.duration = started.elapsed();
                    step.state.status = match step.on_error {
                        ErrorPolicy::Skip => {
                            warn!(step = %step.name, error = %message, "skipping failed step");
                            StepStatus::Skipped
                        }
                        ErrorPolicy::Fail | ErrorPolicy::Retry => {
                            error!(step = %step.name, attempts = attempt, error = %message, "step failed");
                            StepStatus::Failed
                        }
                    };
                    return record(step, None, Some(message), None);
                }
            }
        }
    }

    fn dispatch(
        &self,
        step: &Step,
        mut params: Params,
        context: &VariableContext,
        actions: &HashMap<String, ActionFn>,
    ) -> std::result::Result<Value, CapabilityError> {
        if !step.is_custom() {
            return self.registry.invoke(&step.operation, &params);
        }

        let action = match params.remove(ACTION_PARAM) {
            Some(Value::String(name)) => name,
            _ => {
                return Err(CapabilityError::invalid(
                    &step.operation,
                    format!("missing '{ACTION_PARAM}' parameter"),
                ));
            }
        };
        let func = actions.get(&action).ok_or_else(|| {
            CapabilityError::failed(&step.operation, format!("action '{action}' is not registered"))
        })?;
        debug!(step = %step.name, %action, "invoking custom action");
        func(&params, context)
    }
}

fn skipped(step: &mut Step, reason: String) -> StepRecord {
    step.state.status = StepStatus::Skipped;
    step.state.duration = Duration::ZERO;
    record(step, None, None, Some(reason))
}

fn record(step: &Step, result: Option<String>, error: Option<String>, reason: Option<String>) -> StepRecord {
    StepRecord {
        name: step.name.clone(),
        operation: step.operation.clone(),
        status: step.state.status,
        attempts: step.state.attempts,
        duration: step.state.duration.as_secs_f64(),
        result,
        error,
        reason,
    }
}

fn preview(value: &Value) -> String {
    display_value(value).chars().take(RESULT_PREVIEW_CHARS).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
