//! Intent engine error types.
//!
//! All intent subsystems surface construction-time and I/O errors through
//! [`IntentError`].  Runtime failures inside a workflow run or a
//! natural-language command never use this type; they are folded into the
//! run report or the command outcome instead.

/// Unified error type for the intent engine.
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    // -- Parser errors -------------------------------------------------------
    /// A language-model reply could not be turned into an intent.
    #[error("failed to parse intent: {reason}")]
    ParseFailed { reason: String },

    // -- Workflow errors ------------------------------------------------------
    /// A workflow definition is malformed.
    #[error("invalid workflow definition: {reason}")]
    InvalidWorkflow { reason: String },

    /// The referenced step does not exist.
    #[error("step not found: {name}")]
    StepNotFound { name: String },

    /// Reading or writing a workflow file failed.
    #[error("workflow file `{path}`: {source}")]
    WorkflowFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // -- Condition errors ------------------------------------------------------
    /// A step condition could not be parsed or evaluated.
    #[error("condition `{expression}`: {reason}")]
    Condition { expression: String, reason: String },

    // -- Scheduler errors ------------------------------------------------------
    /// A cron expression is invalid.
    #[error("invalid cron expression `{expression}`: {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    /// The referenced scheduled job does not exist.
    #[error("scheduled job not found: {job_id}")]
    JobNotFound { job_id: String },

    /// `start` was called on a scheduler whose loop is already running.
    #[error("scheduler is already running")]
    SchedulerRunning,

    // -- LLM errors ------------------------------------------------------------
    /// The language model could not be reached or answered badly.
    #[error("agent error: {0}")]
    Agent(#[from] autho_agent::AgentError),

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the intent crate.
pub type Result<T> = std::result::Result<T, IntentError>;
