//! Intent parsing and workflow execution for Autho.
//!
//! This crate provides:
//!
//! - **Intent parsing**: rule table with an optional LLM first tier via
//!   [`parser::IntentParser`].
//! - **Variable context**: `{{name}}` template resolution via
//!   [`context::VariableContext`].
//! - **Conditions**: a closed boolean expression grammar in [`condition`].
//! - **Workflows**: declarative steps and builders in [`workflow`], run by
//!   [`executor::WorkflowExecutor`] into a [`executor::RunReport`].
//! - **Natural-language interface**: single-command dispatch via
//!   [`interface::NaturalLanguageInterface`].
//! - **Scheduling**: cron-driven workflow events via
//!   [`scheduler::CronScheduler`].

pub mod condition;
pub mod context;
pub mod error;
pub mod executor;
pub mod interface;
pub mod parser;
pub mod scheduler;
pub mod workflow;

pub use condition::Condition;
pub use context::VariableContext;
pub use error::{IntentError, Result};
pub use executor::{
    ConditionErrorPolicy, ExecutorOptions, RunReport, RunStatus, StepRecord, WorkflowExecutor,
};
pub use interface::{HistoryEntry, NaturalLanguageInterface, ProcessOutcome};
pub use parser::{Intent, IntentKind, IntentParser, ParseSource};
pub use scheduler::{CronEvent, CronScheduler, ScheduledJob};
pub use workflow::{ActionFn, ErrorPolicy, Step, StepPreview, StepState, StepStatus, Workflow};
