//! LLM access for Autho.
//!
//! The intent parser can delegate command classification to a language
//! model.  This crate provides the [`LlmBackend`] seam the parser depends on
//! and [`LlmClient`], a blocking implementation speaking the Anthropic
//! Messages API and the OpenAI Chat Completions API.

pub mod error;
pub mod llm;

pub use error::{AgentError, Result};
pub use llm::{LlmBackend, LlmClient, LlmClientConfig, LlmProvider};
