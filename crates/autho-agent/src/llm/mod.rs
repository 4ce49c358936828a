//! LLM integration layer.
//!
//! - [`client`] -- blocking HTTP client for Anthropic and OpenAI APIs.
//! - [`LlmBackend`] -- the single-turn completion trait consumers depend on,
//!   so tests and hosts can substitute their own model.

pub mod client;

pub use client::{LlmClient, LlmClientConfig, LlmProvider};

use crate::error::Result;

/// A language model that answers one prompt with text.
pub trait LlmBackend: Send + Sync {
    /// Short provider label used in logs and status output.
    fn name(&self) -> &str;

    /// Send a system prompt and a user message, returning the reply text.
    fn complete(&self, system: &str, user: &str) -> Result<String>;
}
