//! Multi-provider LLM client.
//!
//! Supports the **Anthropic Messages API** and the **OpenAI Chat Completions
//! API** (including OpenAI-compatible endpoints such as Ollama or vLLM).
//! Requests are single-turn and non-streaming; the client blocks until the
//! reply arrives.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::error::{AgentError, Result};
use crate::llm::LlmBackend;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default Anthropic API base URL.
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Default OpenAI API base URL.
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model for command parsing on Anthropic.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-haiku-20240307";

/// Default model for command parsing on OpenAI.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

/// Parsing replies are short JSON objects.
const DEFAULT_MAX_TOKENS: u32 = 500;

/// Request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 60;

// ---------------------------------------------------------------------------
// Provider enum
// ---------------------------------------------------------------------------

/// Identifies which LLM provider the client should target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// Anthropic Messages API.
    Anthropic,
    /// OpenAI Chat Completions API (also covers OpenAI-compatible endpoints).
    OpenAI,
}

impl LlmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAI => "openai",
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAI),
            _ => Err(AgentError::UnknownProvider { name: s.to_string() }),
        }
    }
}

// ---------------------------------------------------------------------------
// Client configuration
// ---------------------------------------------------------------------------

/// Configuration for connecting to a single LLM provider endpoint.
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    /// Which provider this configuration targets.
    pub provider: LlmProvider,
    /// API key for authentication.
    pub api_key: String,
    /// Base URL for the API (e.g. `https://api.anthropic.com`).
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Maximum tokens per response.
    pub max_tokens: u32,
}

impl LlmClientConfig {
    /// Create a configuration for the Anthropic API.
    pub fn anthropic(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: LlmProvider::Anthropic,
            api_key: api_key.into(),
            base_url: ANTHROPIC_BASE_URL.to_owned(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Create a configuration for the OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_owned(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Create a configuration for any OpenAI-compatible API.
    pub fn openai_compatible(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::openai(api_key, model)
        }
    }

    /// Override the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the response token limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A blocking LLM client for either provider.
///
/// Must not be used from inside an async runtime worker; run it on a
/// blocking thread there.
#[derive(Debug, Clone)]
pub struct LlmClient {
    config: LlmClientConfig,
    http: Client,
}

impl LlmClient {
    /// Create a new client with the given configuration.
    pub fn new(config: LlmClientConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(AgentError::MissingApiKey {
                provider: config.provider.as_str().into(),
            });
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AgentError::Request {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { config, http })
    }

    /// Returns the configured provider.
    pub fn provider(&self) -> LlmProvider {
        self.config.provider
    }

    /// Returns the configured model.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    // -- Anthropic -------------------------------------------------------------

    fn complete_anthropic(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        let body = build_anthropic_request_body(&self.config, system, user);

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.config.api_key).map_err(|e| AgentError::Request {
                reason: format!("invalid API key header: {e}"),
            })?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        tracing::debug!(url = %url, model = %self.config.model, provider = "anthropic", "sending LLM request");

        let response = self.http.post(&url).headers(headers).json(&body).send()?;
        let value = read_json(response)?;
        parse_anthropic_response(&value)
    }

    // -- OpenAI ----------------------------------------------------------------

    fn complete_openai(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = build_openai_request_body(&self.config, system, user);

        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", self.config.api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value).map_err(|e| AgentError::Request {
                reason: format!("invalid authorization header: {e}"),
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        tracing::debug!(url = %url, model = %self.config.model, provider = "openai", "sending LLM request");

        let response = self.http.post(&url).headers(headers).json(&body).send()?;
        let value = read_json(response)?;
        parse_openai_response(&value)
    }
}

impl LlmBackend for LlmClient {
    fn name(&self) -> &str {
        self.config.provider.as_str()
    }

    fn complete(&self, system: &str, user: &str) -> Result<String> {
        match self.config.provider {
            LlmProvider::Anthropic => self.complete_anthropic(system, user),
            LlmProvider::OpenAI => self.complete_openai(system, user),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire format helpers
// ---------------------------------------------------------------------------

fn read_json(response: reqwest::blocking::Response) -> Result<Value> {
    let status = response.status();
    let text = response.text()?;
    if !status.is_success() {
        return Err(AgentError::Status {
            status: status.as_u16(),
            body: text,
        });
    }
    serde_json::from_str(&text).map_err(|e| AgentError::InvalidResponse {
        reason: format!("response is not JSON: {e}"),
    })
}

fn build_anthropic_request_body(config: &LlmClientConfig, system: &str, user: &str) -> Value {
    json!({
        "model": config.model,
        "max_tokens": config.max_tokens,
        "system": system,
        "messages": [
            {"role": "user", "content": user}
        ],
    })
}

fn build_openai_request_body(config: &LlmClientConfig, system: &str, user: &str) -> Value {
    json!({
        "model": config.model,
        "max_tokens": config.max_tokens,
        "messages": [
            {"role": "system", "content": system},
            {"role": "user", "content": user}
        ],
    })
}

/// Concatenate the text blocks of an Anthropic Messages API response.
fn parse_anthropic_response(v: &Value) -> Result<String> {
    let content = v["content"]
        .as_array()
        .ok_or_else(|| AgentError::InvalidResponse {
            reason: "missing `content` array in response".into(),
        })?;

    let text: String = content
        .iter()
        .filter(|block| block["type"] == "text")
        .filter_map(|block| block["text"].as_str())
        .collect();
    Ok(text)
}

/// Extract `choices[0].message.content` from an OpenAI response.
fn parse_openai_response(v: &Value) -> Result<String> {
    v["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| AgentError::InvalidResponse {
            reason: "missing `choices[0].message.content` in response".into(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_api_key_returns_error() {
        let config = LlmClientConfig::anthropic("", DEFAULT_ANTHROPIC_MODEL);
        let result = LlmClient::new(config);
        assert!(matches!(result, Err(AgentError::MissingApiKey { .. })));
    }

    #[test]
    fn anthropic_body_carries_system_prompt_separately() {
        let config = LlmClientConfig::anthropic("k", DEFAULT_ANTHROPIC_MODEL);
        let body = build_anthropic_request_body(&config, "sys", "hello");
        assert_eq!(body["system"], "sys");
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
    }

    #[test]
    fn openai_body_inlines_system_message() {
        let config = LlmClientConfig::openai("k", DEFAULT_OPENAI_MODEL);
        let body = build_openai_request_body(&config, "sys", "hello");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["model"], DEFAULT_OPENAI_MODEL);
    }

    #[test]
    fn parse_anthropic_text_blocks() {
        let v = json!({
            "content": [
                {"type": "text", "text": "{\"intent\":"},
                {"type": "text", "text": "\"help\"}"}
            ]
        });
        assert_eq!(parse_anthropic_response(&v).unwrap(), r#"{"intent":"help"}"#);
        assert!(parse_anthropic_response(&json!({})).is_err());
    }

    #[test]
    fn parse_openai_text() {
        let v = json!({"choices": [{"message": {"role": "assistant", "content": "hi"}}]});
        assert_eq!(parse_openai_response(&v).unwrap(), "hi");
        assert!(parse_openai_response(&json!({"choices": []})).is_err());
    }

    #[test]
    fn openai_compatible_config_construction() {
        let config = LlmClientConfig::openai_compatible("k", "llama3", "http://localhost:11434/v1")
            .with_max_tokens(256);
        assert_eq!(config.provider, LlmProvider::OpenAI);
        assert_eq!(config.base_url, "http://localhost:11434/v1");
        assert_eq!(config.max_tokens, 256);
    }

    #[test]
    fn provider_from_str() {
        assert_eq!("Anthropic".parse::<LlmProvider>().unwrap(), LlmProvider::Anthropic);
        assert_eq!("openai".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAI);
        assert!("gemini".parse::<LlmProvider>().is_err());
    }
}
