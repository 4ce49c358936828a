//! `autho.toml` configuration.
//!
//! Every section and key is optional.  String values may reference
//! environment variables as `${NAME}`; unset variables expand to the empty
//! string.  A missing file is not an error and yields the defaults.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use autho_adapters::AdapterSettings;
use autho_adapters::http::{DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use autho_agent::llm::client::{DEFAULT_ANTHROPIC_MODEL, DEFAULT_OPENAI_MODEL};
use autho_agent::{LlmClientConfig, LlmProvider};
use autho_intent::executor::DEFAULT_RETRY_DELAY;
use autho_intent::{ConditionErrorPolicy, ExecutorOptions};
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

/// Used when neither `--config` nor `AUTHO_CONFIG` is given.
pub const DEFAULT_CONFIG_FILE: &str = "autho.toml";

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("environment variable pattern is valid")
});

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AuthoConfig {
    pub logging: LoggingConfig,
    pub llm: LlmConfig,
    pub executor: ExecutorConfig,
    pub filesystem: FilesystemConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    /// `anthropic` or `openai`.
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: LlmProvider::Anthropic.as_str().into(),
            model: None,
            base_url: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub condition_error: ConditionErrorPolicy,
    pub default_retry_delay_secs: f64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            condition_error: ConditionErrorPolicy::default(),
            default_retry_delay_secs: DEFAULT_RETRY_DELAY.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilesystemConfig {
    /// Sandbox root for file operations; the working directory when unset.
    pub root_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Pick the configuration file: the flag, then `AUTHO_CONFIG`, then
/// [`DEFAULT_CONFIG_FILE`].
pub fn resolve_path(flag: Option<&Path>) -> PathBuf {
    flag.map(Path::to_path_buf)
        .or_else(|| env_non_empty("AUTHO_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

impl AuthoConfig {
    /// Load `path`, or the defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content, |name| std::env::var(name).ok())
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Parse TOML text, expanding `${NAME}` references with `lookup`.
    pub fn parse(content: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let table: toml::Table = content.parse().context("malformed TOML")?;
        let mut value = toml::Value::Table(table);
        expand_value(&mut value, &lookup);
        value.try_into::<Self>().context("unexpected configuration value")
    }

    /// Build the LLM client configuration, if the LLM tier is enabled and a
    /// credential is available.
    ///
    /// The key in the file wins.  Otherwise the environment key for the
    /// configured provider is used, then the other provider's key
    /// (`ANTHROPIC_API_KEY` before `OPENAI_API_KEY`).
    pub fn llm_client_config(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<LlmClientConfig>> {
        if !self.llm.enabled {
            return Ok(None);
        }
        let configured: LlmProvider = self.llm.provider.parse()?;

        let from_env = |provider: LlmProvider| {
            let var = match provider {
                LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
                LlmProvider::OpenAI => "OPENAI_API_KEY",
            };
            lookup(var).filter(|k| !k.is_empty()).map(|k| (provider, k))
        };

        let credential = match self.llm.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => Some((configured, key.to_string())),
            None => from_env(configured)
                .or_else(|| from_env(LlmProvider::Anthropic))
                .or_else(|| from_env(LlmProvider::OpenAI)),
        };
        let Some((provider, api_key)) = credential else {
            debug!("no LLM credential configured");
            return Ok(None);
        };

        // A configured model only applies to the configured provider.
        let model = match &self.llm.model {
            Some(model) if provider == configured => model.clone(),
            _ => match provider {
                LlmProvider::Anthropic => DEFAULT_ANTHROPIC_MODEL.to_string(),
                LlmProvider::OpenAI => DEFAULT_OPENAI_MODEL.to_string(),
            },
        };

        let mut config = match provider {
            LlmProvider::Anthropic => LlmClientConfig::anthropic(api_key, model),
            LlmProvider::OpenAI => LlmClientConfig::openai(api_key, model),
        };
        if let Some(url) = self.llm.base_url.as_deref().filter(|u| !u.is_empty())
            && provider == configured
        {
            config = config.with_base_url(url);
        }
        Ok(Some(config))
    }

    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            condition_error: self.executor.condition_error,
            default_retry_delay: Duration::try_from_secs_f64(self.executor.default_retry_delay_secs)
                .unwrap_or(DEFAULT_RETRY_DELAY),
        }
    }

    pub fn adapter_settings(&self) -> AdapterSettings {
        AdapterSettings {
            root_dir: self.filesystem.root_dir.clone().unwrap_or_else(|| PathBuf::from(".")),
            user_agent: self.http.user_agent.clone(),
            timeout_secs: self.http.timeout_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// Environment expansion
// ---------------------------------------------------------------------------

/// Replace every `${NAME}` in `text`.
pub fn expand_env(text: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    ENV_VAR
        .replace_all(text, |caps: &regex::Captures<'_>| lookup(&caps[1]).unwrap_or_default())
        .into_owned()
}

fn expand_value(value: &mut toml::Value, lookup: &dyn Fn(&str) -> Option<String>) {
    match value {
        toml::Value::String(s) => *s = expand_env(s, lookup),
        toml::Value::Array(items) => items.iter_mut().for_each(|v| expand_value(v, lookup)),
        toml::Value::Table(table) => table.iter_mut().for_each(|(_, v)| expand_value(v, lookup)),
        _ => {}
    }
}

/// Read an environment variable, treating empty values as unset.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = AuthoConfig::parse("", env(&[])).unwrap();
        assert_eq!(config, AuthoConfig::default());
        assert_eq!(config.logging.level, "info");
        assert!(config.llm.enabled);
        assert_eq!(config.executor.condition_error, ConditionErrorPolicy::Skip);
        assert_eq!(config.http.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuthoConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AuthoConfig::default());
    }

    #[test]
    fn sections_are_parsed() {
        let toml = r#"
            [logging]
            level = "debug"

            [llm]
            enabled = false
            provider = "openai"
            model = "gpt-4o-mini"

            [executor]
            condition_error = "proceed"
            default_retry_delay_secs = 0.25

            [filesystem]
            root_dir = "/srv/data"

            [http]
            timeout_secs = 5
        "#;
        let config = AuthoConfig::parse(toml, env(&[])).unwrap();

        assert_eq!(config.logging.level, "debug");
        assert!(!config.llm.enabled);
        assert_eq!(config.llm.model.as_deref(), Some("gpt-4o-mini"));

        let options = config.executor_options();
        assert_eq!(options.condition_error, ConditionErrorPolicy::Proceed);
        assert_eq!(options.default_retry_delay, Duration::from_millis(250));

        let settings = config.adapter_settings();
        assert_eq!(settings.root_dir, PathBuf::from("/srv/data"));
        assert_eq!(settings.timeout_secs, 5);
        assert_eq!(settings.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn load_reads_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autho.toml");
        std::fs::write(&path, "[logging]\nlevel = \"warn\"\n").unwrap();
        assert_eq!(AuthoConfig::load(&path).unwrap().logging.level, "warn");

        std::fs::write(&path, "[logging\nlevel = ").unwrap();
        assert!(AuthoConfig::load(&path).is_err());
    }

    #[test]
    fn environment_references_are_expanded() {
        let toml = r#"
            [llm]
            api_key = "${MY_KEY}"
            base_url = "https://${HOST}/api"

            [filesystem]
            root_dir = "${HOME_DIR}/work"
        "#;
        let config =
            AuthoConfig::parse(toml, env(&[("MY_KEY", "sk-123"), ("HOST", "llm.local")])).unwrap();

        assert_eq!(config.llm.api_key.as_deref(), Some("sk-123"));
        assert_eq!(config.llm.base_url.as_deref(), Some("https://llm.local/api"));
        assert_eq!(config.filesystem.root_dir, Some(PathBuf::from("/work")));
    }

    #[test]
    fn expand_env_leaves_other_text_alone() {
        let lookup = env(&[("A", "1")]);
        assert_eq!(expand_env("x=${A} y=$A z=${B}", lookup), "x=1 y=$A z=");
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(AuthoConfig::parse("[executor]\ncondition_error = \"explode\"", env(&[])).is_err());
        assert!(AuthoConfig::parse("[http]\ntimeout_secs = \"soon\"", env(&[])).is_err());
    }

    // -- LLM credentials ------------------------------------------------------

    #[test]
    fn file_key_wins() {
        let config = AuthoConfig::parse(
            "[llm]\napi_key = \"from-file\"\nmodel = \"claude-custom\"",
            env(&[("ANTHROPIC_API_KEY", "from-env")]),
        )
        .unwrap();
        let llm = config
            .llm_client_config(env(&[("ANTHROPIC_API_KEY", "from-env")]))
            .unwrap()
            .unwrap();
        assert_eq!(llm.provider, LlmProvider::Anthropic);
        assert_eq!(llm.api_key, "from-file");
        assert_eq!(llm.model, "claude-custom");
    }

    #[test]
    fn anthropic_key_is_preferred_from_the_environment() {
        let config = AuthoConfig::default();
        let llm = config
            .llm_client_config(env(&[("OPENAI_API_KEY", "sk-o"), ("ANTHROPIC_API_KEY", "sk-a")]))
            .unwrap()
            .unwrap();
        assert_eq!(llm.provider, LlmProvider::Anthropic);
        assert_eq!(llm.api_key, "sk-a");
        assert_eq!(llm.model, DEFAULT_ANTHROPIC_MODEL);
    }

    #[test]
    fn falls_back_to_the_openai_key() {
        let config = AuthoConfig::default();
        let llm = config
            .llm_client_config(env(&[("OPENAI_API_KEY", "sk-o")]))
            .unwrap()
            .unwrap();
        assert_eq!(llm.provider, LlmProvider::OpenAI);
        assert_eq!(llm.model, DEFAULT_OPENAI_MODEL);
    }

    #[test]
    fn configured_provider_uses_its_own_key_first() {
        let config = AuthoConfig::parse(
            "[llm]\nprovider = \"openai\"\nbase_url = \"http://localhost:8080\"",
            env(&[]),
        )
        .unwrap();
        let llm = config
            .llm_client_config(env(&[("OPENAI_API_KEY", "sk-o"), ("ANTHROPIC_API_KEY", "sk-a")]))
            .unwrap()
            .unwrap();
        assert_eq!(llm.provider, LlmProvider::OpenAI);
        assert_eq!(llm.base_url, "http://localhost:8080");
    }

    #[test]
    fn no_key_or_disabled_means_rules_only() {
        let config = AuthoConfig::default();
        assert!(config.llm_client_config(env(&[])).unwrap().is_none());

        let disabled = AuthoConfig::parse("[llm]\nenabled = false", env(&[])).unwrap();
        assert!(
            disabled
                .llm_client_config(env(&[("ANTHROPIC_API_KEY", "sk-a")]))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let config = AuthoConfig::parse("[llm]\nprovider = \"mystery\"", env(&[])).unwrap();
        assert!(config.llm_client_config(env(&[])).is_err());
    }
}
