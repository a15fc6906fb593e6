use std::time::Duration;

use crate::errors::HarnessError;

/// Default model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Default system prompt prepended to every conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert business management trainer and \
     scenario designer. Create realistic, engaging scenarios that teach practical management skills.";

const ENV_BASE_URL: &str = "SCENARIO_LLM_BASE_URL";
const ENV_API_KEY: &str = "SCENARIO_LLM_API_KEY";
const ENV_MODEL: &str = "SCENARIO_LLM_MODEL";
const ENV_TIMEOUT_SECS: &str = "SCENARIO_LLM_TIMEOUT_SECS";

/// Connection settings for an OpenAI-compatible chat endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Base URL, for example `https://api.openai.com/v1`.
    pub base_url: String,
    /// API key used for bearer auth. May be empty for local endpoints.
    pub api_key: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// System prompt prepended to the conversation.
    pub system_prompt: String,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
}

impl ConnectionConfig {
    /// Creates a config with defaults for everything but the endpoint and key.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Loads a `.env` file if present, then reads the `SCENARIO_LLM_*` variables.
    ///
    /// Returns `Ok(None)` when no base URL is set; the orchestrator rejects
    /// requests in that state.
    pub fn from_env() -> Result<Option<Self>, HarnessError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from `lookup`, which maps a variable name to its value.
    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, HarnessError> {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let Some(base_url) = read(ENV_BASE_URL) else {
            return Ok(None);
        };
        let mut config = Self::new(base_url, read(ENV_API_KEY).unwrap_or_default());
        if let Some(model) = read(ENV_MODEL) {
            config.model = model;
        }
        if let Some(raw) = read(ENV_TIMEOUT_SECS) {
            let secs = raw.parse::<u64>().map_err(|e| {
                HarnessError::Config(format!("invalid {ENV_TIMEOUT_SECS} '{raw}': {e}"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(Some(config))
    }

    /// Overrides the model identifier.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Overrides the system prompt.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Overrides the HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// True when an endpoint has been configured.
    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty()
    }

    pub(crate) fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}
