//! Configuration for the kitchen workflows
//!
//! Values come from environment variables with sensible defaults, so the demo
//! runs with nothing but an `OPENAI_API_KEY`.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("could not build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KitchenConfig {
    /// Chat model used by every agent
    pub model: String,

    /// Sampling temperature, provider default when unset
    pub temperature: Option<f32>,

    /// Base URL of the microwave HTTP API (the `state` resource lives below it)
    pub microwave_base_url: String,

    /// Base URL of the music player API
    pub music_base_url: String,

    /// Bearer token for the music player API
    pub music_access_token: Option<String>,

    /// Upper bound on handoffs in a single run
    pub max_handoffs: usize,

    /// Upper bound on model calls within one agent turn
    pub max_agent_steps: usize,

    /// Number of turns in the round-robin chef chat
    pub group_chat_max_iterations: usize,

    /// Run independent tool calls of one turn concurrently
    pub parallel_tools: bool,

    /// Timeout for tool HTTP calls
    pub http_timeout: Duration,
}

impl Default for KitchenConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: None,
            microwave_base_url: "http://localhost:5080/".to_string(),
            music_base_url: "https://api.spotify.com/v1/".to_string(),
            music_access_token: None,
            max_handoffs: 10,
            max_agent_steps: 8,
            group_chat_max_iterations: 1,
            parallel_tools: false,
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl KitchenConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(model) = lookup("OPENAI_MODEL") {
            config.model = model;
        }
        if let Some(raw) = lookup("OPENAI_TEMPERATURE") {
            config.temperature = Some(parse("OPENAI_TEMPERATURE", &raw)?);
        }
        if let Some(url) = lookup("MICROWAVE_BASE_URL") {
            config.microwave_base_url = url;
        }
        if let Some(url) = lookup("MUSIC_BASE_URL") {
            config.music_base_url = url;
        }
        config.music_access_token = lookup("MUSIC_ACCESS_TOKEN");
        if let Some(raw) = lookup("MAX_HANDOFFS") {
            config.max_handoffs = parse("MAX_HANDOFFS", &raw)?;
        }
        if let Some(raw) = lookup("MAX_AGENT_STEPS") {
            config.max_agent_steps = parse("MAX_AGENT_STEPS", &raw)?;
        }
        if let Some(raw) = lookup("GROUP_CHAT_MAX_ITERATIONS") {
            config.group_chat_max_iterations = parse("GROUP_CHAT_MAX_ITERATIONS", &raw)?;
        }
        if let Some(raw) = lookup("PARALLEL_TOOLS") {
            config.parallel_tools = parse("PARALLEL_TOOLS", &raw)?;
        }
        if let Some(raw) = lookup("HTTP_TIMEOUT_SECS") {
            config.http_timeout = Duration::from_secs(parse("HTTP_TIMEOUT_SECS", &raw)?);
        }

        Ok(config)
    }

    /// HTTP client shared by the tool adapters.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder().timeout(self.http_timeout).build()
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
