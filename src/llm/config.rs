//! LLM configuration parsed from environment variables.

use std::time::Duration;

use crate::error::GenerationError;

pub const DEFAULT_API_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_LLM_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_LLM_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlmTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl LlmTimeouts {
    #[must_use]
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    #[must_use]
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeouts: LlmTimeouts,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    /// Sent as `HTTP-Referer` so the upstream can attribute traffic.
    pub app_referer: Option<String>,
    /// Sent as `X-Title`.
    pub app_title: Option<String>,
}

impl LlmConfig {
    /// Build typed LLM config from environment variables.
    ///
    /// Optional:
    /// - `LLM_API_KEY_ENV`: names the env var holding the key (default `OPENROUTER_API_KEY`)
    /// - `LLM_BASE_URL`: default `https://openrouter.ai/api/v1`
    /// - `LLM_MODEL`: default `openai/gpt-4o-mini`
    /// - `LLM_REQUEST_TIMEOUT_SECS`: default 60
    /// - `LLM_CONNECT_TIMEOUT_SECS`: default 10
    /// - `LLM_RETRY_ATTEMPTS`: default 2
    /// - `LLM_RETRY_DELAY_MS`: default 1000
    /// - `LLM_APP_REFERER`, `LLM_APP_TITLE`: unset by default
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Auth`] if the API key variable is unset or empty.
    pub fn from_env() -> Result<Self, GenerationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. `from_env` delegates here.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Auth`] if the API key is missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GenerationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key_var = lookup("LLM_API_KEY_ENV").unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string());
        let api_key = lookup(&key_var)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GenerationError::Auth(format!("missing API key: env var {key_var} not set")))?;

        let base_url = lookup("LLM_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let model = lookup("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let timeouts = LlmTimeouts {
            request_secs: parse_or(&lookup, "LLM_REQUEST_TIMEOUT_SECS", DEFAULT_LLM_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_or(&lookup, "LLM_CONNECT_TIMEOUT_SECS", DEFAULT_LLM_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self {
            api_key,
            base_url,
            model,
            timeouts,
            retry_attempts: parse_or(&lookup, "LLM_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS),
            retry_delay_ms: parse_or(&lookup, "LLM_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS),
            app_referer: lookup("LLM_APP_REFERER"),
            app_title: lookup("LLM_APP_TITLE"),
        })
    }
}

pub(crate) fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
