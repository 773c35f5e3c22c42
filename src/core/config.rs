use std::env;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::errors::SummaryError;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MAX_SUMMARY_MESSAGES: usize = 500;

/// Deployment settings for the summarizer.
///
/// Admins may edit these at runtime, so consumers read a snapshot through a
/// [`ConfigProvider`] once per request and never go back to the source mid-request.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub enable_summarization: bool,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub openai_base_url: Option<String>,
    pub max_summary_messages: usize,
    /// Completion requests allowed per minute; zero disables the limiter.
    pub api_rate_limit: u32,
    pub request_timeout_secs: u64,
    /// Total attempts per completion call, including the first one.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Lifetime of a cached summary. Read per request, so edits apply to the
    /// next summary written.
    pub cache_ttl_secs: u64,
    pub orchestration_timeout_secs: u64,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            enable_summarization: true,
            openai_api_key: None,
            openai_model: None,
            openai_base_url: None,
            max_summary_messages: DEFAULT_MAX_SUMMARY_MESSAGES,
            api_rate_limit: 60,
            request_timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 250,
            cache_ttl_secs: 24 * 60 * 60,
            orchestration_timeout_secs: 60,
            temperature: 0.2,
            max_output_tokens: None,
        }
    }
}

impl AppConfig {
    /// # Errors
    ///
    /// Returns [`SummaryError::Configuration`] when a variable is present but malformed.
    pub fn from_env() -> Result<Self, SummaryError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source. Missing variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SummaryError::Configuration`] when a variable is present but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SummaryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            enable_summarization: parse_var(&lookup, "SUMMARIZER_ENABLED")?
                .unwrap_or(defaults.enable_summarization),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openai_model: non_empty("OPENAI_MODEL"),
            openai_base_url: non_empty("OPENAI_BASE_URL"),
            max_summary_messages: parse_var(&lookup, "SUMMARY_MAX_MESSAGES")?
                .unwrap_or(defaults.max_summary_messages),
            api_rate_limit: parse_var(&lookup, "OPENAI_RATE_LIMIT_RPM")?
                .unwrap_or(defaults.api_rate_limit),
            request_timeout_secs: parse_var(&lookup, "OPENAI_REQUEST_TIMEOUT_SECS")?
                .unwrap_or(defaults.request_timeout_secs),
            max_retries: parse_var(&lookup, "OPENAI_MAX_RETRIES")?
                .unwrap_or(defaults.max_retries),
            retry_base_delay_ms: parse_var(&lookup, "OPENAI_RETRY_BASE_DELAY_MS")?
                .unwrap_or(defaults.retry_base_delay_ms),
            cache_ttl_secs: parse_var(&lookup, "SUMMARY_CACHE_TTL_SECS")?
                .unwrap_or(defaults.cache_ttl_secs),
            orchestration_timeout_secs: parse_var(&lookup, "SUMMARY_TIMEOUT_SECS")?
                .unwrap_or(defaults.orchestration_timeout_secs),
            temperature: defaults.temperature,
            max_output_tokens: parse_var(&lookup, "OPENAI_MAX_OUTPUT_TOKENS")?,
        })
    }

    /// Checks the bounds an admin is allowed to set.
    ///
    /// # Errors
    ///
    /// Returns [`SummaryError::Configuration`] naming the first out-of-range setting.
    pub fn validate(&self) -> Result<(), SummaryError> {
        if !(100..=1000).contains(&self.max_summary_messages) {
            return Err(SummaryError::Configuration(
                "max_summary_messages must be between 100 and 1000".to_string(),
            ));
        }
        if !(1..=600).contains(&self.api_rate_limit) {
            return Err(SummaryError::Configuration(
                "api_rate_limit must be between 1 and 600".to_string(),
            ));
        }
        if !(5..=60).contains(&self.request_timeout_secs) {
            return Err(SummaryError::Configuration(
                "request_timeout_secs must be between 5 and 60".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn model(&self) -> &str {
        self.openai_model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        self.openai_base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    #[must_use]
    pub const fn message_limit(&self) -> usize {
        if self.max_summary_messages == 0 {
            DEFAULT_MAX_SUMMARY_MESSAGES
        } else {
            self.max_summary_messages
        }
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub const fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    #[must_use]
    pub const fn orchestration_timeout(&self) -> Duration {
        Duration::from_secs(self.orchestration_timeout_secs)
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>, SummaryError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| SummaryError::Configuration(format!("{name}: {e}"))),
        _ => Ok(None),
    }
}

/// Source of configuration snapshots.
pub trait ConfigProvider: Send + Sync {
    fn snapshot(&self) -> Arc<AppConfig>;
}

/// Admin-editable configuration. Updates swap the whole value, so a snapshot
/// handed out earlier never changes underneath its reader.
#[derive(Debug)]
pub struct LiveConfig {
    current: RwLock<Arc<AppConfig>>,
}

impl LiveConfig {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    pub fn update(&self, config: AppConfig) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Arc::new(config);
    }
}

impl ConfigProvider for LiveConfig {
    fn snapshot(&self) -> Arc<AppConfig> {
        self.current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}
