//! Perplexity client configuration

use serde::{Deserialize, Serialize};

use crate::models::SearchModel;
use crate::retry::RetryPolicy;

/// Longest query accepted, in characters
pub const MAX_QUERY_LENGTH: usize = 10_000;

/// Configuration for the Perplexity client
///
/// Does not hold the API key; that is passed separately as a secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerplexityConfig {
    /// Perplexity API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used when a request does not name one
    #[serde(default)]
    pub default_model: SearchModel,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum query length in characters
    #[serde(default = "default_max_query_length")]
    pub max_query_length: usize,

    /// Token budget for the synthesized answer
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Rewrite `[n]` markers in the answer into inline markdown links
    #[serde(default = "default_inline_citations")]
    pub inline_citations: bool,

    /// Retry and backoff behavior
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_base_url() -> String {
    "https://api.perplexity.ai".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_query_length() -> usize {
    MAX_QUERY_LENGTH
}

const fn default_max_tokens() -> u32 {
    4096
}

const fn default_inline_citations() -> bool {
    true
}

impl Default for PerplexityConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_model: SearchModel::default(),
            timeout_secs: default_timeout_secs(),
            max_query_length: default_max_query_length(),
            max_tokens: default_max_tokens(),
            inline_citations: default_inline_citations(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PerplexityConfig {
    /// Create a configuration for testing (short timeout, fast retries)
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            timeout_secs: 5,
            retry: RetryPolicy::fast(),
            ..Default::default()
        }
    }

    /// Point the client at a different base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Endpoint for chat completions
    #[must_use]
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than 0".to_string());
        }

        if self.max_query_length == 0 {
            return Err("max_query_length must be greater than 0".to_string());
        }

        if self.max_tokens == 0 {
            return Err("max_tokens must be greater than 0".to_string());
        }

        match url::Url::parse(&self.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {},
            _ => return Err(format!("base_url is not an http(s) URL: {}", self.base_url)),
        }

        self.retry.validate()
    }
}
