//! Application settings
//!
//! Settings are read once at startup from the process environment, optionally
//! seeded from a `.env` file, and stay immutable afterwards.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use integration_perplexity::{PerplexityConfig, PerplexityError, SearchModel, secret::sanitize};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Required prefix of a Perplexity API key
pub const API_KEY_PREFIX: &str = "pplx-";

/// Shortest accepted API key, in characters
pub const MIN_API_KEY_LENGTH: usize = 20;

/// Environment variables settings are read from; no other variable is touched
pub const ENV_KEYS: [&str; 6] = [
    "PERPLEXITY_API_KEY",
    "DEFAULT_MODEL",
    "CACHE_ENABLED",
    "LOG_LEVEL",
    "PERPLEXITY_BASE_URL",
    "PERPLEXITY_TIMEOUT_SECS",
];

/// Errors raised while loading settings
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The API key variable is absent or empty
    #[error("PERPLEXITY_API_KEY is not set")]
    MissingApiKey,

    /// The API key does not look like a Perplexity key
    #[error("Invalid PERPLEXITY_API_KEY ({masked}): {reason}")]
    InvalidApiKey {
        /// Sanitized form of the rejected key
        masked: String,
        /// What rule the key broke
        reason: &'static str,
    },

    /// A variable holds a value outside its allowed set
    #[error("Invalid {key}: {message}")]
    InvalidValue {
        /// Environment variable name
        key: &'static str,
        /// Description of the problem
        message: String,
    },

    /// The configuration source could not be read
    #[error("Failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),
}

impl From<ConfigError> for PerplexityError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_filter())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" | "critical" => Ok(Self::Error),
            _ => Err(format!(
                "'{s}' is not allowed, must be one of: trace, debug, info, warning, error, critical"
            )),
        }
    }
}

/// Environment variables as read by the `config` crate (keys lowercased)
#[derive(Debug, Deserialize)]
struct RawSettings {
    #[serde(default)]
    perplexity_api_key: Option<String>,
    default_model: String,
    cache_enabled: String,
    log_level: String,
    perplexity_base_url: String,
    perplexity_timeout_secs: String,
}

/// Process-wide settings
#[derive(Clone)]
pub struct Settings {
    /// Perplexity API key
    pub api_key: SecretString,

    /// Model used when a request does not name one
    pub default_model: SearchModel,

    /// Reserved; no cache exists yet
    pub cache_enabled: bool,

    /// Log verbosity, overridden by `RUST_LOG`
    pub log_level: LogLevel,

    /// Client tuning derived from the environment
    pub perplexity: PerplexityConfig,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &sanitize(self.api_key.expose_secret()))
            .field("default_model", &self.default_model)
            .field("cache_enabled", &self.cache_enabled)
            .field("log_level", &self.log_level)
            .field("perplexity", &self.perplexity)
            .finish()
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "api_key:       {}", sanitize(self.api_key.expose_secret()))?;
        writeln!(f, "default_model: {}", self.default_model)?;
        writeln!(f, "cache_enabled: {}", self.cache_enabled)?;
        writeln!(f, "log_level:     {}", self.log_level)?;
        writeln!(f, "base_url:      {}", self.perplexity.base_url)?;
        write!(f, "timeout_secs:  {}", self.perplexity.timeout_secs)
    }
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(collect_vars(|key| std::env::var_os(key))?)
    }

    /// Load settings from an explicit variable map instead of the process environment
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: config::Map<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::load(map)
    }

    fn load(vars: config::Map<String, String>) -> Result<Self, ConfigError> {
        let defaults = PerplexityConfig::default();

        let raw: RawSettings = config::Config::builder()
            .set_default("default_model", SearchModel::default().as_str())?
            .set_default("cache_enabled", "false")?
            .set_default("log_level", "INFO")?
            .set_default("perplexity_base_url", defaults.base_url.clone())?
            .set_default("perplexity_timeout_secs", defaults.timeout_secs.to_string())?
            .add_source(config::Environment::default().source(Some(vars)))
            .build()?
            .try_deserialize()?;

        let api_key = validate_api_key(raw.perplexity_api_key.as_deref().unwrap_or_default())?;

        let default_model = raw
            .default_model
            .trim()
            .parse::<SearchModel>()
            .map_err(|message| ConfigError::InvalidValue {
                key: "DEFAULT_MODEL",
                message,
            })?;

        let log_level = raw
            .log_level
            .parse::<LogLevel>()
            .map_err(|message| ConfigError::InvalidValue {
                key: "LOG_LEVEL",
                message,
            })?;

        let timeout_secs = raw
            .perplexity_timeout_secs
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "PERPLEXITY_TIMEOUT_SECS",
                message: format!(
                    "'{}' is not a positive number of seconds",
                    raw.perplexity_timeout_secs
                ),
            })?;

        let perplexity = PerplexityConfig {
            base_url: raw.perplexity_base_url.trim().to_string(),
            default_model,
            timeout_secs,
            ..defaults
        };
        perplexity
            .validate()
            .map_err(|message| ConfigError::InvalidValue {
                key: "PERPLEXITY_BASE_URL",
                message,
            })?;

        Ok(Self {
            api_key,
            default_model,
            cache_enabled: raw.cache_enabled.trim().eq_ignore_ascii_case("true"),
            log_level,
            perplexity,
        })
    }
}

/// Look up each of [`ENV_KEYS`], skipping unset ones
///
/// A value that is not valid Unicode is rejected without echoing it.
fn collect_vars<F>(lookup: F) -> Result<Vec<(String, String)>, ConfigError>
where
    F: Fn(&str) -> Option<OsString>,
{
    ENV_KEYS
        .into_iter()
        .filter_map(|key| lookup(key).map(|value| (key, value)))
        .map(|(key, value)| {
            value
                .into_string()
                .map(|value| (key.to_string(), value))
                .map_err(|_| ConfigError::InvalidValue {
                    key,
                    message: "value is not valid Unicode".to_string(),
                })
        })
        .collect()
}

/// Check the shape of a Perplexity API key
///
/// Error messages carry only the sanitized key.
pub fn validate_api_key(raw: &str) -> Result<SecretString, ConfigError> {
    let key = raw.trim();
    if key.is_empty() {
        return Err(ConfigError::MissingApiKey);
    }

    if !key.starts_with(API_KEY_PREFIX) {
        return Err(ConfigError::InvalidApiKey {
            masked: sanitize(key),
            reason: "must start with 'pplx-'",
        });
    }

    if key.chars().count() < MIN_API_KEY_LENGTH {
        return Err(ConfigError::InvalidApiKey {
            masked: sanitize(key),
            reason: "must be at least 20 characters",
        });
    }

    Ok(SecretString::from(key.to_string()))
}

/// Seed the process environment from a `.env` file in the working directory
///
/// Variables already set are left alone. Returns the file that was loaded.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}
