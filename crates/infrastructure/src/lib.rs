//! Infrastructure layer - settings and logging
//!
//! Loads the immutable [`Settings`] from the environment and installs the
//! stderr tracing subscriber.

pub mod config;
pub mod telemetry;

pub use config::{ConfigError, LogLevel, Settings, load_dotenv, validate_api_key};
pub use telemetry::{TelemetryError, init_logging};
