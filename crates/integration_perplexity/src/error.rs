//! Perplexity client error types

use thiserror::Error;

/// Errors surfaced by the Perplexity search integration
///
/// Only transient failures are retried internally; every other kind reaches
/// the caller on first occurrence.
#[derive(Debug, Error)]
pub enum PerplexityError {
    /// Settings are missing or malformed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A request field failed validation; no network call was made
    #[error("Invalid {field}: {message}")]
    Validation {
        /// Name of the offending field
        field: &'static str,
        /// Description including the allowed values where applicable
        message: String,
    },

    /// The provider rejected the credentials (401/403)
    #[error("Authentication failed (HTTP {status})")]
    AuthenticationFailed {
        /// HTTP status returned by the provider
        status: u16,
    },

    /// The provider refused the request as malformed (400 and other 4xx)
    #[error("Request rejected (HTTP {status}): {message}")]
    RequestRejected {
        /// HTTP status returned by the provider
        status: u16,
        /// Provider error message, scrubbed of credentials
        message: String,
    },

    /// Timeout, connection failure, 429 or 5xx after all attempts were used
    #[error("Transient failure after {attempts} attempts: {reason}")]
    TransientFailure {
        /// Number of attempts made
        attempts: u32,
        /// Last observed status or reason, scrubbed of credentials
        reason: String,
    },

    /// The provider response lacked required fields
    #[error("Malformed response ({payload_bytes} bytes): {reason}")]
    MalformedResponse {
        /// What was missing or unparsable
        reason: String,
        /// Size of the raw payload; the content itself is never kept
        payload_bytes: usize,
    },
}

impl PerplexityError {
    /// Create a validation error for the given field
    #[must_use]
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Returns true if this error is retryable
    ///
    /// Retries happen inside the client, so by the time a caller sees a
    /// `TransientFailure` the attempt budget is already spent. It is still
    /// reported as retryable because a later call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientFailure { .. })
    }

    /// Short machine-readable kind name, used in logs and tool error payloads
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::Validation { .. } => "validation_error",
            Self::AuthenticationFailed { .. } => "authentication_failure",
            Self::RequestRejected { .. } => "request_rejected",
            Self::TransientFailure { .. } => "transient_failure",
            Self::MalformedResponse { .. } => "malformed_response",
        }
    }

    /// Message that is safe to hand back to the calling client
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration(msg) => format!("Server configuration error: {msg}"),
            Self::Validation { .. } => self.to_string(),
            Self::AuthenticationFailed { .. } => {
                "API authentication failed. Check your PERPLEXITY_API_KEY credentials.".to_string()
            },
            Self::RequestRejected { message, .. } => {
                format!("The search provider rejected the request: {message}")
            },
            Self::TransientFailure { .. } => {
                "The search provider is temporarily unavailable. Please try again later."
                    .to_string()
            },
            Self::MalformedResponse { .. } => {
                "The search provider returned an unexpected response. Please try again."
                    .to_string()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(
            PerplexityError::TransientFailure {
                attempts: 3,
                reason: "HTTP 503".to_string()
            }
            .is_retryable()
        );

        assert!(!PerplexityError::validation("query", "empty").is_retryable());
        assert!(!PerplexityError::AuthenticationFailed { status: 401 }.is_retryable());
        assert!(
            !PerplexityError::MalformedResponse {
                reason: "no choices".to_string(),
                payload_bytes: 2
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_validation_display_names_field() {
        let err = PerplexityError::validation("recency", "must be one of: hour, day");
        assert_eq!(err.to_string(), "Invalid recency: must be one of: hour, day");
        assert_eq!(err.user_message(), err.to_string());
    }

    #[test]
    fn test_user_messages_are_generic() {
        let auth = PerplexityError::AuthenticationFailed { status: 403 };
        assert!(auth.user_message().contains("credentials"));

        let transient = PerplexityError::TransientFailure {
            attempts: 3,
            reason: "connection refused".to_string(),
        };
        assert!(transient.user_message().contains("try again later"));
        assert!(!transient.user_message().contains("connection refused"));

        let malformed = PerplexityError::MalformedResponse {
            reason: "missing answer".to_string(),
            payload_bytes: 10,
        };
        assert!(!malformed.user_message().contains("missing answer"));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(
            PerplexityError::Configuration("x".to_string()).kind(),
            "configuration_error"
        );
        assert_eq!(
            PerplexityError::AuthenticationFailed { status: 401 }.kind(),
            "authentication_failure"
        );
    }
}
