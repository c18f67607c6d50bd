//! Perplexity chat-completions client
//!
//! Client for the Perplexity API (<https://docs.perplexity.ai/>). One logical
//! search is validated, sent with bounded retries, and normalized.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::{
    PerplexityConfig, SearchModel, SearchRequest, SearchResult,
    error::PerplexityError,
    normalizer::{NormalizeContext, normalize},
    provider::SearchProvider,
    retry::{Retryable, Sleeper, TokioSleeper, with_retry},
    secret::{sanitize, scrub},
    validation::validate_query,
};

const PROVIDER_MESSAGE_LIMIT: usize = 200;

/// Failure of a single HTTP attempt
#[derive(Debug)]
enum AttemptError {
    Timeout { timeout_secs: u64 },
    Connection(String),
    RateLimited { retry_after_secs: Option<u64> },
    Server { status: u16 },
    Auth { status: u16 },
    Rejected { status: u16, message: String },
    Malformed { reason: String, payload_bytes: usize },
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { timeout_secs } => {
                write!(f, "request timed out after {timeout_secs} seconds")
            },
            Self::Connection(reason) => write!(f, "connection failed: {reason}"),
            Self::RateLimited { retry_after_secs } => match retry_after_secs {
                Some(secs) => write!(f, "rate limited (HTTP 429), retry after {secs} seconds"),
                None => write!(f, "rate limited (HTTP 429)"),
            },
            Self::Server { status } => write!(f, "server error (HTTP {status})"),
            Self::Auth { status } => write!(f, "authentication failed (HTTP {status})"),
            Self::Rejected { status, message } => write!(f, "rejected (HTTP {status}): {message}"),
            Self::Malformed { reason, .. } => write!(f, "malformed response: {reason}"),
        }
    }
}

impl Retryable for AttemptError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Connection(_)
                | Self::RateLimited { .. }
                | Self::Server { .. }
        )
    }
}

/// Raw provider payload with its size
struct RawPayload {
    body: Value,
    bytes: usize,
}

/// Perplexity API client with validation, retries and normalization
pub struct PerplexityClient {
    client: Client,
    api_key: SecretString,
    config: PerplexityConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for PerplexityClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerplexityClient")
            .field("api_key", &sanitize(self.api_key.expose_secret()))
            .field("config", &self.config)
            .field("sleeper", &self.sleeper)
            .finish_non_exhaustive()
    }
}

impl PerplexityClient {
    /// Create a new Perplexity client
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the config is invalid or the HTTP
    /// client cannot be created.
    pub fn new(config: PerplexityConfig, api_key: SecretString) -> Result<Self, PerplexityError> {
        config.validate().map_err(PerplexityError::Configuration)?;

        if api_key.expose_secret().trim().is_empty() {
            return Err(PerplexityError::Configuration(
                "Perplexity API key is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                PerplexityError::Configuration(scrub(&e.to_string(), api_key.expose_secret()))
            })?;

        info!(
            model = %config.default_model,
            api_key = %sanitize(api_key.expose_secret()),
            "Perplexity client initialized"
        );

        Ok(Self {
            client,
            api_key,
            config,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the sleeper used between retry attempts
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Client configuration
    #[must_use]
    pub const fn config(&self) -> &PerplexityConfig {
        &self.config
    }

    /// Build the chat-completions request body
    fn build_payload(&self, request: &SearchRequest, model: SearchModel) -> Value {
        let mut payload = json!({
            "model": model.as_str(),
            "messages": [
                { "role": "user", "content": request.query }
            ],
            "max_tokens": self.config.max_tokens,
        });

        if let Some(focus) = request.search_focus {
            payload["search_mode"] = json!(focus.as_str());
        }

        if let Some(recency) = request.recency {
            payload["web_search_options"] = json!({ "search_recency_filter": recency.as_str() });
        }

        payload
    }

    fn scrub(&self, text: &str) -> String {
        scrub(text, self.api_key.expose_secret())
    }

    /// Perform a single HTTP exchange and classify the outcome
    async fn attempt(&self, payload: &Value, attempt: u32) -> Result<RawPayload, AttemptError> {
        debug!(
            attempt = attempt,
            max_attempts = self.config.retry.max_attempts,
            "Sending Perplexity request"
        );

        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(self.api_key.expose_secret())
            .header("Accept", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AttemptError::Timeout {
                        timeout_secs: self.config.timeout_secs,
                    }
                } else {
                    AttemptError::Connection(self.scrub(&e.to_string()))
                }
            })?;

        let status = response.status();
        debug!(status = %status, "Received Perplexity response");

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.trim().parse().ok());
            warn!(retry_after_secs = ?retry_after_secs, "Rate limited by Perplexity");
            return Err(AttemptError::RateLimited { retry_after_secs });
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AttemptError::Auth {
                status: status.as_u16(),
            });
        }

        if status.is_server_error() {
            return Err(AttemptError::Server {
                status: status.as_u16(),
            });
        }

        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                AttemptError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                }
            } else {
                AttemptError::Connection(self.scrub(&e.to_string()))
            }
        })?;

        if !status.is_success() {
            return Err(AttemptError::Rejected {
                status: status.as_u16(),
                message: self.scrub(&provider_error_message(&text, status)),
            });
        }

        let body = serde_json::from_str::<Value>(&text).map_err(|_| AttemptError::Malformed {
            reason: "response body is not valid JSON".to_string(),
            payload_bytes: text.len(),
        })?;

        Ok(RawPayload {
            body,
            bytes: text.len(),
        })
    }

    /// Convert the last attempt failure into the public error taxonomy
    fn classify(&self, error: AttemptError, attempts: u32) -> PerplexityError {
        if error.is_retryable() {
            return PerplexityError::TransientFailure {
                attempts,
                reason: self.scrub(&error.to_string()),
            };
        }

        match error {
            AttemptError::Auth { status } => PerplexityError::AuthenticationFailed { status },
            AttemptError::Rejected { status, message } => {
                PerplexityError::RequestRejected { status, message }
            },
            AttemptError::Malformed {
                reason,
                payload_bytes,
            } => PerplexityError::MalformedResponse {
                reason,
                payload_bytes,
            },
            other => PerplexityError::TransientFailure {
                attempts,
                reason: self.scrub(&other.to_string()),
            },
        }
    }
}

/// Pull `error.message` out of a provider error body, else fall back to the status
fn provider_error_message(body: &str, status: StatusCode) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    message.chars().take(PROVIDER_MESSAGE_LIMIT).collect()
}

#[async_trait]
impl SearchProvider for PerplexityClient {
    #[instrument(
        skip(self, request),
        fields(provider = "perplexity", query_chars = request.query.chars().count())
    )]
    async fn search(&self, request: &SearchRequest) -> Result<SearchResult, PerplexityError> {
        validate_query(&request.query, self.config.max_query_length)?;

        let model = request.model.unwrap_or(self.config.default_model);
        let payload = self.build_payload(request, model);
        let start = Instant::now();

        info!(
            model = %model,
            search_focus = ?request.search_focus,
            recency = ?request.recency,
            "Executing Perplexity search"
        );

        let outcome = with_retry(&self.config.retry, self.sleeper.as_ref(), |attempt| {
            self.attempt(&payload, attempt)
        })
        .await;

        let attempts = outcome.attempts;
        let retry_ms = u64::try_from(outcome.total_duration.as_millis()).unwrap_or(u64::MAX);
        let raw = outcome.result.map_err(|e| {
            let error = self.classify(e, attempts);
            warn!(
                kind = error.kind(),
                attempts = attempts,
                retry_ms = retry_ms,
                error = %error,
                "Perplexity search failed"
            );
            error
        })?;

        let context = NormalizeContext::new(model, request.search_focus)
            .with_elapsed(start.elapsed())
            .with_payload_bytes(raw.bytes)
            .with_inline_citations(self.config.inline_citations);

        let result = normalize(&raw.body, &context).inspect_err(|e| {
            warn!(kind = e.kind(), payload_bytes = raw.bytes, "Unusable Perplexity response");
        })?;

        info!(
            attempts = attempts,
            retry_ms = retry_ms,
            citations = result.citations.len(),
            query_time_ms = result.metadata.query_time_ms,
            "Perplexity search completed"
        );

        Ok(result)
    }

    fn default_model(&self) -> SearchModel {
        self.config.default_model
    }

    fn max_query_length(&self) -> usize {
        self.config.max_query_length
    }

    fn provider_name(&self) -> &'static str {
        "perplexity"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Recency, SearchFocus};

    const TEST_KEY: &str = "pplx-0123456789abcdefghij";

    fn client() -> PerplexityClient {
        PerplexityClient::new(
            PerplexityConfig::for_testing(),
            SecretString::from(TEST_KEY.to_string()),
        )
        .unwrap()
    }

    #[test]
    fn test_client_requires_api_key() {
        let result = PerplexityClient::new(
            PerplexityConfig::default(),
            SecretString::from(String::new()),
        );
        assert!(matches!(result, Err(PerplexityError::Configuration(_))));
    }

    #[test]
    fn test_client_rejects_invalid_config() {
        let config = PerplexityConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        let result = PerplexityClient::new(config, SecretString::from(TEST_KEY.to_string()));
        assert!(matches!(result, Err(PerplexityError::Configuration(_))));
    }

    #[test]
    fn test_debug_masks_api_key() {
        let debug = format!("{:?}", client());
        assert!(debug.contains("PerplexityClient"));
        assert!(debug.contains("pplx****ghij"));
        assert!(!debug.contains(TEST_KEY));
    }

    #[test]
    fn test_build_minimal_payload() {
        let client = client();
        let payload = client.build_payload(&SearchRequest::new("rust"), SearchModel::SonarPro);

        assert_eq!(payload["model"], "sonar-pro");
        assert_eq!(payload["messages"][0]["role"], "user");
        assert_eq!(payload["messages"][0]["content"], "rust");
        assert_eq!(payload["max_tokens"], 4096);
        assert!(payload.get("search_mode").is_none());
        assert!(payload.get("web_search_options").is_none());
    }

    #[test]
    fn test_build_payload_with_filters() {
        let client = client();
        let request = SearchRequest::new("rust")
            .with_focus(SearchFocus::Academic)
            .with_recency(Recency::Day);
        let payload = client.build_payload(&request, SearchModel::Sonar);

        assert_eq!(payload["model"], "sonar");
        assert_eq!(payload["search_mode"], "academic");
        assert_eq!(payload["web_search_options"]["search_recency_filter"], "day");
    }

    #[test]
    fn test_attempt_error_retryability() {
        assert!(AttemptError::Timeout { timeout_secs: 5 }.is_retryable());
        assert!(AttemptError::Connection("refused".to_string()).is_retryable());
        assert!(
            AttemptError::RateLimited {
                retry_after_secs: None
            }
            .is_retryable()
        );
        assert!(AttemptError::Server { status: 502 }.is_retryable());
        assert!(!AttemptError::Auth { status: 401 }.is_retryable());
        assert!(
            !AttemptError::Rejected {
                status: 400,
                message: "bad".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_classify_scrubs_credentials() {
        let client = client();
        let error = client.classify(
            AttemptError::Connection(format!("error sending Bearer {TEST_KEY}")),
            3,
        );

        match error {
            PerplexityError::TransientFailure { attempts, reason } => {
                assert_eq!(attempts, 3);
                assert!(!reason.contains(TEST_KEY));
                assert!(reason.contains("pplx****ghij"));
            },
            other => unreachable!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_classify_permanent_errors() {
        let client = client();
        assert!(matches!(
            client.classify(AttemptError::Auth { status: 403 }, 1),
            PerplexityError::AuthenticationFailed { status: 403 }
        ));
        assert!(matches!(
            client.classify(
                AttemptError::Malformed {
                    reason: "x".to_string(),
                    payload_bytes: 9
                },
                1
            ),
            PerplexityError::MalformedResponse {
                payload_bytes: 9,
                ..
            }
        ));
    }

    #[test]
    fn test_provider_error_message() {
        let body = r#"{"error":{"message":"Invalid model 'x'","type":"invalid_request"}}"#;
        assert_eq!(
            provider_error_message(body, StatusCode::BAD_REQUEST),
            "Invalid model 'x'"
        );
        assert_eq!(
            provider_error_message("<html>oops</html>", StatusCode::NOT_FOUND),
            "HTTP 404"
        );

        let long = format!(r#"{{"error":{{"message":"{}"}}}}"#, "x".repeat(500));
        assert_eq!(
            provider_error_message(&long, StatusCode::BAD_REQUEST).len(),
            PROVIDER_MESSAGE_LIMIT
        );
    }

    #[tokio::test]
    async fn test_invalid_query_fails_before_io() {
        let config = PerplexityConfig::for_testing().with_base_url("http://127.0.0.1:9");
        let client =
            PerplexityClient::new(config, SecretString::from(TEST_KEY.to_string())).unwrap();

        let result = client.search(&SearchRequest::new("   ")).await;
        assert!(matches!(
            result,
            Err(PerplexityError::Validation { field: "query", .. })
        ));
    }
}
