//! Provider response normalization
//!
//! Converts the raw Perplexity chat-completions payload into a
//! [`SearchResult`]. Citation URLs are restricted to http and https.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::PerplexityError;
use crate::models::{Citation, SearchFocus, SearchMetadata, SearchModel, SearchResult};

/// Provider response structures
///
/// Every field is optional so that shape problems surface as a single
/// malformed-response error instead of a serde message echoing content.
/// Lists may be `null` or hold `null` entries; both count as empty.
mod api {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct ProviderResponse {
        pub model: Option<String>,
        #[serde(deserialize_with = "lenient_list")]
        pub choices: Vec<Choice>,
        pub answer: Option<String>,
        #[serde(deserialize_with = "lenient_list")]
        pub search_results: Vec<Source>,
        #[serde(deserialize_with = "lenient_list")]
        pub sources: Vec<Source>,
        #[serde(deserialize_with = "lenient_list")]
        pub citations: Vec<Value>,
        pub search_mode: Option<String>,
    }

    /// A `null` list is empty and a `null` entry becomes a default entry,
    /// so later entries keep their position
    fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Default,
    {
        let entries = Option::<Vec<Option<T>>>::deserialize(deserializer)?;
        Ok(entries
            .unwrap_or_default()
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect())
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct Choice {
        pub message: Option<Message>,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct Message {
        pub content: Option<String>,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct Source {
        pub url: Option<String>,
        pub title: Option<String>,
        pub snippet: Option<String>,
    }
}

/// Request-side facts the normalizer needs alongside the payload
#[derive(Debug, Clone)]
pub struct NormalizeContext {
    /// Model the request asked for
    pub requested_model: SearchModel,
    /// Focus the request asked for
    pub requested_focus: Option<SearchFocus>,
    /// Wall-clock time of the exchange
    pub elapsed: Duration,
    /// Size of the raw payload in bytes, reported on failure
    pub payload_bytes: usize,
    /// Rewrite `[n]` markers into inline markdown links
    pub inline_citations: bool,
}

impl NormalizeContext {
    /// Context for a request with the given model and focus
    #[must_use]
    pub const fn new(requested_model: SearchModel, requested_focus: Option<SearchFocus>) -> Self {
        Self {
            requested_model,
            requested_focus,
            elapsed: Duration::ZERO,
            payload_bytes: 0,
            inline_citations: true,
        }
    }

    /// Set the elapsed time
    #[must_use]
    pub const fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// Set the raw payload size
    #[must_use]
    pub const fn with_payload_bytes(mut self, payload_bytes: usize) -> Self {
        self.payload_bytes = payload_bytes;
        self
    }

    /// Enable or disable inline citation links
    #[must_use]
    pub const fn with_inline_citations(mut self, enabled: bool) -> Self {
        self.inline_citations = enabled;
        self
    }
}

/// Check that a URL parses and uses the http or https scheme
#[must_use]
pub fn is_safe_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Build a [`SearchResult`] from a raw provider payload
///
/// # Errors
///
/// Returns [`PerplexityError::MalformedResponse`] if the payload has no
/// answer text or its fields have the wrong shape.
pub fn normalize(raw: &Value, context: &NormalizeContext) -> Result<SearchResult, PerplexityError> {
    let malformed = |reason: &str| PerplexityError::MalformedResponse {
        reason: reason.to_string(),
        payload_bytes: context.payload_bytes,
    };

    if !raw.is_object() {
        return Err(malformed("payload is not a JSON object"));
    }

    let response = api::ProviderResponse::deserialize(raw)
        .map_err(|_| malformed("payload fields have unexpected types"))?;

    let answer = extract_answer(&response).ok_or_else(|| malformed("no answer text in response"))?;

    let citations = extract_citations(&response);
    let answer = if context.inline_citations {
        link_citations(&answer, &citations)
    } else {
        answer
    };

    let model_used = response
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| context.requested_model.to_string());

    let search_focus = response
        .search_mode
        .as_deref()
        .and_then(|mode| mode.parse::<SearchFocus>().ok())
        .or(context.requested_focus);

    debug!(
        citations = citations.len(),
        answer_chars = answer.chars().count(),
        model = %model_used,
        "Normalized provider response"
    );

    Ok(SearchResult {
        answer,
        citations,
        metadata: SearchMetadata {
            model_used,
            search_focus,
            query_time_ms: u64::try_from(context.elapsed.as_millis()).unwrap_or(u64::MAX),
        },
    })
}

fn extract_answer(response: &api::ProviderResponse) -> Option<String> {
    let from_choices = response
        .choices
        .first()
        .and_then(|c| c.message.as_ref())
        .and_then(|m| m.content.clone());

    from_choices
        .into_iter()
        .chain(response.answer.clone())
        .find(|text| !text.trim().is_empty())
}

/// Index the provider's sources 1..N and drop entries with unsafe URLs
///
/// Surviving citations keep their provider index so `[n]` markers in the
/// answer still point at the right source.
fn extract_citations(response: &api::ProviderResponse) -> Vec<Citation> {
    let structured = if response.search_results.is_empty() {
        &response.sources
    } else {
        &response.search_results
    };

    let candidates: Vec<(String, String, String)> = if structured.is_empty() {
        response
            .citations
            .iter()
            .map(|c| (c.as_str().unwrap_or_default().to_string(), String::new(), String::new()))
            .collect()
    } else {
        structured
            .iter()
            .map(|s| {
                (
                    s.url.clone().unwrap_or_default(),
                    s.title.clone().unwrap_or_default(),
                    s.snippet.clone().unwrap_or_default(),
                )
            })
            .collect()
    };

    candidates
        .into_iter()
        .zip(1u32..)
        .filter_map(|((url, title, snippet), index)| {
            if is_safe_url(&url) {
                Some(Citation {
                    index,
                    url,
                    title,
                    snippet,
                })
            } else {
                warn!(
                    index = index,
                    scheme = %url_scheme(&url),
                    "Dropped citation with unsupported URL"
                );
                None
            }
        })
        .collect()
}

fn url_scheme(raw: &str) -> String {
    url::Url::parse(raw)
        .map(|u| u.scheme().to_string())
        .unwrap_or_else(|_| "invalid".to_string())
}

/// Replace `[n]` markers with `([title](url))` for every known citation
fn link_citations(answer: &str, citations: &[Citation]) -> String {
    citations.iter().fold(answer.to_string(), |text, citation| {
        let marker = format!("[{}]", citation.index);
        if !text.contains(&marker) {
            return text;
        }
        let link = format!("([{}]({}))", link_text(citation), citation.url);
        text.replace(&marker, &link)
    })
}

fn link_text(citation: &Citation) -> String {
    let title = citation.title.trim();
    let text = if title.is_empty() {
        url::Url::parse(&citation.url)
            .ok()
            .and_then(|u| u.host_str().map(ToString::to_string))
            .unwrap_or_else(|| citation.url.clone())
    } else {
        title.to_string()
    };
    text.replace(['[', ']'], "")
}
