//! Search request and result models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Format the "must be one of" message shared by all enum parsers
fn unknown_value(value: &str, allowed: &[&str]) -> String {
    format!("'{value}' is not allowed, must be one of: {}", allowed.join(", "))
}

/// Perplexity model selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchModel {
    /// Lightweight search model
    Sonar,
    /// Advanced search model (default)
    #[default]
    SonarPro,
}

impl SearchModel {
    /// All supported models
    pub const ALL: [Self; 2] = [Self::Sonar, Self::SonarPro];

    /// Wire name of the model
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sonar => "sonar",
            Self::SonarPro => "sonar-pro",
        }
    }

    /// Wire names of all supported models
    #[must_use]
    pub fn allowed() -> Vec<&'static str> {
        Self::ALL.iter().map(Self::as_str).collect()
    }
}

impl fmt::Display for SearchModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| unknown_value(s, &Self::allowed()))
    }
}

/// Source corpus the provider should search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchFocus {
    /// General web search
    Web,
    /// Scholarly sources
    Academic,
    /// SEC filings
    Sec,
}

impl SearchFocus {
    /// All supported focus modes
    pub const ALL: [Self; 3] = [Self::Web, Self::Academic, Self::Sec];

    /// Wire name of the focus mode
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Academic => "academic",
            Self::Sec => "sec",
        }
    }

    /// Wire names of all focus modes
    #[must_use]
    pub fn allowed() -> Vec<&'static str> {
        Self::ALL.iter().map(Self::as_str).collect()
    }
}

impl fmt::Display for SearchFocus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchFocus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| unknown_value(s, &Self::allowed()))
    }
}

/// Recency filter applied to sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recency {
    /// Past hour
    Hour,
    /// Past day
    Day,
    /// Past week
    Week,
    /// Past month
    Month,
    /// Past year
    Year,
}

impl Recency {
    /// All supported recency filters
    pub const ALL: [Self; 5] = [Self::Hour, Self::Day, Self::Week, Self::Month, Self::Year];

    /// Wire name of the filter
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    /// Wire names of all filters
    #[must_use]
    pub fn allowed() -> Vec<&'static str> {
        Self::ALL.iter().map(Self::as_str).collect()
    }
}

impl fmt::Display for Recency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| unknown_value(s, &Self::allowed()))
    }
}

/// Untyped search parameters as received from a caller
///
/// Turned into a [`SearchRequest`] by [`crate::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    /// The search question
    pub query: String,

    /// Model override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Search focus mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_focus: Option<String>,

    /// Recency filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recency: Option<String>,
}

impl SearchParams {
    /// Create parameters with only a query
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

/// A validated search request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// The search question
    pub query: String,
    /// Model override; the client default applies when absent
    pub model: Option<SearchModel>,
    /// Search focus mode
    pub search_focus: Option<SearchFocus>,
    /// Recency filter
    pub recency: Option<Recency>,
}

impl SearchRequest {
    /// Create a request with only a query
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            model: None,
            search_focus: None,
            recency: None,
        }
    }

    /// Set the model override
    #[must_use]
    pub const fn with_model(mut self, model: SearchModel) -> Self {
        self.model = Some(model);
        self
    }

    /// Set the search focus
    #[must_use]
    pub const fn with_focus(mut self, focus: SearchFocus) -> Self {
        self.search_focus = Some(focus);
        self
    }

    /// Set the recency filter
    #[must_use]
    pub const fn with_recency(mut self, recency: Recency) -> Self {
        self.recency = Some(recency);
        self
    }
}

/// A source reference attached to an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Position in the provider's source list (1-indexed)
    pub index: u32,
    /// Source URL, always http or https
    pub url: String,
    /// Source title, may be empty
    pub title: String,
    /// Short excerpt, may be empty
    pub snippet: String,
}

/// Metadata about how an answer was produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMetadata {
    /// Model that actually served the request
    pub model_used: String,
    /// Focus mode in effect, if any
    #[serde(default)]
    pub search_focus: Option<SearchFocus>,
    /// Wall-clock time of the whole exchange including retries
    pub query_time_ms: u64,
}

/// Normalized search answer with citations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Synthesized answer text
    pub answer: String,
    /// Sources in provider relevance order
    pub citations: Vec<Citation>,
    /// Execution metadata
    pub metadata: SearchMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> SearchResult {
        SearchResult {
            answer: "Rust 1.0 shipped in 2015 [1].".to_string(),
            citations: vec![
                Citation {
                    index: 1,
                    url: "https://blog.rust-lang.org/2015/05/15/Rust-1.0.html".to_string(),
                    title: "Announcing Rust 1.0".to_string(),
                    snippet: "Today we are very proud to announce the 1.0 release".to_string(),
                },
                Citation {
                    index: 3,
                    url: "http://example.com/".to_string(),
                    title: String::new(),
                    snippet: String::new(),
                },
            ],
            metadata: SearchMetadata {
                model_used: "sonar-pro".to_string(),
                search_focus: Some(SearchFocus::Academic),
                query_time_ms: 1234,
            },
        }
    }

    #[test]
    fn test_model_wire_names() {
        assert_eq!(SearchModel::Sonar.to_string(), "sonar");
        assert_eq!(SearchModel::SonarPro.to_string(), "sonar-pro");
        assert_eq!(SearchModel::default(), SearchModel::SonarPro);
        assert_eq!(
            serde_json::to_string(&SearchModel::SonarPro).unwrap(),
            "\"sonar-pro\""
        );
    }

    #[test]
    fn test_parse_known_values() {
        assert_eq!("sonar".parse::<SearchModel>(), Ok(SearchModel::Sonar));
        assert_eq!("sec".parse::<SearchFocus>(), Ok(SearchFocus::Sec));
        assert_eq!("month".parse::<Recency>(), Ok(Recency::Month));
    }

    #[test]
    fn test_parse_unknown_value_lists_allowed() {
        let err = "decade".parse::<Recency>().unwrap_err();
        assert!(err.contains("'decade'"));
        assert!(err.contains("hour, day, week, month, year"));
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert!("Sonar".parse::<SearchModel>().is_err());
        assert!("WEB".parse::<SearchFocus>().is_err());
    }

    #[test]
    fn test_request_builder() {
        let request = SearchRequest::new("what is rust")
            .with_model(SearchModel::Sonar)
            .with_focus(SearchFocus::Web)
            .with_recency(Recency::Week);

        assert_eq!(request.query, "what is rust");
        assert_eq!(request.model, Some(SearchModel::Sonar));
        assert_eq!(request.search_focus, Some(SearchFocus::Web));
        assert_eq!(request.recency, Some(Recency::Week));
    }

    #[test]
    fn test_params_deserialize_with_missing_optionals() {
        let params: SearchParams = serde_json::from_str(r#"{"query":"hello"}"#).unwrap();
        assert_eq!(params, SearchParams::new("hello"));
    }

    #[test]
    fn test_result_json_round_trip() {
        let result = sample_result();
        let json = serde_json::to_string(&result).unwrap();
        let decoded: SearchResult = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, result);
    }

    #[test]
    fn test_result_json_shape() {
        let value = serde_json::to_value(sample_result()).unwrap();
        assert_eq!(value["metadata"]["model_used"], "sonar-pro");
        assert_eq!(value["metadata"]["search_focus"], "academic");
        assert_eq!(value["metadata"]["query_time_ms"], 1234);
        assert_eq!(value["citations"][0]["index"], 1);
        assert_eq!(value["citations"][1]["title"], "");
    }
}
