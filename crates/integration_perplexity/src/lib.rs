#![forbid(unsafe_code)]
//! Perplexity search integration
//!
//! Turns one search question into a synthesized answer with citations via the
//! Perplexity chat-completions API.
//!
//! # Architecture
//!
//! A call flows through four stages:
//!
//! 1. [`validate`] turns untyped [`SearchParams`] into a [`SearchRequest`]
//!    before any I/O.
//! 2. [`PerplexityClient`] sends the request with bounded retries
//!    ([`retry::RetryPolicy`]); only timeouts, connection failures, 429 and
//!    5xx are retried.
//! 3. [`normalize`] converts the raw payload into a [`SearchResult`],
//!    dropping citations whose URL is not http(s).
//! 4. Failures are reported through the [`PerplexityError`] taxonomy, with
//!    credentials masked by [`secret::sanitize`].
//!
//! # Example
//!
//! ```rust,ignore
//! use integration_perplexity::{PerplexityClient, PerplexityConfig, SearchProvider, SearchParams, validate};
//!
//! let client = PerplexityClient::new(PerplexityConfig::default(), api_key)?;
//! let request = validate(&SearchParams::new("Who maintains Rust?"), client.max_query_length())?;
//!
//! let result = client.search(&request).await?;
//! println!("{}", result.answer);
//! for citation in result.citations {
//!     println!("[{}] {}", citation.index, citation.url);
//! }
//! ```

mod client;
mod config;
mod error;
mod models;
mod normalizer;
mod provider;
pub mod retry;
pub mod secret;
mod validation;

pub use client::PerplexityClient;
pub use config::{MAX_QUERY_LENGTH, PerplexityConfig};
pub use error::PerplexityError;
pub use models::{
    Citation, Recency, SearchFocus, SearchMetadata, SearchModel, SearchParams, SearchRequest,
    SearchResult,
};
pub use normalizer::{NormalizeContext, is_safe_url, normalize};
pub use provider::SearchProvider;
pub use validation::{validate, validate_query};
