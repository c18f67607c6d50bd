//! Search provider trait

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::{PerplexityError, SearchModel, SearchRequest, SearchResult};

/// Trait for answer-with-citations search backends
///
/// Implemented by [`crate::PerplexityClient`]; adapters depend on this trait
/// so they can be exercised without network access.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one logical search
    ///
    /// # Errors
    ///
    /// Returns one of the [`PerplexityError`] kinds; only
    /// `TransientFailure` is produced after internal retries.
    async fn search(&self, request: &SearchRequest) -> Result<SearchResult, PerplexityError>;

    /// Model used when a request does not name one
    fn default_model(&self) -> SearchModel;

    /// Longest accepted query, in characters
    fn max_query_length(&self) -> usize;

    /// Get the provider name (e.g., "perplexity")
    fn provider_name(&self) -> &'static str;
}
