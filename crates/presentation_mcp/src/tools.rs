//! Tool registry and the Perplexity search tool

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use integration_perplexity::{
    Recency, SearchFocus, SearchModel, SearchParams, SearchProvider, validate,
};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::protocol::{CallToolResult, JsonRpcError, McpTool};

/// Name under which the search tool is registered
pub const SEARCH_TOOL_NAME: &str = "perplexity_search";

/// Errors that abort a tool call at the protocol level
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

impl From<ToolError> for JsonRpcError {
    fn from(err: ToolError) -> Self {
        Self::invalid_params(err)
    }
}

/// A callable tool
///
/// Search failures are reported inside the returned [`CallToolResult`];
/// `Err` is reserved for calls the host shaped wrongly.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Definition announced in `tools/list`
    fn definition(&self) -> McpTool;

    /// Execute the tool
    async fn call(&self, arguments: Value) -> Result<CallToolResult, ToolError>;
}

/// Name-to-handler dispatch table
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its definition's name, replacing any previous one
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.definition().name;
        self.tools.insert(name, handler);
    }

    /// Tool definitions sorted by name
    pub fn list(&self) -> Vec<McpTool> {
        let mut tools: Vec<McpTool> = self.tools.values().map(|t| t.definition()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Dispatch a call by tool name
    pub async fn call(&self, name: &str, arguments: Value) -> Result<CallToolResult, ToolError> {
        let handler = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        handler.call(arguments).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// `perplexity_search`: answer a question with web citations
pub struct PerplexitySearchTool {
    provider: Arc<dyn SearchProvider>,
}

impl std::fmt::Debug for PerplexitySearchTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerplexitySearchTool")
            .field("provider", &self.provider.provider_name())
            .finish()
    }
}

impl PerplexitySearchTool {
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self { provider }
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search question or query",
                    "minLength": 1,
                    "maxLength": self.provider.max_query_length()
                },
                "model": {
                    "type": "string",
                    "description": format!(
                        "Model to use (defaults to {})",
                        self.provider.default_model()
                    ),
                    "enum": SearchModel::allowed()
                },
                "search_focus": {
                    "type": "string",
                    "description": "Search focus mode",
                    "enum": SearchFocus::allowed()
                },
                "recency": {
                    "type": "string",
                    "description": "Only use sources published within this window",
                    "enum": Recency::allowed()
                }
            },
            "required": ["query"]
        })
    }
}

#[async_trait]
impl ToolHandler for PerplexitySearchTool {
    fn definition(&self) -> McpTool {
        McpTool {
            name: SEARCH_TOOL_NAME.to_string(),
            description: Some(
                "Search Perplexity AI for current information and receive a synthesized \
                 answer with citations."
                    .to_string(),
            ),
            input_schema: self.input_schema(),
        }
    }

    async fn call(&self, arguments: Value) -> Result<CallToolResult, ToolError> {
        let params: SearchParams = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        info!(
            tool = SEARCH_TOOL_NAME,
            query_chars = params.query.chars().count(),
            model = params.model.as_deref().unwrap_or("default"),
            search_focus = params.search_focus.as_deref().unwrap_or("none"),
            recency = params.recency.as_deref().unwrap_or("none"),
            "Tool invoked"
        );

        let outcome = match validate(&params, self.provider.max_query_length()) {
            Ok(request) => self.provider.search(&request).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(result) => match serde_json::to_value(&result) {
                Ok(value) => {
                    info!(
                        citations = result.citations.len(),
                        answer_chars = result.answer.chars().count(),
                        "Tool call completed"
                    );
                    Ok(CallToolResult::structured(value))
                },
                Err(e) => {
                    warn!(error = %e, "Failed to encode search result");
                    Ok(CallToolResult::error("An error occurred. Please try again."))
                },
            },
            Err(e) => {
                warn!(kind = e.kind(), "Tool call failed");
                Ok(CallToolResult::error(e.user_message()))
            },
        }
    }
}
