//! MCP presentation layer
//!
//! Exposes Perplexity search to MCP hosts as the `perplexity_search` tool,
//! speaking newline-delimited JSON-RPC 2.0 over stdio.

pub mod protocol;
pub mod server;
pub mod tools;

pub use server::{McpServer, SERVER_NAME};
pub use tools::{PerplexitySearchTool, SEARCH_TOOL_NAME, ToolError, ToolHandler, ToolRegistry};
