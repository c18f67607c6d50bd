//! Stdio JSON-RPC server loop
//!
//! Reads newline-delimited requests and answers them one at a time.

use serde::Serialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::protocol::{
    CallToolParams, InitializeResult, JSONRPC_VERSION, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION, ServerCapabilities, ServerInfo,
};
use crate::tools::ToolRegistry;

/// Name announced in `initialize`
pub const SERVER_NAME: &str = "perplexity-search";

/// Longest accepted message line, newline excluded
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// One newline-delimited frame read from the input
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Line(Vec<u8>),
    Oversized,
    Eof,
}

/// Read the next line, never buffering more than `limit + 1` bytes
///
/// The remainder of an oversized line is consumed and discarded.
async fn read_frame<R>(reader: &mut R, limit: usize) -> std::io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    let chunk = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut buf = Vec::new();

    let read = (&mut *reader).take(chunk).read_until(b'\n', &mut buf).await?;
    if read == 0 {
        return Ok(Frame::Eof);
    }

    if buf.len() > limit && buf.last() != Some(&b'\n') {
        loop {
            buf.clear();
            let read = (&mut *reader).take(chunk).read_until(b'\n', &mut buf).await?;
            if read == 0 || buf.last() == Some(&b'\n') {
                break;
            }
        }
        return Ok(Frame::Oversized);
    }

    Ok(Frame::Line(buf))
}

/// MCP server over a line-oriented byte stream
#[derive(Debug)]
pub struct McpServer {
    registry: ToolRegistry,
    server_info: ServerInfo,
    max_line_bytes: usize,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    /// Override the per-line size limit
    #[must_use]
    pub const fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Serve until the reader reaches end of input
    ///
    /// Lines that are not UTF-8 or exceed the size limit are answered with
    /// an error and the session continues.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(tools = self.registry.len(), "MCP server ready on stdio");

        loop {
            let response = match read_frame(&mut reader, self.max_line_bytes).await? {
                Frame::Eof => break,
                Frame::Oversized => {
                    warn!(limit = self.max_line_bytes, "Oversized JSON-RPC message dropped");
                    Some(JsonRpcResponse::failure(
                        Value::Null,
                        JsonRpcError::invalid_request(format!(
                            "message exceeds {} bytes",
                            self.max_line_bytes
                        )),
                    ))
                },
                Frame::Line(bytes) => match String::from_utf8(bytes) {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => self.handle_line(&line).await,
                    Err(e) => {
                        warn!(error = %e, "JSON-RPC message is not UTF-8");
                        Some(JsonRpcResponse::failure(
                            Value::Null,
                            JsonRpcError::parse_error(e),
                        ))
                    },
                },
            };

            if let Some(response) = response {
                let mut bytes = serde_json::to_vec(&response)?;
                bytes.push(b'\n');
                writer.write_all(&bytes).await?;
                writer.flush().await?;
            }
        }

        info!("Input closed, MCP server stopping");
        Ok(())
    }

    /// Handle one raw line; `None` means nothing is written back
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Unparsable JSON-RPC message");
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    JsonRpcError::parse_error(e),
                ));
            },
        };

        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::failure(id, JsonRpcError::invalid_request(e)));
            },
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::failure(
                id,
                JsonRpcError::invalid_request(format!("unsupported jsonrpc '{}'", request.jsonrpc)),
            ));
        }

        self.handle_request(request).await
    }

    /// Dispatch a parsed request
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id else {
            debug!(method = %request.method, "Notification received");
            return None;
        };

        debug!(method = %request.method, "Request received");

        let outcome = match request.method.as_str() {
            "initialize" => encode(&InitializeResult {
                protocol_version: PROTOCOL_VERSION.to_string(),
                capabilities: ServerCapabilities::default(),
                server_info: self.server_info.clone(),
            }),
            "ping" => Ok(json!({})),
            "tools/list" => encode(&ListToolsResult {
                tools: self.registry.list(),
            }),
            "tools/call" => self.call_tool(request.params).await,
            other => Err(JsonRpcError::method_not_found(other)),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = params
            .ok_or_else(|| JsonRpcError::invalid_params("missing params"))
            .and_then(|p| serde_json::from_value(p).map_err(JsonRpcError::invalid_params))?;

        let arguments = params.arguments.unwrap_or_else(|| json!({}));
        let result = self.registry.call(&params.name, arguments).await?;
        encode(&result)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(JsonRpcError::internal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CallToolResult, McpTool};
    use crate::tools::{ToolError, ToolHandler};
    use async_trait::async_trait;
    use std::sync::Arc;

    #[derive(Debug)]
    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        fn definition(&self) -> McpTool {
            McpTool {
                name: "echo".to_string(),
                description: None,
                input_schema: json!({"type": "object"}),
            }
        }

        async fn call(&self, arguments: Value) -> Result<CallToolResult, ToolError> {
            Ok(CallToolResult::structured(arguments))
        }
    }

    fn server() -> McpServer {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        McpServer::new(registry)
    }

    #[tokio::test]
    async fn test_initialize() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .unwrap();

        let result = response.result.unwrap();
        assert_eq!(response.id, json!(1));
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "perplexity-search");
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_ping() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#)
            .await
            .unwrap();
        assert_eq!(response.result, Some(json!({})));
    }

    #[tokio::test]
    async fn test_parse_error() {
        let response = server().handle_line("{not json").await.unwrap();
        assert_eq!(response.id, Value::Null);
        assert_eq!(response.error.unwrap().code, -32700);
    }

    #[tokio::test]
    async fn test_wrong_jsonrpc_version() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"1.0","id":3,"method":"ping"}"#)
            .await
            .unwrap();
        assert_eq!(response.id, json!(3));
        assert_eq!(response.error.unwrap().code, -32600);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_tools_call_dispatch() {
        let response = server()
            .handle_line(
                r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"echo","arguments":{"a":1}}}"#,
            )
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["structuredContent"], json!({"a": 1}));
        assert_eq!(result["isError"], false);
    }

    #[tokio::test]
    async fn test_tools_call_unknown_tool_and_bad_params() {
        let server = server();

        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"nope"}}"#)
            .await
            .unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, -32602);
        assert!(error.message.contains("nope"));

        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","id":6,"method":"tools/call"}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32602);
    }

    async fn serve_bytes(server: &McpServer, input: &[u8]) -> Vec<Value> {
        let mut output = Vec::new();
        server.serve(input, &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_keeps_serving() {
        let responses = serve_bytes(
            &server(),
            b"\xff\xfe garbage\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n",
        )
        .await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert_eq!(responses[1]["id"], 1);
        assert_eq!(responses[1]["result"], json!({}));
    }

    #[tokio::test]
    async fn test_oversized_line_rejected_and_session_continues() {
        let server = server().with_max_line_bytes(64);
        let mut input = vec![b'x'; 500];
        input.push(b'\n');
        input.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n");

        let responses = serve_bytes(&server, &input).await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["error"]["code"], -32600);
        assert!(
            responses[0]["error"]["message"]
                .as_str()
                .unwrap()
                .contains("64 bytes")
        );
        assert_eq!(responses[1]["id"], 2);
    }

    #[tokio::test]
    async fn test_read_frame_limits() {
        let mut input: &[u8] = b"abcd\nabcde\nabcdefgh\nab";

        assert_eq!(read_frame(&mut input, 4).await.unwrap(), Frame::Line(b"abcd\n".to_vec()));
        assert_eq!(read_frame(&mut input, 4).await.unwrap(), Frame::Oversized);
        assert_eq!(read_frame(&mut input, 4).await.unwrap(), Frame::Oversized);
        assert_eq!(read_frame(&mut input, 4).await.unwrap(), Frame::Line(b"ab".to_vec()));
        assert_eq!(read_frame(&mut input, 4).await.unwrap(), Frame::Eof);
    }

    #[tokio::test]
    async fn test_null_id_is_a_request() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#)
            .await
            .unwrap();
        assert_eq!(response.id, Value::Null);
        assert_eq!(response.result, Some(json!({})));
    }
}
