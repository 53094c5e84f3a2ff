//! Tool server speaking line-delimited JSON-RPC 2.0 over stdio.
//!
//! Each line on stdin is one request or notification, each response is
//! written as one line on stdout. The supported methods are the tool subset
//! of the Model Context Protocol:
//!
//! | Method | Result |
//! |--------|--------|
//! | `initialize` | protocol version, capabilities and server info |
//! | `notifications/initialized` | none (notification) |
//! | `ping` | `{}` |
//! | `tools/list` | `{"tools": [...]}` |
//! | `tools/call` | `{"content": [{"type": "text", "text": ...}], "isError": false}` |
//!
//! ```text
//! {"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"delete_event","arguments":{"event_id":"abc"}}}
//! {"jsonrpc":"2.0","id":1,"result":{"content":[{"type":"text","text":"Event with id abc is deleted."}],"isError":false}}
//! ```

use crate::commands::{self, CommandContext};
use crate::error::AppResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Name reported in `serverInfo`
pub const SERVER_NAME: &str = "calendar";

/// Protocol revision answered when the client does not ask for one
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

/// A request or notification read from stdin
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Absent for notifications. An explicit `null` is still a request.
    #[serde(default, deserialize_with = "present")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Any value that appears in the input, `null` included
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// A response written to stdout
#[derive(Debug, Serialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Handle one input line, returning the response to write if any
pub async fn handle_line(ctx: &CommandContext, line: &str) -> Option<JsonRpcResponse> {
    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!("Unparsable request: {}", e);
            return Some(JsonRpcResponse::error(Value::Null, PARSE_ERROR, e.to_string()));
        }
    };

    if request.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
        return request
            .id
            .map(|id| JsonRpcResponse::error(id, INVALID_REQUEST, "Unsupported jsonrpc version"));
    }

    debug!("Received {}", request.method);
    let outcome = dispatch(ctx, &request.method, request.params).await;

    // Notifications never get a response
    let id = request.id?;
    Some(match outcome {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err((code, message)) => JsonRpcResponse::error(id, code, message),
    })
}

async fn dispatch(
    ctx: &CommandContext,
    method: &str,
    params: Value,
) -> Result<Value, (i64, String)> {
    match method {
        "initialize" => {
            let version = params
                .get("protocolVersion")
                .and_then(Value::as_str)
                .unwrap_or(PROTOCOL_VERSION)
                .to_string();
            Ok(json!({
                "protocolVersion": version,
                "capabilities": {"tools": {"listChanged": false}},
                "serverInfo": {"name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION")},
            }))
        }
        "notifications/initialized" | "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": commands::get_all_tools() })),
        "tools/call" => {
            let params: ToolCallParams = serde_json::from_value(params)
                .map_err(|e| (INVALID_PARAMS, format!("Invalid tools/call params: {}", e)))?;

            match commands::call_tool(ctx, &params.name, params.arguments).await {
                Ok(text) => Ok(json!({
                    "content": [{"type": "text", "text": text}],
                    "isError": false,
                })),
                Err(e) => Err((INVALID_PARAMS, e.to_string())),
            }
        }
        other => Err((METHOD_NOT_FOUND, format!("Method not found: {}", other))),
    }
}

/// Serve requests from `reader` until EOF, writing responses to `writer`.
///
/// Each line is handled on its own task, so a slow tool call does not hold up
/// later requests. Responses are written in completion order.
pub async fn run<R, W>(ctx: &CommandContext, reader: R, mut writer: W) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Input closed");
                    break;
                };
                let line = line.trim().to_string();
                if !line.is_empty() {
                    let ctx = ctx.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        if let Some(response) = handle_line(&ctx, &line).await {
                            // The receiver lives until every sender is dropped
                            let _ = tx.send(response);
                        }
                    });
                }
            }
            Some(response) = rx.recv() => {
                write_response(&mut writer, &response).await?;
            }
        }
    }

    // Let in-flight requests finish before returning
    drop(tx);
    while let Some(response) = rx.recv().await {
        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

async fn write_response<W>(writer: &mut W, response: &JsonRpcResponse) -> AppResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut json = serde_json::to_string(response)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Serve requests on stdin/stdout
pub async fn serve_stdio(ctx: CommandContext) -> AppResult<()> {
    info!("Serving calendar tools on stdio");
    let result = run(&ctx, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await;
    if let Err(e) = &result {
        error!("Tool server stopped: {}", e);
    }
    result
}
