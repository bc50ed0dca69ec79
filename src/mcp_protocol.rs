//! JSON-RPC 2.0 message handling for the feedback MCP server
//!
//! Parses one line of input into a request, routes it by method and builds
//! the reply. Only four methods exist: `initialize`, `ping`, `tools/list`
//! and `tools/call`.
//!
//! ```text
//! -> {"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"interactive_feedback","arguments":{"message":"Ship it?"}}}
//! <- {"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"yes"}]}}
//! -> {"jsonrpc":"2.0","method":"notifications/initialized"}    (no reply)
//! ```

// McpMethod::from_str returns Option, so FromStr does not fit
#![allow(clippy::should_implement_trait)]
// parse_request hands back a ready-made error response
#![allow(clippy::result_large_err)]

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::invoker::FeedbackInvoker;
use crate::mcp_tools;

pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revision answered when the client does not name one
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

pub const SERVER_NAME: &str = "Interactive Feedback MCP";

/// Error codes used in replies
pub mod error_codes {
    /// The line is not JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// JSON, but not a request (not an object, missing `jsonrpc` or `method`)
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Bad `tools/call` params, unknown tool or missing `message`
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// One parsed input line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    /// `None` marks a notification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    /// `{}` when absent
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<Value>, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.to_string(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Id to echo in the response (`null` for notifications)
    pub fn response_id(&self) -> Value {
        self.id.clone().unwrap_or(Value::Null)
    }
}

/// One output line. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    /// Echoes the request id, `null` when it could not be read
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Methods this server answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpMethod {
    Initialize,
    Ping,
    ToolsList,
    /// Opens a feedback dialog; may block for minutes
    ToolsCall,
}

impl McpMethod {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "initialize" => Some(Self::Initialize),
            "ping" => Some(Self::Ping),
            "tools/list" => Some(Self::ToolsList),
            "tools/call" => Some(Self::ToolsCall),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Ping => "ping",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
        }
    }
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// Result of the initialize handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: CapabilitySet,
    pub server_info: ServerInfo,
}

/// Server identification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Advertised capabilities: tools only, with a fixed list
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CapabilitySet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsCapability {
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Read one input line as a request.
///
/// On failure the returned response is ready to send: `-32700` with a null id
/// for non-JSON, `-32600` (echoing the id when present) for anything else.
pub fn parse_request(json: &str) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let value: Value = serde_json::from_str(json).map_err(|e| {
        JsonRpcResponse::error(
            Value::Null,
            error_codes::PARSE_ERROR,
            format!("Parse error: {}", e),
        )
    })?;

    let Some(object) = value.as_object() else {
        return Err(JsonRpcResponse::error(
            Value::Null,
            error_codes::INVALID_REQUEST,
            "Request must be a JSON object",
        ));
    };

    let id = object.get("id").cloned();
    let reply_id = id.clone().unwrap_or(Value::Null);

    let jsonrpc = object
        .get("jsonrpc")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            JsonRpcResponse::error(
                reply_id.clone(),
                error_codes::INVALID_REQUEST,
                "Missing or invalid 'jsonrpc' field",
            )
        })?;

    if jsonrpc != JSONRPC_VERSION {
        return Err(JsonRpcResponse::error(
            reply_id,
            error_codes::INVALID_REQUEST,
            format!(
                "Invalid jsonrpc version: expected '{}', got '{}'",
                JSONRPC_VERSION, jsonrpc
            ),
        ));
    }

    let method = object
        .get("method")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            JsonRpcResponse::error(
                reply_id.clone(),
                error_codes::INVALID_REQUEST,
                "Missing 'method' field",
            )
        })?;

    let params = object
        .get("params")
        .cloned()
        .unwrap_or(Value::Object(Default::default()));

    Ok(JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id,
        method: method.to_string(),
        params,
    })
}

/// Handle an MCP JSON-RPC request and return a response.
///
/// `tools/call` blocks for as long as the human takes to answer; the server
/// runs it on a worker thread rather than through here.
pub fn handle_request(request: JsonRpcRequest, invoker: &FeedbackInvoker) -> JsonRpcResponse {
    match McpMethod::from_str(&request.method) {
        Some(McpMethod::Initialize) => handle_initialize(request),
        Some(McpMethod::Ping) => JsonRpcResponse::success(request.response_id(), json!({})),
        Some(McpMethod::ToolsList) => handle_tools_list(request),
        Some(McpMethod::ToolsCall) => handle_tools_call(request, invoker),
        None => JsonRpcResponse::error(
            request.response_id(),
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", request.method),
        ),
    }
}

/// Handle initialize request, echoing the client's protocol version
pub fn handle_initialize(request: JsonRpcRequest) -> JsonRpcResponse {
    let protocol_version = request
        .params
        .get("protocolVersion")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_PROTOCOL_VERSION)
        .to_string();

    let result = InitializeResult {
        protocol_version,
        capabilities: CapabilitySet {
            tools: Some(ToolsCapability {
                list_changed: Some(false),
            }),
        },
        server_info: ServerInfo {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    };

    JsonRpcResponse::success(
        request.response_id(),
        serde_json::to_value(result).unwrap_or(Value::Null),
    )
}

pub fn handle_tools_list(request: JsonRpcRequest) -> JsonRpcResponse {
    let tools = mcp_tools::get_tool_definitions();
    let tools_json = serde_json::to_value(&tools).unwrap_or(json!([]));

    JsonRpcResponse::success(request.response_id(), json!({ "tools": tools_json }))
}

/// Validate a tools/call request and run the tool.
pub fn handle_tools_call(request: JsonRpcRequest, invoker: &FeedbackInvoker) -> JsonRpcResponse {
    let id = request.response_id();

    let Some(params) = request.params.as_object() else {
        return JsonRpcResponse::error(
            id,
            error_codes::INVALID_PARAMS,
            "Invalid params: expected object",
        );
    };

    let Some(tool_name) = params.get("name").and_then(|v| v.as_str()) else {
        return JsonRpcResponse::error(
            id,
            error_codes::INVALID_PARAMS,
            "Missing required parameter: name",
        );
    };

    if !mcp_tools::is_known_tool(tool_name) {
        return JsonRpcResponse::error(
            id,
            error_codes::INVALID_PARAMS,
            format!("Unknown tool: {}", tool_name),
        );
    }

    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
    let feedback_request = match mcp_tools::parse_feedback_arguments(&arguments) {
        Ok(feedback_request) => feedback_request,
        Err(message) => return JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, message),
    };

    let result = mcp_tools::handle_feedback_call(invoker, &feedback_request);
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(
            id,
            error_codes::INTERNAL_ERROR,
            format!("Failed to serialize tool result: {}", e),
        ),
    }
}
