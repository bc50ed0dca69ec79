//! MCP tool surface
//!
//! A single tool, `interactive_feedback`, which asks the human a question
//! through the feedback UI and returns their answer as content items.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::feedback::FeedbackRequest;
use crate::invoker::FeedbackInvoker;

pub use crate::invoker::ContentItem as ToolContent;

pub const FEEDBACK_TOOL_NAME: &str = "interactive_feedback";

/// Tool definition for the MCP tools/list response
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Result of a tool call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// Returns the tool definitions advertised by this server
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    vec![ToolDefinition {
        name: FEEDBACK_TOOL_NAME.to_string(),
        description: "Request interactive feedback from the user.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The specific question for the user"
                },
                "predefined_options": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Predefined options for the user to choose from (optional)"
                }
            },
            "required": ["message"]
        }),
    }]
}

pub fn is_known_tool(name: &str) -> bool {
    name == FEEDBACK_TOOL_NAME
}

/// Build a request from `tools/call` arguments.
///
/// `message` must be a string. `predefined_options` is used only when it is
/// an array of strings; any other shape is ignored.
pub fn parse_feedback_arguments(arguments: &Value) -> Result<FeedbackRequest, String> {
    let arguments = arguments
        .as_object()
        .ok_or_else(|| "Invalid arguments: expected object".to_string())?;

    let message = match arguments.get("message") {
        Some(Value::String(message)) => message.clone(),
        Some(_) => return Err("Invalid argument: 'message' must be a string".to_string()),
        None => return Err("Missing required argument: message".to_string()),
    };

    let predefined_options = match arguments.get("predefined_options") {
        Some(Value::Array(items)) => {
            let options: Option<Vec<String>> = items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect();
            if options.is_none() {
                debug!("predefined_options contains non-string entries, ignoring");
            }
            options
        }
        Some(Value::Null) | None => None,
        Some(other) => {
            debug!(value = %other, "predefined_options is not an array, ignoring");
            None
        }
    };

    Ok(FeedbackRequest {
        message,
        predefined_options,
        default_prompt: None,
    })
}

/// Run the feedback tool. Invocation failures are already folded into the content.
pub fn handle_feedback_call(invoker: &FeedbackInvoker, request: &FeedbackRequest) -> ToolResult {
    ToolResult {
        content: invoker.invoke(request),
        is_error: None,
    }
}
