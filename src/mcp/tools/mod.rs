//! MCP tool implementations
//!
//! Tools are thin, read-only forwards to the upstream API. Each call is
//! bound to the caller's upstream token.

mod tasks;

#[cfg(test)]
mod tasks_test;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::rtm::RtmError;

pub use tasks::{GetTasksParams, TaskTools};

/// Deserialize tool arguments; a missing argument object counts as `{}`.
pub(crate) fn parse_arguments<T: DeserializeOwned>(arguments: Option<Value>) -> Result<T, McpError> {
    serde_json::from_value(arguments.unwrap_or_else(|| json!({}))).map_err(|e| {
        McpError::invalid_params(
            "invalid_arguments",
            Some(json!({"error": e.to_string()})),
        )
    })
}

/// Render an upstream failure as an `isError` tool result carrying its
/// classification.
pub(crate) fn upstream_error(err: &RtmError) -> CallToolResult {
    let payload = json!({
        "error": err.class().as_str(),
        "code": err.code(),
        "message": err.to_string(),
    });
    CallToolResult::error(vec![Content::text(payload.to_string())])
}

/// `isError` result for a caller without a usable upstream token.
pub(crate) fn reauthorization_required(message: &str) -> CallToolResult {
    let payload = json!({
        "error": "invalid_token",
        "message": message,
        "help": "Link your Remember The Milk account again, then retry.",
    });
    CallToolResult::error(vec![Content::text(payload.to_string())])
}
