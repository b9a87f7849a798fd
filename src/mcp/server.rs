//! MCP server implementation
//!
//! [`McpServer`] is the protocol message handler behind every transport. It
//! answers `initialize`, `ping`, `tools/list` and `tools/call`; replies go
//! back through the transport's [`Outbound`](super::transport::Outbound)
//! handle.

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    model::{CallToolResult, ErrorCode, ServerCapabilities, ServerInfo},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::auth::TokenStore;
use crate::rtm::RtmClient;

use super::jsonrpc::{JsonRpcMessage, JsonRpcRequest};
use super::tools::{TaskTools, reauthorization_required};
use super::transport::{MessageContext, MessageHandler, SUPPORTED_PROTOCOL_VERSIONS};

pub const SERVER_NAME: &str = "rtm-bridge";

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
    #[serde(default, rename = "_meta")]
    meta: Option<Value>,
}

/// Pick the protocol revision for a session: the client's request when we
/// speak it, the newest supported revision otherwise.
pub fn negotiate_protocol_version(requested: Option<&str>) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .into_iter()
        .find(|supported| Some(*supported) == requested)
        .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0])
}

/// Shared protocol handler. One instance serves every session of an
/// endpoint; per-request state travels in the [`MessageContext`].
#[derive(Clone)]
pub struct McpServer {
    client: Arc<RtmClient>,
    tokens: Arc<dyn TokenStore>,
}

impl McpServer {
    pub fn new(client: Arc<RtmClient>, tokens: Arc<dyn TokenStore>) -> Self {
        Self { client, tokens }
    }

    #[instrument(skip(self, request, context), fields(id = %request.id, method = %request.method))]
    async fn handle_request(
        &self,
        request: &JsonRpcRequest,
        context: &MessageContext,
    ) -> Result<Value, McpError> {
        match request.method.as_str() {
            "initialize" => self.initialize_result(request.params.as_ref()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": TaskTools::definitions() })),
            "tools/call" => {
                let result = self.call_tool(request, context).await?;
                serde_json::to_value(result).map_err(|e| {
                    McpError::internal_error(
                        "serialization_error",
                        Some(json!({"error": e.to_string()})),
                    )
                })
            }
            other => Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
                None,
            )),
        }
    }

    fn initialize_result(&self, params: Option<&Value>) -> Result<Value, McpError> {
        let requested = params
            .and_then(|params| params.get("protocolVersion"))
            .and_then(Value::as_str);
        let mut result = serde_json::to_value(self.get_info()).map_err(|e| {
            McpError::internal_error(
                "serialization_error",
                Some(json!({"error": e.to_string()})),
            )
        })?;
        if let Some(fields) = result.as_object_mut() {
            fields.insert(
                "protocolVersion".to_string(),
                json!(negotiate_protocol_version(requested)),
            );
            fields.insert(
                "serverInfo".to_string(),
                json!({"name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION")}),
            );
        }
        Ok(result)
    }

    async fn call_tool(
        &self,
        request: &JsonRpcRequest,
        context: &MessageContext,
    ) -> Result<CallToolResult, McpError> {
        let params: CallToolParams = serde_json::from_value(
            request.params.clone().unwrap_or_else(|| json!({})),
        )
        .map_err(|e| McpError::invalid_params("invalid_params", Some(json!({"error": e.to_string()}))))?;

        let Some(auth_info) = &context.auth_info else {
            return Ok(reauthorization_required("No authenticated user"));
        };
        let token = match self.tokens.active_token(&auth_info.user_id) {
            Ok(token) => token,
            Err(err) => {
                debug!(user_id = %auth_info.user_id, "no active upstream token");
                return Ok(reauthorization_required(&err.to_string()));
            }
        };

        let progress_token = params
            .meta
            .as_ref()
            .and_then(|meta| meta.get("progressToken"))
            .cloned();
        if let Some(progress_token) = progress_token {
            let progress = JsonRpcMessage::notification(
                "notifications/progress",
                Some(json!({
                    "progressToken": progress_token,
                    "progress": 0,
                    "message": format!("Calling {}", params.name),
                })),
            );
            if let Err(err) = context
                .outbound
                .send(progress, Some(request.id.clone()))
                .await
            {
                warn!(error = %err, "failed to send progress notification");
            }
        }

        TaskTools::new(Arc::clone(&self.client), token)
            .call(&params.name, params.arguments)
            .await
    }
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build()).with_instructions(
            "Remember The Milk bridge - read lists and tasks of the linked RTM account",
        )
    }
}

impl MessageHandler for McpServer {
    fn on_message(&self, message: JsonRpcMessage, context: MessageContext) {
        match message {
            JsonRpcMessage::Request(request) => {
                let server = self.clone();
                tokio::spawn(async move {
                    let reply = match server.handle_request(&request, &context).await {
                        Ok(result) => JsonRpcMessage::response(request.id, result),
                        Err(error) => JsonRpcMessage::error(Some(request.id), error.into()),
                    };
                    if let Err(err) = context.outbound.send(reply, None).await {
                        warn!(error = %err, "failed to deliver reply");
                    }
                });
            }
            JsonRpcMessage::Notification(notification) => {
                debug!(method = %notification.method, "notification received");
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::Error(_) => {
                debug!("ignoring client response");
            }
        }
    }
}
