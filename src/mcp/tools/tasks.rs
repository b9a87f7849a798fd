//! MCP tools for reading Remember The Milk lists and tasks.

use rmcp::{
    ErrorData as McpError,
    handler::server::wrapper::Parameters,
    model::*,
    schemars,
    schemars::JsonSchema,
    tool, tool_router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::mcp::tools::{parse_arguments, upstream_error};
use crate::rtm::RtmClient;

// =============================================================================
// Parameter Structs
// =============================================================================

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct GetTasksParams {
    #[schemars(description = "Only return tasks from this list. Use get_lists to find list IDs.")]
    pub list_id: Option<String>,
    #[schemars(
        description = "RTM search filter, e.g. 'status:incomplete', 'dueBefore:tomorrow' or 'tag:work AND priority:1'."
    )]
    pub filter: Option<String>,
}

// =============================================================================
// Task Tools
// =============================================================================

/// Tools bound to one user's upstream token.
#[derive(Clone)]
pub struct TaskTools {
    client: Arc<RtmClient>,
    auth_token: String,
}

#[tool_router]
impl TaskTools {
    pub fn new(client: Arc<RtmClient>, auth_token: impl Into<String>) -> Self {
        Self {
            client,
            auth_token: auth_token.into(),
        }
    }

    /// Tool descriptors for `tools/list`, sorted by name.
    pub fn definitions() -> Vec<Tool> {
        let mut tools = Self::tool_router().list_all();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Run the tool called `name` with raw JSON `arguments`.
    pub async fn call(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<CallToolResult, McpError> {
        match name {
            "get_lists" => self.get_lists().await,
            "get_tasks" => self.get_tasks(Parameters(parse_arguments(arguments)?)).await,
            "check_token" => self.check_token().await,
            other => Err(McpError::invalid_params(
                format!("Unknown tool: {other}"),
                None,
            )),
        }
    }

    #[tool(
        description = "List all Remember The Milk lists of the linked account, including smart lists and archived state."
    )]
    pub async fn get_lists(&self) -> Result<CallToolResult, McpError> {
        self.forward("rtm.lists.getList", &[]).await
    }

    #[tool(
        description = "List tasks, optionally restricted to one list and/or an RTM search filter. Use this before suggesting changes to see the current state."
    )]
    pub async fn get_tasks(
        &self,
        params: Parameters<GetTasksParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(list_id) = params.0.list_id.as_deref() {
            query.push(("list_id", list_id));
        }
        if let Some(filter) = params.0.filter.as_deref() {
            query.push(("filter", filter));
        }
        self.forward("rtm.tasks.getList", &query).await
    }

    #[tool(description = "Check that the linked Remember The Milk authorization is still valid.")]
    pub async fn check_token(&self) -> Result<CallToolResult, McpError> {
        self.forward("rtm.auth.checkToken", &[]).await
    }

    /// Call `method` with the bound token. Upstream failures become tool-level
    /// errors so the agent can see and react to them.
    async fn forward(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<CallToolResult, McpError> {
        match self.client.call(method, params, Some(&self.auth_token)).await {
            Ok(rsp) => {
                let text = serde_json::to_string_pretty(&rsp).map_err(|e| {
                    McpError::internal_error(
                        "serialization_error",
                        Some(serde_json::json!({"error": e.to_string()})),
                    )
                })?;
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(err) => Ok(upstream_error(&err)),
        }
    }
}
