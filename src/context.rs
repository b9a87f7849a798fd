//! Application context.
//!
//! Everything long-lived is built once at startup and handed to the HTTP
//! layer explicitly: the shared upstream client, the auth collaborators, both
//! MCP endpoints and the shutdown token.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::auth::{AuthResolver, TokenStore};
use crate::config::BridgeConfig;
use crate::mcp::{McpEndpoint, McpEndpointConfig, McpServer};
use crate::rtm::RtmClient;

#[derive(Clone)]
pub struct AppContext {
    client: Arc<RtmClient>,
    auth: Arc<dyn AuthResolver>,
    tokens: Arc<dyn TokenStore>,
    sse_endpoint: McpEndpoint,
    json_endpoint: McpEndpoint,
    shutdown: CancellationToken,
}

impl AppContext {
    /// Build the context with the in-memory collaborators seeded from `config`.
    pub fn new(config: &BridgeConfig) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(config.resolver()),
            Arc::new(config.token_store()),
        )
    }

    pub fn with_collaborators(
        config: &BridgeConfig,
        auth: Arc<dyn AuthResolver>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        let client = Arc::new(RtmClient::new(config.rtm.clone()));
        let server = Arc::new(McpServer::new(Arc::clone(&client), Arc::clone(&tokens)));

        let endpoint_config = McpEndpointConfig::default().with_stateless(config.stateless);
        let sse_endpoint = McpEndpoint::new(
            server.clone(),
            Arc::clone(&auth),
            endpoint_config.clone(),
        );
        let json_endpoint = McpEndpoint::new(
            server,
            Arc::clone(&auth),
            endpoint_config.with_json_response(true),
        );

        Self {
            client,
            auth,
            tokens,
            sse_endpoint,
            json_endpoint,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn client(&self) -> &Arc<RtmClient> {
        &self.client
    }

    pub fn auth(&self) -> &Arc<dyn AuthResolver> {
        &self.auth
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    pub fn sse_endpoint(&self) -> &McpEndpoint {
        &self.sse_endpoint
    }

    pub fn json_endpoint(&self) -> &McpEndpoint {
        &self.json_endpoint
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop accepting work and close every live MCP session.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let sessions = self.sse_endpoint.session_count() + self.json_endpoint.session_count();
        self.sse_endpoint.close_all().await;
        self.json_endpoint.close_all().await;
        info!(sessions, "closed MCP sessions");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;

    fn config() -> BridgeConfig {
        BridgeConfig::default()
            .with_api_url("http://127.0.0.1:9/services/rest/")
            .with_api_key("k1", "alice")
            .with_token("alice", "tok-a")
    }

    #[tokio::test]
    async fn test_context_wires_collaborators() {
        let context = AppContext::new(&config());

        assert_eq!(
            context.client().config().api_url,
            "http://127.0.0.1:9/services/rest/"
        );
        assert_eq!(context.tokens().active_token("alice").unwrap(), "tok-a");
        assert_eq!(context.sse_endpoint().session_count(), 0);
        assert!(!context.is_shutting_down());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_token() {
        let context = AppContext::new(&config());
        let token = context.shutdown_token();

        context.shutdown().await;

        assert!(token.is_cancelled());
        assert!(context.is_shutting_down());
    }
}
