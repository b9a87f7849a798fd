//! MCP Streamable HTTP endpoints
//!
//! An [`McpEndpoint`] owns the transports of one mounted path. Requests are
//! routed by their `Mcp-Session-Id` header:
//!
//! - no header: a fresh transport, registered once it has initialized
//! - a known id: the registered transport (owned by the same user)
//! - an unknown id: `404 Session not found`
//!
//! In stateless mode every request gets its own throwaway transport.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::any,
};
use dashmap::DashMap;
use futures_util::StreamExt;
use tracing::{debug, info, instrument};

use crate::auth::{AuthInfo, AuthResolver};

use super::jsonrpc::{JsonRpcErrorResponse, TRANSPORT_ERROR};
use super::transport::{
    DEFAULT_MAX_BODY_BYTES, DEFAULT_SSE_KEEP_ALIVE, EventStore, MessageHandler, SESSION_ID_HEADER,
    StreamableHttpTransport, TransportError, TransportOptions,
};

/// Settings shared by every transport of an endpoint.
#[derive(Clone)]
pub struct McpEndpointConfig {
    pub json_response: bool,
    pub stateless: bool,
    pub sse_keep_alive: Option<Duration>,
    pub max_body_bytes: usize,
    pub event_store: Option<Arc<dyn EventStore>>,
}

impl Default for McpEndpointConfig {
    fn default() -> Self {
        Self {
            json_response: false,
            stateless: false,
            sse_keep_alive: Some(DEFAULT_SSE_KEEP_ALIVE),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            event_store: None,
        }
    }
}

impl McpEndpointConfig {
    pub fn with_json_response(mut self, enabled: bool) -> Self {
        self.json_response = enabled;
        self
    }

    pub fn with_stateless(mut self, stateless: bool) -> Self {
        self.stateless = stateless;
        self
    }

    pub fn with_sse_keep_alive(mut self, interval: Option<Duration>) -> Self {
        self.sse_keep_alive = interval;
        self
    }

    pub fn with_event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.event_store = Some(store);
        self
    }
}

#[derive(Clone)]
struct SessionEntry {
    user_id: String,
    transport: StreamableHttpTransport,
}

type Registry = DashMap<String, SessionEntry>;

/// One mounted MCP path and its session registry.
#[derive(Clone)]
pub struct McpEndpoint {
    handler: Arc<dyn MessageHandler>,
    auth: Arc<dyn AuthResolver>,
    config: McpEndpointConfig,
    sessions: Arc<Registry>,
}

impl McpEndpoint {
    pub fn new(
        handler: Arc<dyn MessageHandler>,
        auth: Arc<dyn AuthResolver>,
        config: McpEndpointConfig,
    ) -> Self {
        Self {
            handler,
            auth,
            config,
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Close every registered transport.
    pub async fn close_all(&self) {
        let transports: Vec<StreamableHttpTransport> = self
            .sessions
            .iter()
            .map(|entry| entry.transport.clone())
            .collect();
        self.sessions.clear();
        for transport in transports {
            transport.close().await;
        }
    }

    fn transport_options(&self) -> TransportOptions {
        let base = if self.config.stateless {
            TransportOptions::default()
        } else {
            TransportOptions::stateful()
        };
        let sessions = Arc::downgrade(&self.sessions);
        let mut options = base
            .with_json_response(self.config.json_response)
            .with_sse_keep_alive(self.config.sse_keep_alive)
            .with_max_body_bytes(self.config.max_body_bytes)
            .with_on_close(Arc::new(move |session_id: Option<&str>| {
                if let (Some(sessions), Some(id)) = (sessions.upgrade(), session_id) {
                    sessions.remove(id);
                    debug!(session_id = %id, "session removed from registry");
                }
            }));
        if let Some(store) = &self.config.event_store {
            options = options.with_event_store(Arc::clone(store));
        }
        options
    }

    /// Authenticate the caller and route the request to its transport.
    pub async fn handle(&self, request: Request) -> Response {
        let Some(user_id) = self.auth.resolve_user(request.headers()) else {
            return unauthorized();
        };
        let auth_info = AuthInfo {
            user_id: user_id.clone(),
        };

        if self.config.stateless {
            let transport = StreamableHttpTransport::new(
                Arc::clone(&self.handler),
                self.transport_options(),
            );
            let response = transport.handle(request, Some(auth_info)).await;
            return hold_until_sent(response, transport);
        }

        let session_id = request
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        if let Some(session_id) = session_id {
            // Clone out of the map; the guard must not live across an await.
            let entry = self.sessions.get(&session_id).map(|e| e.value().clone());
            return match entry {
                Some(entry) if entry.user_id == user_id => {
                    entry.transport.handle(request, Some(auth_info)).await
                }
                _ => {
                    debug!(%session_id, "unknown session");
                    TransportError::SessionNotFound.into_response()
                }
            };
        }

        let transport =
            StreamableHttpTransport::new(Arc::clone(&self.handler), self.transport_options());
        let response = transport.handle(request, Some(auth_info)).await;
        if let Some(session_id) = transport.session_id().await {
            info!(%session_id, %user_id, "MCP session started");
            self.sessions.insert(
                session_id,
                SessionEntry {
                    user_id,
                    transport,
                },
            );
        }
        response
    }
}

/// Keep a per-request transport alive while its response body streams, so
/// late replies still find their stream.
fn hold_until_sent(response: Response, transport: StreamableHttpTransport) -> Response {
    let (parts, body) = response.into_parts();
    let stream = body.into_data_stream().map(move |chunk| {
        let _transport = &transport;
        chunk
    });
    Response::from_parts(parts, Body::from_stream(stream))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(JsonRpcErrorResponse::envelope(
            TRANSPORT_ERROR,
            "Unauthorized: missing or invalid credentials",
        )),
    )
        .into_response()
}

#[instrument(skip_all, fields(method = %request.method()))]
async fn mcp_handler(State(endpoint): State<McpEndpoint>, request: Request) -> Response {
    endpoint.handle(request).await
}

/// Mount the SSE endpoint at `/mcp` and the JSON endpoint at `/mcp/json`.
pub fn create_mcp_router(sse: McpEndpoint, json: McpEndpoint) -> Router {
    Router::new()
        .route("/mcp", any(mcp_handler).with_state(sse))
        .route("/mcp/json", any(mcp_handler).with_state(json))
}
