//! Liveness endpoint.

use axum::{Json, extract::State};
use serde::Serialize;
use tracing::instrument;
use utoipa::ToSchema;

use crate::context::AppContext;

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok`, or `shutting_down` once shutdown has started
    #[schema(example = "ok")]
    pub status: String,
    /// Crate version
    #[schema(example = "0.1.0")]
    pub version: String,
    /// Live MCP sessions across both endpoints
    #[schema(example = 2)]
    pub mcp_sessions: usize,
}

/// Health check endpoint
///
/// Reports whether the bridge is serving and how many MCP sessions are open
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Bridge is up", body = HealthResponse)
    )
)]
#[instrument(skip(context))]
pub async fn health(State(context): State<AppContext>) -> Json<HealthResponse> {
    let status = if context.is_shutting_down() {
        "shutting_down"
    } else {
        "ok"
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        mcp_sessions: context.sse_endpoint().session_count()
            + context.json_endpoint().session_count(),
    })
}
