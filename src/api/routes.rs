//! API route configuration.

use axum::Router;
use axum::routing::{get, post};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use super::handlers::{self, ErrorResponse, HealthResponse};
use crate::context::AppContext;
use crate::mcp::create_mcp_router;

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "RTM Bridge API",
        version = "0.1.0",
        description = "Remember The Milk bridge for AI agents",
        license(name = "GPL-2.0")
    ),
    paths(handlers::health, handlers::call_method),
    components(schemas(HealthResponse, ErrorResponse)),
    tags(
        (name = "system", description = "System health and status endpoints"),
        (name = "rtm", description = "Signed, rate-limited upstream calls")
    )
)]
pub struct ApiDoc;

/// Create the application router: REST wrapper, both MCP endpoints and,
/// optionally, the OpenAPI docs at `/docs`.
pub fn create_router(context: AppContext, enable_docs: bool) -> Router {
    let mut rest = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/rtm/{method}", post(handlers::call_method));
    if enable_docs {
        rest = rest.merge(Scalar::with_url("/docs", ApiDoc::openapi()));
    }

    let mcp = create_mcp_router(
        context.sse_endpoint().clone(),
        context.json_endpoint().clone(),
    );
    rest.with_state(context).merge(mcp)
}
