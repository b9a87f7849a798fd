//! HTTP server: REST wrapper, MCP endpoints and OpenAPI docs.

mod handlers;
mod routes;

#[cfg(test)]
mod mod_test;

use std::net::IpAddr;

use miette::Diagnostic;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::context::AppContext;

pub use handlers::{ErrorResponse, HealthResponse};
pub use routes::{ApiDoc, create_router};

/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "rtm_bridge=debug,tower_http=debug";

/// Log filter used when `RUST_LOG` is unset and verbose output was requested.
pub const VERBOSE_LOG_FILTER: &str = "rtm_bridge=trace,tower_http=debug,rmcp=debug";

/// API server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host address to bind to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Number of `-v` flags given on the command line
    pub verbosity: u8,
    /// Serve the OpenAPI docs at `/docs`
    pub enable_docs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 3000,
            verbosity: 0,
            enable_docs: false,
        }
    }
}

#[derive(Error, Diagnostic, Debug)]
pub enum ApiError {
    #[error("Failed to bind {addr}")]
    #[diagnostic(
        code(rtm_bridge::api::bind),
        help("Check that the port is free or pick another one with --port.")
    )]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    #[diagnostic(code(rtm_bridge::api::serve))]
    Serve(#[from] std::io::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Default log filter for a verbosity level.
pub fn log_filter(verbosity: u8) -> &'static str {
    if verbosity == 0 {
        DEFAULT_LOG_FILTER
    } else {
        VERBOSE_LOG_FILTER
    }
}

/// Initialize tracing subscriber with env filter
pub fn init_tracing(verbosity: u8) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter(verbosity).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Run the server until Ctrl-C or until the context's shutdown token fires.
///
/// Live MCP sessions are closed before the listener drains, so open SSE
/// streams do not hold the shutdown up.
pub async fn run(config: Config, context: AppContext) -> ApiResult<()> {
    init_tracing(config.verbosity);

    let app = create_router(context.clone(), config.enable_docs)
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ApiError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!("API server listening on http://{}", addr);
    if config.enable_docs {
        info!("API docs at http://{}/docs", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(context))
        .await?;
    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal(context: AppContext) {
    let token = context.shutdown_token();
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received, shutting down"),
        _ = token.cancelled() => info!("shutdown requested"),
    }
    context.shutdown().await;
}
