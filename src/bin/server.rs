//! RTM bridge server binary.
//!
//! Reads the bridge configuration from the environment, applies command-line
//! overrides and serves the REST wrapper and MCP endpoints.

use std::net::IpAddr;
use std::time::Duration;

use clap::Parser;
use miette::Diagnostic;
use rtm_bridge::api::{self, ApiError, Config};
use rtm_bridge::config::{BridgeConfig, ConfigError};
use rtm_bridge::context::AppContext;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
enum BinaryError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Api(#[from] ApiError),

    #[error("Failed to install the TLS crypto provider")]
    #[diagnostic(code(rtm_bridge::binary::crypto))]
    Crypto,
}

#[derive(Parser)]
#[command(name = "rtm-bridge")]
#[command(author, version, about = "Remember The Milk bridge for AI agents", long_about = None)]
struct Cli {
    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Increase log verbosity (ignored when RUST_LOG is set)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Serve OpenAPI docs at /docs
    #[arg(long)]
    docs: bool,

    /// Upstream REST endpoint (overrides RTM_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Minimum milliseconds between upstream calls (overrides RTM_MIN_INTERVAL_MS)
    #[arg(long)]
    min_interval_ms: Option<u64>,

    /// Run MCP endpoints without sessions (overrides RTM_BRIDGE_STATELESS)
    #[arg(long)]
    stateless: bool,
}

impl Cli {
    fn apply(&self, mut config: BridgeConfig) -> BridgeConfig {
        if let Some(url) = &self.api_url {
            config = config.with_api_url(url);
        }
        if let Some(ms) = self.min_interval_ms {
            config = config.with_min_interval(Duration::from_millis(ms));
        }
        if self.stateless {
            config = config.with_stateless(true);
        }
        config
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    run().await.map_err(Into::into)
}

async fn run() -> Result<(), BinaryError> {
    let cli = Cli::parse();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| BinaryError::Crypto)?;

    let bridge = cli.apply(BridgeConfig::new()?);
    let context = AppContext::new(&bridge);

    api::run(
        Config {
            host: cli.host,
            port: cli.port,
            verbosity: cli.verbose,
            enable_docs: cli.docs,
        },
        context,
    )
    .await?;

    Ok(())
}
