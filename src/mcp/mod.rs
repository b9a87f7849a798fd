//! Model Context Protocol (MCP) over streamable HTTP
//!
//! - **jsonrpc**: JSON-RPC 2.0 message model
//! - **transport**: per-session HTTP state machine (sessions, streams,
//!   request correlation)
//! - **server**: the protocol handler shared by all sessions
//! - **tools**: read-only tools forwarding to the upstream API
//! - **service**: per-endpoint session registry and axum routes

pub mod jsonrpc;
pub mod server;
mod service;
pub mod tools;
pub mod transport;


pub use server::McpServer;
pub use service::{McpEndpoint, McpEndpointConfig, create_mcp_router};
