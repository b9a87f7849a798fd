//! Remember The Milk bridge for AI agents.
//!
//! Exposes the upstream task API through a REST wrapper and through the
//! Model Context Protocol over streamable HTTP.

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod mcp;
pub mod rtm;

#[cfg(test)]
mod config_test;
#[cfg(test)]
mod test_support;
