//! Upstream Remember The Milk API client.
//!
//! - **client**: signed REST calls, response envelope parsing
//! - **rate_limit**: minimum spacing between calls
//! - **signature**: `api_sig` computation
//! - **error**: typed upstream failures and their classification

mod client;
mod error;
pub mod rate_limit;
pub mod signature;

#[cfg(test)]
mod client_test;
#[cfg(test)]
mod rate_limit_test;

pub use client::{API_VERSION, DEFAULT_API_URL, RtmClient, RtmConfig};
pub use error::{ErrorClass, RtmError, RtmResult};
pub use rate_limit::RateLimiter;
