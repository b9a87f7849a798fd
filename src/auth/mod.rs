//! Caller identity and upstream token lookup.
//!
//! Account linking and key management live outside this service; the bridge
//! only consumes two capabilities:
//!
//! - [`AuthResolver`]: map an incoming request to a user id
//! - [`TokenStore`]: fetch the user's active upstream token
//!
//! The in-memory implementations are seeded from configuration.

mod error;
mod memory;


use axum::http::HeaderMap;

#[cfg(test)]
use mockall::automock;

pub use error::{AuthError, AuthResult};
pub use memory::{CredentialResolver, MemoryTokenStore};

/// Header carrying a per-user API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Cookie carrying a dashboard session id.
pub const SESSION_COOKIE: &str = "rtm_session";

/// Identity attached to every message handed to the MCP handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    pub user_id: String,
}

/// Resolves the user behind an HTTP request.
#[cfg_attr(test, automock)]
pub trait AuthResolver: Send + Sync {
    /// Try the API-key header first, then the session cookie.
    fn resolve_user(&self, headers: &HeaderMap) -> Option<String>;
}

/// Looks up upstream tokens.
#[cfg_attr(test, automock)]
pub trait TokenStore: Send + Sync {
    /// Fails with [`AuthError::Unauthenticated`] when the user has no active token.
    fn active_token(&self, user_id: &str) -> AuthResult<String>;
}
