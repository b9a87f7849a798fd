//! In-memory credential and token stores.

use axum::http::{HeaderMap, header::COOKIE};
use dashmap::DashMap;
use tracing::debug;

use super::{API_KEY_HEADER, AuthError, AuthResolver, AuthResult, SESSION_COOKIE, TokenStore};

/// Resolves users from API keys and session cookies.
#[derive(Debug, Default)]
pub struct CredentialResolver {
    api_keys: DashMap<String, String>,
    sessions: DashMap<String, String>,
}

impl CredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(self, key: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.api_keys.insert(key.into(), user_id.into());
        self
    }

    pub fn with_session(self, session: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.sessions.insert(session.into(), user_id.into());
        self
    }

    fn user_for_api_key(&self, headers: &HeaderMap) -> Option<String> {
        let key = headers.get(API_KEY_HEADER)?.to_str().ok()?.trim();
        self.api_keys.get(key).map(|user| user.value().clone())
    }

    fn user_for_cookie(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .and_then(|(_, session)| self.sessions.get(session).map(|u| u.value().clone()))
    }
}

impl AuthResolver for CredentialResolver {
    fn resolve_user(&self, headers: &HeaderMap) -> Option<String> {
        let user = self
            .user_for_api_key(headers)
            .or_else(|| self.user_for_cookie(headers));
        if user.is_none() {
            debug!("request carried no known credential");
        }
        user
    }
}

/// Active upstream tokens keyed by user id.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: DashMap<String, String>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_token(&self, user_id: impl Into<String>, token: impl Into<String>) {
        self.tokens.insert(user_id.into(), token.into());
    }

    /// Forget the token of `user_id`. Lookups fail as unauthenticated until a
    /// new token is set.
    pub fn revoke(&self, user_id: &str) {
        self.tokens.remove(user_id);
    }
}

impl TokenStore for MemoryTokenStore {
    fn active_token(&self, user_id: &str) -> AuthResult<String> {
        self.tokens
            .get(user_id)
            .map(|token| token.value().clone())
            .ok_or_else(|| AuthError::Unauthenticated {
                user_id: user_id.to_string(),
            })
    }
}
