//! Bridge configuration
//!
//! Values come from environment variables and can be overridden with the
//! `with_*` builders (the binary applies CLI flags that way):
//!
//! | Variable | Meaning |
//! |---|---|
//! | `RTM_API_KEY` | upstream API key (required) |
//! | `RTM_SHARED_SECRET` | upstream shared secret (required) |
//! | `RTM_API_URL` | upstream REST endpoint |
//! | `RTM_MIN_INTERVAL_MS` | minimum spacing between upstream calls |
//! | `RTM_BRIDGE_API_KEYS` | `key=user,...` accepted API keys |
//! | `RTM_BRIDGE_SESSIONS` | `session=user,...` accepted session cookies |
//! | `RTM_BRIDGE_TOKENS` | `user=token,...` active upstream tokens |
//! | `RTM_BRIDGE_STATELESS` | `true` to run MCP endpoints without sessions |

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use crate::auth::{CredentialResolver, MemoryTokenStore};
use crate::rtm::RtmConfig;

pub const ENV_API_KEY: &str = "RTM_API_KEY";
pub const ENV_SHARED_SECRET: &str = "RTM_SHARED_SECRET";
pub const ENV_API_URL: &str = "RTM_API_URL";
pub const ENV_MIN_INTERVAL_MS: &str = "RTM_MIN_INTERVAL_MS";
pub const ENV_BRIDGE_API_KEYS: &str = "RTM_BRIDGE_API_KEYS";
pub const ENV_BRIDGE_SESSIONS: &str = "RTM_BRIDGE_SESSIONS";
pub const ENV_BRIDGE_TOKENS: &str = "RTM_BRIDGE_TOKENS";
pub const ENV_BRIDGE_STATELESS: &str = "RTM_BRIDGE_STATELESS";

#[derive(Error, Diagnostic, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {var}")]
    #[diagnostic(
        code(rtm_bridge::config::missing),
        help("Register an application at rememberthemilk.com/services/api/ to obtain a key and shared secret.")
    )]
    Missing { var: &'static str },

    #[error("Invalid value for {var}: '{value}'")]
    #[diagnostic(code(rtm_bridge::config::invalid))]
    Invalid { var: &'static str, value: String },

    #[error("Invalid entry '{entry}' in {var}, expected name=value")]
    #[diagnostic(
        code(rtm_bridge::config::invalid_pair),
        help("Use a comma separated list such as 'key1=alice,key2=bob'.")
    )]
    InvalidPair { var: &'static str, entry: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Everything needed to assemble an [`AppContext`](crate::context::AppContext).
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    pub rtm: RtmConfig,
    /// API key → user id.
    pub api_keys: Vec<(String, String)>,
    /// Session cookie → user id.
    pub sessions: Vec<(String, String)>,
    /// User id → upstream token.
    pub tokens: Vec<(String, String)>,
    pub stateless: bool,
}

impl BridgeConfig {
    /// Read configuration from the process environment.
    pub fn new() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, which returns the value of a
    /// variable or `None` when unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let get = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());
        let required = |var: &'static str| get(var).ok_or(ConfigError::Missing { var });

        let mut rtm = RtmConfig {
            api_key: required(ENV_API_KEY)?,
            shared_secret: required(ENV_SHARED_SECRET)?,
            ..RtmConfig::default()
        };
        if let Some(url) = get(ENV_API_URL) {
            rtm.api_url = url;
        }
        if let Some(value) = get(ENV_MIN_INTERVAL_MS) {
            let millis = value.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                var: ENV_MIN_INTERVAL_MS,
                value: value.clone(),
            })?;
            rtm.min_interval = Duration::from_millis(millis);
        }

        let stateless = match get(ENV_BRIDGE_STATELESS) {
            Some(value) => parse_bool(ENV_BRIDGE_STATELESS, &value)?,
            None => false,
        };

        Ok(Self {
            rtm,
            api_keys: parse_pairs(ENV_BRIDGE_API_KEYS, get(ENV_BRIDGE_API_KEYS).as_deref())?,
            sessions: parse_pairs(ENV_BRIDGE_SESSIONS, get(ENV_BRIDGE_SESSIONS).as_deref())?,
            tokens: parse_pairs(ENV_BRIDGE_TOKENS, get(ENV_BRIDGE_TOKENS).as_deref())?,
            stateless,
        })
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.rtm.api_url = url.into();
        self
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.rtm.min_interval = interval;
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.api_keys.push((key.into(), user_id.into()));
        self
    }

    pub fn with_token(mut self, user_id: impl Into<String>, token: impl Into<String>) -> Self {
        self.tokens.push((user_id.into(), token.into()));
        self
    }

    pub fn with_stateless(mut self, stateless: bool) -> Self {
        self.stateless = stateless;
        self
    }

    /// Credential resolver seeded with the configured keys and sessions.
    pub fn resolver(&self) -> CredentialResolver {
        let resolver = self
            .api_keys
            .iter()
            .fold(CredentialResolver::new(), |r, (key, user)| {
                r.with_api_key(key, user)
            });
        self.sessions
            .iter()
            .fold(resolver, |r, (session, user)| r.with_session(session, user))
    }

    /// Token store seeded with the configured tokens.
    pub fn token_store(&self) -> MemoryTokenStore {
        let store = MemoryTokenStore::new();
        for (user, token) in &self.tokens {
            store.set_token(user, token);
        }
        store
    }
}

fn parse_bool(var: &'static str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
        }),
    }
}

/// Parse `a=b,c=d` into pairs. Empty entries are skipped.
fn parse_pairs(var: &'static str, value: Option<&str>) -> ConfigResult<Vec<(String, String)>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((name, val)) if !name.trim().is_empty() && !val.trim().is_empty() => {
                Ok((name.trim().to_string(), val.trim().to_string()))
            }
            _ => Err(ConfigError::InvalidPair {
                var,
                entry: entry.to_string(),
            }),
        })
        .collect()
}
