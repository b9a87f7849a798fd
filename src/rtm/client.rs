//! Signed, rate-limited client for the RTM REST API.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::error::{RtmError, RtmResult};
use super::rate_limit::{DEFAULT_MIN_INTERVAL, RateLimiter};
use super::signature::api_sig;

/// Production REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.rememberthemilk.com/services/rest/";

/// REST API version requested on every call.
pub const API_VERSION: &str = "2";

/// Upstream API credentials and endpoint.
#[derive(Debug, Clone)]
pub struct RtmConfig {
    pub api_key: String,
    pub shared_secret: String,
    pub api_url: String,
    /// Minimum spacing between two calls.
    pub min_interval: Duration,
}

impl Default for RtmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            shared_secret: String::new(),
            api_url: DEFAULT_API_URL.to_string(),
            min_interval: DEFAULT_MIN_INTERVAL,
        }
    }
}

/// Client for the RTM REST API.
///
/// Every call waits on the shared [`RateLimiter`] before going out, so one
/// client instance must be shared by everything that talks to the API.
/// Failures are classified (see [`RtmError::class`]) but never retried here.
pub struct RtmClient {
    config: RtmConfig,
    http: Client,
    limiter: RateLimiter,
}

impl RtmClient {
    pub fn new(config: RtmConfig) -> Self {
        let limiter = RateLimiter::new(config.min_interval);
        Self {
            config,
            http: Client::new(),
            limiter,
        }
    }

    pub fn config(&self) -> &RtmConfig {
        &self.config
    }

    /// Build the full, signed parameter set for `method`.
    pub fn signed_params(
        &self,
        method: &str,
        params: &[(&str, &str)],
        auth_token: Option<&str>,
    ) -> BTreeMap<String, String> {
        let mut query: BTreeMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        query.insert("method".to_string(), method.to_string());
        query.insert("api_key".to_string(), self.config.api_key.clone());
        query.insert("format".to_string(), "json".to_string());
        query.insert("v".to_string(), API_VERSION.to_string());
        if let Some(token) = auth_token {
            query.insert("auth_token".to_string(), token.to_string());
        }

        let sig = api_sig(
            &self.config.shared_secret,
            query.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        );
        query.insert("api_sig".to_string(), sig);
        query
    }

    /// Call `method` and return the `rsp` object of a successful response.
    #[instrument(skip(self, params, auth_token))]
    pub async fn call(
        &self,
        method: &str,
        params: &[(&str, &str)],
        auth_token: Option<&str>,
    ) -> RtmResult<Value> {
        let query = self.signed_params(method, params, auth_token);

        self.limiter.wait().await;

        let response = self
            .http
            .get(&self.config.api_url)
            .query(&query)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), "RTM response received");

        parse_response(status.as_u16(), &body)
    }
}

/// Interpret an upstream response body.
pub(crate) fn parse_response(status: u16, body: &str) -> RtmResult<Value> {
    let success = (200..300).contains(&status);
    let rsp = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|mut value| value.get_mut("rsp").map(Value::take));

    let Some(rsp) = rsp else {
        if success {
            return Err(RtmError::InvalidResponse {
                message: "response is not an rsp envelope".to_string(),
            });
        }
        return Err(RtmError::Http {
            status,
            body: body.to_string(),
        });
    };

    match rsp.get("stat").and_then(Value::as_str) {
        Some("ok") if success => Ok(rsp),
        Some("fail") => {
            let err = rsp.get("err");
            let code = err
                .and_then(|e| e.get("code"))
                .and_then(|c| match c {
                    Value::String(s) => s.parse().ok(),
                    Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
                    _ => None,
                })
                .unwrap_or(0);
            let message = err
                .and_then(|e| e.get("msg"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            warn!(code, status, %message, "RTM call failed");
            Err(RtmError::Api {
                code,
                message,
                status,
            })
        }
        _ if !success => Err(RtmError::Http {
            status,
            body: body.to_string(),
        }),
        _ => Err(RtmError::InvalidResponse {
            message: "missing rsp.stat".to_string(),
        }),
    }
}
