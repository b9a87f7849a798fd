use std::collections::HashMap;
use std::env;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue};
use serial_test::serial;

use crate::auth::{API_KEY_HEADER, AuthResolver, TokenStore};
use crate::config::{
    BridgeConfig, ConfigError, ENV_API_KEY, ENV_API_URL, ENV_BRIDGE_API_KEYS,
    ENV_BRIDGE_STATELESS, ENV_BRIDGE_TOKENS, ENV_MIN_INTERVAL_MS, ENV_SHARED_SECRET,
};
use crate::rtm::DEFAULT_API_URL;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name: &str| vars.get(name).cloned()
}

const CREDENTIALS: [(&str, &str); 2] = [(ENV_API_KEY, "key"), (ENV_SHARED_SECRET, "secret")];

#[test]
fn test_minimal_config_uses_defaults() {
    let config = BridgeConfig::from_lookup(lookup(&CREDENTIALS)).unwrap();

    assert_eq!(config.rtm.api_key, "key");
    assert_eq!(config.rtm.shared_secret, "secret");
    assert_eq!(config.rtm.api_url, DEFAULT_API_URL);
    assert_eq!(config.rtm.min_interval, Duration::from_millis(500));
    assert!(config.api_keys.is_empty());
    assert!(!config.stateless);
}

#[test]
fn test_missing_credentials() {
    let err = BridgeConfig::from_lookup(lookup(&[(ENV_API_KEY, "key")])).unwrap_err();
    assert_eq!(
        err,
        ConfigError::Missing {
            var: ENV_SHARED_SECRET
        }
    );

    // Blank counts as unset
    let err = BridgeConfig::from_lookup(lookup(&[(ENV_API_KEY, "  ")])).unwrap_err();
    assert_eq!(err, ConfigError::Missing { var: ENV_API_KEY });
}

#[test]
fn test_optional_values_are_parsed() {
    let mut vars = CREDENTIALS.to_vec();
    vars.extend([
        (ENV_API_URL, "http://localhost:1/rest/"),
        (ENV_MIN_INTERVAL_MS, "250"),
        (ENV_BRIDGE_API_KEYS, "k1=alice, k2=bob,"),
        (ENV_BRIDGE_TOKENS, "alice=tok-a"),
        (ENV_BRIDGE_STATELESS, "TRUE"),
    ]);
    let config = BridgeConfig::from_lookup(lookup(&vars)).unwrap();

    assert_eq!(config.rtm.api_url, "http://localhost:1/rest/");
    assert_eq!(config.rtm.min_interval, Duration::from_millis(250));
    assert_eq!(
        config.api_keys,
        vec![
            ("k1".to_string(), "alice".to_string()),
            ("k2".to_string(), "bob".to_string())
        ]
    );
    assert_eq!(config.tokens.len(), 1);
    assert!(config.stateless);
}

#[test]
fn test_invalid_values_are_rejected() {
    let mut vars = CREDENTIALS.to_vec();
    vars.push((ENV_MIN_INTERVAL_MS, "soon"));
    assert!(matches!(
        BridgeConfig::from_lookup(lookup(&vars)),
        Err(ConfigError::Invalid {
            var: ENV_MIN_INTERVAL_MS,
            ..
        })
    ));

    let mut vars = CREDENTIALS.to_vec();
    vars.push((ENV_BRIDGE_API_KEYS, "k1=alice,orphan"));
    let err = BridgeConfig::from_lookup(lookup(&vars)).unwrap_err();
    assert_eq!(
        err,
        ConfigError::InvalidPair {
            var: ENV_BRIDGE_API_KEYS,
            entry: "orphan".to_string()
        }
    );

    let mut vars = CREDENTIALS.to_vec();
    vars.push((ENV_BRIDGE_STATELESS, "maybe"));
    assert!(BridgeConfig::from_lookup(lookup(&vars)).is_err());
}

#[test]
fn test_builders_override_values() {
    let config = BridgeConfig::from_lookup(lookup(&CREDENTIALS))
        .unwrap()
        .with_api_url("http://127.0.0.1:9/")
        .with_min_interval(Duration::ZERO)
        .with_stateless(true);

    assert_eq!(config.rtm.api_url, "http://127.0.0.1:9/");
    assert_eq!(config.rtm.min_interval, Duration::ZERO);
    assert!(config.stateless);
}

#[test]
fn test_resolver_and_token_store_are_seeded() {
    let config = BridgeConfig::default()
        .with_api_key("k1", "alice")
        .with_token("alice", "tok-a");

    let mut headers = HeaderMap::new();
    headers.insert(API_KEY_HEADER, HeaderValue::from_static("k1"));
    assert_eq!(
        config.resolver().resolve_user(&headers),
        Some("alice".to_string())
    );
    assert_eq!(config.token_store().active_token("alice").unwrap(), "tok-a");
    assert!(config.token_store().active_token("bob").is_err());
}

#[test]
#[serial]
fn test_new_reads_process_environment() {
    unsafe {
        env::set_var(ENV_API_KEY, "env-key");
        env::set_var(ENV_SHARED_SECRET, "env-secret");
        env::set_var(ENV_BRIDGE_STATELESS, "1");
    }

    let config = BridgeConfig::new().unwrap();
    assert_eq!(config.rtm.api_key, "env-key");
    assert!(config.stateless);

    unsafe {
        env::remove_var(ENV_API_KEY);
        env::remove_var(ENV_SHARED_SECRET);
        env::remove_var(ENV_BRIDGE_STATELESS);
    }
}

#[test]
#[serial]
fn test_new_fails_without_environment() {
    unsafe {
        env::remove_var(ENV_API_KEY);
    }
    assert!(matches!(
        BridgeConfig::new(),
        Err(ConfigError::Missing { var: ENV_API_KEY })
    ));
}
