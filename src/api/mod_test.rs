use std::net::IpAddr;
use std::time::Duration;

use super::{ApiError, Config, DEFAULT_LOG_FILTER, VERBOSE_LOG_FILTER, log_filter, run};
use crate::config::BridgeConfig;
use crate::context::AppContext;
use crate::test_support::init_crypto;

fn context() -> AppContext {
    init_crypto();
    AppContext::new(&BridgeConfig::default().with_api_url("http://127.0.0.1:9/services/rest/"))
}

fn local_config(port: u16) -> Config {
    Config {
        host: IpAddr::from([127, 0, 0, 1]),
        port,
        ..Config::default()
    }
}

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.host, IpAddr::from([0, 0, 0, 0]));
    assert_eq!(config.port, 3000);
    assert_eq!(config.verbosity, 0);
    assert!(!config.enable_docs);
}

#[test]
fn test_log_filter_by_verbosity() {
    assert_eq!(log_filter(0), DEFAULT_LOG_FILTER);
    assert_eq!(log_filter(1), VERBOSE_LOG_FILTER);
    assert_eq!(log_filter(3), VERBOSE_LOG_FILTER);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_stops_on_shutdown_token() {
    let context = context();
    let token = context.shutdown_token();
    let server = tokio::spawn(run(local_config(0), context.clone()));

    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(result.is_ok());
    assert!(context.is_shutting_down());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_reports_bind_failure() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = taken.local_addr().unwrap().port();

    let err = run(local_config(port), context()).await.unwrap_err();
    assert!(matches!(err, ApiError::Bind { .. }));
}
