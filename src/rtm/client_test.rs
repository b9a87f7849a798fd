//! Tests for the RTM REST client.

use std::sync::Arc;

use serde_json::json;

use crate::rtm::client::parse_response;
use crate::rtm::signature::api_sig;
use crate::rtm::{API_VERSION, ErrorClass, RtmError};
use crate::test_support::{ok_responder, spawn_fake_rtm, test_client};

#[test]
fn signed_params_include_protocol_fields() {
    let client = test_client("http://localhost:1/services/rest/");
    let params = client.signed_params("rtm.tasks.getList", &[("list_id", "42")], Some("tok"));

    assert_eq!(params["method"], "rtm.tasks.getList");
    assert_eq!(params["api_key"], "test-key");
    assert_eq!(params["format"], "json");
    assert_eq!(params["v"], API_VERSION);
    assert_eq!(params["auth_token"], "tok");
    assert_eq!(params["list_id"], "42");

    let unsigned: Vec<(&str, &str)> = params
        .iter()
        .filter(|(k, _)| k.as_str() != "api_sig")
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    assert_eq!(params["api_sig"], api_sig("test-secret", unsigned));
}

#[test]
fn signed_params_omit_token_when_absent() {
    let client = test_client("http://localhost:1/services/rest/");
    let params = client.signed_params("rtm.auth.getFrob", &[], None);
    assert!(!params.contains_key("auth_token"));
}

#[test]
fn parse_ok_response_returns_rsp() {
    let rsp = parse_response(200, r#"{"rsp":{"stat":"ok","lists":{"list":[]}}}"#).unwrap();
    assert_eq!(rsp["stat"], "ok");
    assert!(rsp["lists"]["list"].as_array().unwrap().is_empty());
}

#[test]
fn parse_fail_response_carries_code_and_status() {
    let err = parse_response(
        200,
        r#"{"rsp":{"stat":"fail","err":{"code":"98","msg":"Login failed / Invalid auth token"}}}"#,
    )
    .unwrap_err();

    match &err {
        RtmError::Api {
            code,
            message,
            status,
        } => {
            assert_eq!(*code, 98);
            assert_eq!(message, "Login failed / Invalid auth token");
            assert_eq!(*status, 200);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.class(), ErrorClass::InvalidToken);
}

#[test]
fn parse_non_json_error_status_is_http_error() {
    let err = parse_response(503, "<html>down</html>").unwrap_err();
    assert!(matches!(err, RtmError::Http { status: 503, .. }));
    assert!(err.is_temporary());
}

#[test]
fn parse_non_envelope_success_is_invalid_response() {
    let err = parse_response(200, r#"{"hello":"world"}"#).unwrap_err();
    assert!(matches!(err, RtmError::InvalidResponse { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn call_sends_signed_query_and_returns_rsp() {
    let (url, received) = spawn_fake_rtm(ok_responder()).await;
    let client = test_client(&url);

    let rsp = client
        .call("rtm.lists.getList", &[], Some("user-token"))
        .await
        .unwrap();

    assert_eq!(rsp["method"], "rtm.lists.getList");

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    let query = &received[0];
    assert_eq!(query["auth_token"], "user-token");
    assert_eq!(query["api_key"], "test-key");
    assert_eq!(query["api_sig"].len(), 32);
}

#[tokio::test(flavor = "multi_thread")]
async fn call_surfaces_upstream_failure() {
    let (url, _) = spawn_fake_rtm(Arc::new(|_| {
        (
            200,
            json!({"rsp": {"stat": "fail", "err": {"code": "105", "msg": "Service currently unavailable"}}}),
        )
    }))
    .await;
    let client = test_client(&url);

    let err = client.call("rtm.lists.getList", &[], Some("t")).await.unwrap_err();
    assert_eq!(err.code(), Some(105));
    assert!(err.is_temporary());
}

#[tokio::test(flavor = "multi_thread")]
async fn call_classifies_throttling_status() {
    let (url, _) = spawn_fake_rtm(Arc::new(|_| (429, json!({"message": "slow down"})))).await;
    let client = test_client(&url);

    let err = client.call("rtm.lists.getList", &[], Some("t")).await.unwrap_err();
    assert!(matches!(err, RtmError::Http { status: 429, .. }));
    assert_eq!(err.class(), ErrorClass::Temporary);
}
