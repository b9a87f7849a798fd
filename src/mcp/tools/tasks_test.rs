//! Tests for the task MCP tools

use std::sync::Arc;

use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::RawContent;
use serde_json::{Value, json};

use crate::mcp::tools::{GetTasksParams, TaskTools};
use crate::test_support::{ok_responder, spawn_fake_rtm, test_client};

fn text_of(result: &rmcp::model::CallToolResult) -> Value {
    match &result.content[0].raw {
        RawContent::Text(text) => serde_json::from_str(&text.text).unwrap(),
        _ => panic!("Expected text content"),
    }
}

#[test]
fn test_definitions_list_all_tools() {
    let tools = TaskTools::definitions();
    let names: Vec<&str> = tools.iter().map(|t| &*t.name).collect();
    assert_eq!(names, vec!["check_token", "get_lists", "get_tasks"]);

    let get_tasks = tools.iter().find(|t| t.name == "get_tasks").unwrap();
    let properties = get_tasks.input_schema.get("properties").unwrap();
    assert!(properties.get("list_id").is_some());
    assert!(properties.get("filter").is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_tasks_forwards_filter_and_token() {
    let (url, received) = spawn_fake_rtm(ok_responder()).await;
    let tools = TaskTools::new(Arc::new(test_client(&url)), "tok-alice");

    let params = GetTasksParams {
        list_id: Some("42".to_string()),
        filter: Some("status:incomplete".to_string()),
    };
    let result = tools
        .get_tasks(Parameters(params))
        .await
        .expect("get_tasks should succeed");

    assert_ne!(result.is_error, Some(true));
    assert_eq!(text_of(&result)["method"], "rtm.tasks.getList");

    let query = received.lock().unwrap()[0].clone();
    assert_eq!(query["list_id"], "42");
    assert_eq!(query["filter"], "status:incomplete");
    assert_eq!(query["auth_token"], "tok-alice");
    assert!(query.contains_key("api_sig"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_lists_omits_optional_params() {
    let (url, received) = spawn_fake_rtm(ok_responder()).await;
    let tools = TaskTools::new(Arc::new(test_client(&url)), "tok");

    let result = tools.call("get_lists", None).await.unwrap();
    assert_eq!(text_of(&result)["method"], "rtm.lists.getList");

    let query = received.lock().unwrap()[0].clone();
    assert!(!query.contains_key("list_id"));
    assert!(!query.contains_key("filter"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_token_becomes_tool_error() {
    let responder = Arc::new(|_: &str| {
        (
            200,
            json!({"rsp": {"stat": "fail", "err": {"code": "98", "msg": "Login failed / Invalid auth token"}}}),
        )
    });
    let (url, _) = spawn_fake_rtm(responder).await;
    let tools = TaskTools::new(Arc::new(test_client(&url)), "stale");

    let result = tools.call("check_token", None).await.unwrap();
    assert_eq!(result.is_error, Some(true));
    let payload = text_of(&result);
    assert_eq!(payload["error"], "invalid_token");
    assert_eq!(payload["code"], 98);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_temporary_failure_is_classified() {
    let responder = Arc::new(|_: &str| (503, json!({"message": "try later"})));
    let (url, _) = spawn_fake_rtm(responder).await;
    let tools = TaskTools::new(Arc::new(test_client(&url)), "tok");

    let result = tools.call("get_lists", None).await.unwrap();
    assert_eq!(result.is_error, Some(true));
    assert_eq!(text_of(&result)["error"], "temporary");
}

#[tokio::test]
async fn test_unknown_tool_and_bad_arguments_are_invalid_params() {
    let tools = TaskTools::new(Arc::new(test_client("http://127.0.0.1:9/")), "tok");

    let err = tools.call("add_task", None).await.unwrap_err();
    assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);

    let err = tools
        .call("get_tasks", Some(json!({"list_id": 7})))
        .await
        .unwrap_err();
    assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
}
