//! Shared helpers for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{Json, Router, extract::Query, extract::State, routing::get};
use serde_json::{Value, json};

use crate::rtm::{RtmClient, RtmConfig};

/// Install the rustls crypto provider reqwest needs.
pub fn init_crypto() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Query strings received by a fake upstream.
pub type Received = Arc<Mutex<Vec<HashMap<String, String>>>>;

/// Canned response for a given `method` parameter.
pub type Responder = Arc<dyn Fn(&str) -> (u16, Value) + Send + Sync>;

#[derive(Clone)]
struct FakeRtm {
    received: Received,
    responder: Responder,
}

async fn fake_rest(
    State(fake): State<FakeRtm>,
    Query(query): Query<HashMap<String, String>>,
) -> (axum::http::StatusCode, Json<Value>) {
    let method = query.get("method").cloned().unwrap_or_default();
    fake.received.lock().unwrap().push(query);
    let (status, body) = (fake.responder)(&method);
    (
        axum::http::StatusCode::from_u16(status).unwrap(),
        Json(body),
    )
}

/// Default upstream behaviour: every method succeeds and echoes its name.
pub fn ok_responder() -> Responder {
    Arc::new(|method| (200, json!({"rsp": {"stat": "ok", "method": method}})))
}

/// Start a fake RTM REST endpoint on an ephemeral port.
///
/// Returns the endpoint URL and the log of received query strings.
pub async fn spawn_fake_rtm(responder: Responder) -> (String, Received) {
    let received: Received = Arc::default();
    let app = Router::new()
        .route("/services/rest/", get(fake_rest))
        .with_state(FakeRtm {
            received: Arc::clone(&received),
            responder,
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/services/rest/", addr), received)
}

/// Client pointed at `api_url` with test credentials and a short interval.
pub fn test_client(api_url: &str) -> RtmClient {
    init_crypto();
    RtmClient::new(RtmConfig {
        api_key: "test-key".to_string(),
        shared_secret: "test-secret".to_string(),
        api_url: api_url.to_string(),
        min_interval: Duration::from_millis(10),
    })
}
