//! Output channels registered with a transport.

use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;

use axum::{
    http::{HeaderName, HeaderValue, header::CACHE_CONTROL},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::{StreamExt, stream};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::mcp::jsonrpc::{JsonRpcMessage, RequestId};

use super::SESSION_ID_HEADER;

/// One SSE `message` event.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SseFrame {
    pub event_id: Option<String>,
    pub data: String,
}

impl SseFrame {
    fn into_event(self) -> Event {
        let event = Event::default().event("message").data(self.data);
        match self.event_id {
            Some(id) => event.id(id),
            None => event,
        }
    }
}

/// Where messages for a stream id end up.
pub(crate) enum StreamSink {
    Sse(mpsc::UnboundedSender<SseFrame>),
    Json(JsonCollector),
}

pub(crate) struct StreamEntry {
    pub sink: StreamSink,
}

impl StreamEntry {
    pub fn sse(tx: mpsc::UnboundedSender<SseFrame>) -> Self {
        Self {
            sink: StreamSink::Sse(tx),
        }
    }

    pub fn json(collector: JsonCollector) -> Self {
        Self {
            sink: StreamSink::Json(collector),
        }
    }

    /// True when this entry still owns the given SSE channel.
    pub fn owns_channel(&self, tx: &mpsc::UnboundedSender<SseFrame>) -> bool {
        matches!(&self.sink, StreamSink::Sse(own) if own.same_channel(tx))
    }
}

/// Gathers the replies of one POSTed batch and resolves the HTTP response
/// once every request in it has been answered.
pub(crate) struct JsonCollector {
    order: Vec<RequestId>,
    replies: HashMap<RequestId, JsonRpcMessage>,
    resolver: Option<oneshot::Sender<Value>>,
}

impl JsonCollector {
    pub fn new(order: Vec<RequestId>, resolver: oneshot::Sender<Value>) -> Self {
        Self {
            order,
            replies: HashMap::new(),
            resolver: Some(resolver),
        }
    }

    pub fn request_ids(&self) -> &[RequestId] {
        &self.order
    }

    /// The HTTP side stopped waiting (peer gone or transport closed).
    pub fn is_abandoned(&self) -> bool {
        self.resolver.as_ref().is_none_or(|tx| tx.is_closed())
    }

    /// Record a reply. Returns `true` once the batch is complete and the
    /// response has been resolved.
    pub fn deliver(&mut self, id: RequestId, reply: JsonRpcMessage) -> bool {
        self.replies.insert(id, reply);
        if !self.order.iter().all(|id| self.replies.contains_key(id)) {
            return false;
        }

        let mut replies: Vec<Value> = self
            .order
            .iter()
            .filter_map(|id| self.replies.remove(id))
            .filter_map(|reply| serde_json::to_value(reply).ok())
            .collect();
        let body = if replies.len() == 1 {
            replies.remove(0)
        } else {
            Value::Array(replies)
        };

        if let Some(resolver) = self.resolver.take() {
            // The receiver may already be gone; nothing left to do then.
            let _ = resolver.send(body);
        }
        true
    }
}

/// Build a `text/event-stream` response fed by `rx`. The stream ends when
/// every sender is dropped or `shutdown` fires.
pub(crate) fn sse_response(
    rx: mpsc::UnboundedReceiver<SseFrame>,
    shutdown: CancellationToken,
    keep_alive: Option<Duration>,
    session_id: Option<&str>,
) -> Response {
    let events = stream::unfold(rx, |mut rx| async move {
        let frame = rx.recv().await?;
        Some((Ok::<_, Infallible>(frame.into_event()), rx))
    })
    .take_until(shutdown.cancelled_owned());

    let sse = Sse::new(events);
    let mut response = match keep_alive {
        Some(interval) => sse
            .keep_alive(KeepAlive::new().interval(interval))
            .into_response(),
        None => sse.into_response(),
    };

    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    if let Some(value) = session_id.and_then(|id| HeaderValue::from_str(id).ok()) {
        headers.insert(SESSION_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn collector_resolves_single_reply_as_object() {
        let (tx, rx) = oneshot::channel();
        let mut collector = JsonCollector::new(vec![RequestId::Number(1)], tx);

        assert!(collector.deliver(
            RequestId::Number(1),
            JsonRpcMessage::response(RequestId::Number(1), json!({"ok": true})),
        ));
        let body = rx.await.unwrap();
        assert_eq!(body["id"], json!(1));
        assert_eq!(body["result"], json!({"ok": true}));
    }

    #[tokio::test]
    async fn collector_waits_for_whole_batch_and_keeps_order() {
        let (tx, rx) = oneshot::channel();
        let mut collector =
            JsonCollector::new(vec![RequestId::Number(1), RequestId::Number(2)], tx);

        assert!(!collector.deliver(
            RequestId::Number(2),
            JsonRpcMessage::response(RequestId::Number(2), json!("second")),
        ));
        assert!(collector.deliver(
            RequestId::Number(1),
            JsonRpcMessage::response(RequestId::Number(1), json!("first")),
        ));

        let body = rx.await.unwrap();
        assert_eq!(body[0]["result"], json!("first"));
        assert_eq!(body[1]["result"], json!("second"));
    }

    #[test]
    fn collector_notices_dropped_receiver() {
        let (tx, rx) = oneshot::channel();
        let collector = JsonCollector::new(vec![RequestId::Number(1)], tx);
        assert!(!collector.is_abandoned());
        drop(rx);
        assert!(collector.is_abandoned());
    }
}
