//! Streamable HTTP transport for MCP.
//!
//! One [`StreamableHttpTransport`] terminates one MCP connection. It accepts
//! three HTTP methods on a single endpoint:
//!
//! - `GET` opens the standalone SSE stream for server-initiated messages
//! - `POST` submits one JSON-RPC message or a batch; replies come back as a
//!   JSON body or as an SSE stream, depending on the options
//! - `DELETE` terminates the session
//!
//! Inbound messages are handed to a [`MessageHandler`]. The handler answers
//! later through the [`Outbound`] handle in its [`MessageContext`]; the
//! transport routes each reply to the stream registered for its request id.
//!
//! All registries (session, streams, correlations) live behind one async
//! mutex owned by the transport.
//!
//! Events written to a shared [`EventStore`] are keyed by a random per-transport
//! scope, so a `Last-Event-Id` only resumes streams of the transport that
//! issued it.

mod error;
mod event_store;
mod session;
mod streams;


use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use axum::{
    Json,
    body::{Body, to_bytes},
    extract::Request,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::auth::AuthInfo;
use crate::mcp::jsonrpc::{JsonRpcMessage, RequestId, parse_batch};

pub use error::{TransportError, TransportResult};
pub use event_store::{DEFAULT_EVENT_CAPACITY, EventStore, InMemoryEventStore, Replay, StoredEvent};

use session::{Session, validate_protocol_version};
use streams::{JsonCollector, SseFrame, StreamEntry, StreamSink, sse_response};

pub type StreamId = String;

/// Stream id reserved for the standalone GET stream.
pub const STANDALONE_STREAM_ID: &str = "_GET_stream";

pub const SESSION_ID_HEADER: &str = "mcp-session-id";
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// Newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];

pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;
pub const DEFAULT_SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

const EVENT_STREAM: &str = "text/event-stream";
const APPLICATION_JSON: &str = "application/json";

pub type SessionIdGenerator = Arc<dyn Fn() -> String + Send + Sync>;
pub type SessionInitializedCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub type CloseCallback = Arc<dyn Fn(Option<&str>) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&TransportError) + Send + Sync>;

/// Receives every inbound JSON-RPC message.
///
/// Implementations must not block: start the work and reply later through
/// `context.outbound`.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, message: JsonRpcMessage, context: MessageContext);
}

/// Per-message context handed to the [`MessageHandler`].
#[derive(Clone)]
pub struct MessageContext {
    pub auth_info: Option<AuthInfo>,
    pub outbound: Outbound,
}

/// Send-capable handle back into the transport.
///
/// Holds only a weak reference: once the transport is dropped, sends are
/// silently discarded.
#[derive(Clone)]
pub struct Outbound {
    inner: Weak<Inner>,
}

impl Outbound {
    /// See [`StreamableHttpTransport::send`].
    pub async fn send(
        &self,
        message: JsonRpcMessage,
        related_request_id: Option<RequestId>,
    ) -> TransportResult<()> {
        match self.inner.upgrade() {
            Some(inner) => inner.send(message, related_request_id).await,
            None => {
                debug!("transport dropped, discarding outbound message");
                Ok(())
            }
        }
    }
}

/// Options for a [`StreamableHttpTransport`].
#[derive(Clone)]
pub struct TransportOptions {
    /// Generates session ids. `None` runs the transport stateless.
    pub session_id_generator: Option<SessionIdGenerator>,
    /// Answer POSTs with a single JSON body instead of an SSE stream.
    pub enable_json_response: bool,
    pub event_store: Option<Arc<dyn EventStore>>,
    pub on_session_initialized: Option<SessionInitializedCallback>,
    pub on_close: Option<CloseCallback>,
    pub on_error: Option<ErrorCallback>,
    pub sse_keep_alive: Option<Duration>,
    pub max_body_bytes: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            session_id_generator: None,
            enable_json_response: false,
            event_store: None,
            on_session_initialized: None,
            on_close: None,
            on_error: None,
            sse_keep_alive: Some(DEFAULT_SSE_KEEP_ALIVE),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl TransportOptions {
    /// Stateful options issuing random UUID session ids.
    pub fn stateful() -> Self {
        Self::default().with_session_id_generator(Arc::new(|| uuid::Uuid::new_v4().to_string()))
    }

    pub fn with_session_id_generator(mut self, generator: SessionIdGenerator) -> Self {
        self.session_id_generator = Some(generator);
        self
    }

    pub fn with_json_response(mut self, enabled: bool) -> Self {
        self.enable_json_response = enabled;
        self
    }

    pub fn with_event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.event_store = Some(store);
        self
    }

    pub fn with_on_session_initialized(mut self, callback: SessionInitializedCallback) -> Self {
        self.on_session_initialized = Some(callback);
        self
    }

    pub fn with_on_close(mut self, callback: CloseCallback) -> Self {
        self.on_close = Some(callback);
        self
    }

    pub fn with_on_error(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    pub fn with_sse_keep_alive(mut self, interval: Option<Duration>) -> Self {
        self.sse_keep_alive = interval;
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}

struct TransportState {
    session: Session,
    streams: HashMap<StreamId, StreamEntry>,
    correlations: HashMap<RequestId, StreamId>,
}

struct Inner {
    options: TransportOptions,
    handler: Arc<dyn MessageHandler>,
    state: Mutex<TransportState>,
    shutdown: CancellationToken,
    /// Prefix of every stream id handed to the event store.
    event_scope: String,
}

/// JSON-RPC over streamable HTTP, multiplexed onto one shared handler.
///
/// Cloning is cheap; clones share the same session.
#[derive(Clone)]
pub struct StreamableHttpTransport {
    inner: Arc<Inner>,
}

impl StreamableHttpTransport {
    pub fn new(handler: Arc<dyn MessageHandler>, options: TransportOptions) -> Self {
        let stateful = options.session_id_generator.is_some();
        Self {
            inner: Arc::new(Inner {
                options,
                handler,
                state: Mutex::new(TransportState {
                    session: Session::new(stateful),
                    streams: HashMap::new(),
                    correlations: HashMap::new(),
                }),
                shutdown: CancellationToken::new(),
                event_scope: uuid::Uuid::new_v4().to_string(),
            }),
        }
    }

    pub async fn session_id(&self) -> Option<String> {
        self.inner.state.lock().await.session.id.clone()
    }

    pub async fn is_initialized(&self) -> bool {
        self.inner.state.lock().await.session.initialized
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.state.lock().await.session.closed
    }

    pub fn outbound(&self) -> Outbound {
        Outbound {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Serve one HTTP request. Never fails: every rejection is rendered as a
    /// JSON-RPC error envelope with a matching status.
    pub async fn handle(&self, request: Request, auth_info: Option<AuthInfo>) -> Response {
        let method = request.method().clone();
        let result = match method {
            Method::GET => self.handle_get(request).await,
            Method::POST => self.handle_post(request, auth_info).await,
            Method::DELETE => self.handle_delete(request).await,
            _ => Err(TransportError::MethodNotAllowed),
        };

        result.unwrap_or_else(|err| {
            if matches!(
                err,
                TransportError::Parse { .. } | TransportError::Internal { .. }
            ) {
                self.inner.report_error(&err);
            }
            debug!(%method, status = %err.status(), error = %err, "rejected MCP request");
            err.into_response()
        })
    }

    /// Deliver a message produced by the handler.
    ///
    /// A response or error is routed by its own id, ignoring
    /// `related_request_id`. Other messages use `related_request_id` or, when
    /// absent, go to the standalone stream (dropped when none is open).
    pub async fn send(
        &self,
        message: JsonRpcMessage,
        related_request_id: Option<RequestId>,
    ) -> TransportResult<()> {
        self.inner.send(message, related_request_id).await
    }

    /// Release every stream and clear all registries. Idempotent.
    pub async fn close(&self) {
        self.inner.close().await;
    }

    #[instrument(skip_all)]
    async fn handle_get(&self, request: Request) -> TransportResult<Response> {
        if !accepts(request.headers(), EVENT_STREAM) {
            return Err(TransportError::NotAcceptable {
                expected: "Client must accept text/event-stream",
            });
        }

        let headers = request.headers();
        let mut state = self.inner.state.lock().await;
        state.session.validate(headers)?;
        validate_protocol_version(headers)?;
        let session_id = state.session.id.clone();

        if let Some(replayed) = self.replay(&mut state, headers) {
            return Ok(replayed);
        }

        if state.streams.contains_key(STANDALONE_STREAM_ID) {
            return Err(TransportError::Conflict);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state
            .streams
            .insert(STANDALONE_STREAM_ID.to_string(), StreamEntry::sse(tx.clone()));
        drop(state);

        self.inner.watch_stream(STANDALONE_STREAM_ID.to_string(), tx);
        debug!(session_id = ?session_id, "opened standalone SSE stream");
        Ok(sse_response(
            rx,
            self.inner.shutdown.clone(),
            self.inner.options.sse_keep_alive,
            session_id.as_deref(),
        ))
    }

    /// Reopen a stream from `Last-Event-Id`, resending what the peer missed.
    /// Returns `None` when replay is not configured, or the id is unknown or
    /// was issued by another transport.
    fn replay(&self, state: &mut TransportState, headers: &HeaderMap) -> Option<Response> {
        let store = self.inner.options.event_store.as_ref()?;
        let last_event_id = headers.get(LAST_EVENT_ID_HEADER)?.to_str().ok()?;
        let Some(replay) = store.replay_events_after(last_event_id) else {
            debug!(%last_event_id, "unknown Last-Event-Id, opening a fresh stream");
            return None;
        };
        let Some(stream_id) = self.inner.unscoped(&replay.stream_id) else {
            warn!(%last_event_id, "Last-Event-Id belongs to another session, opening a fresh stream");
            return None;
        };
        let stream_id = stream_id.to_string();

        let (tx, rx) = mpsc::unbounded_channel();
        for event in &replay.events {
            let Ok(data) = serde_json::to_string(&event.message) else {
                continue;
            };
            // The receiver is held right here, so this cannot fail.
            let _ = tx.send(SseFrame {
                event_id: Some(event.event_id.clone()),
                data,
            });
        }
        debug!(
            %stream_id,
            replayed = replay.events.len(),
            "resumed SSE stream"
        );
        state
            .streams
            .insert(stream_id.clone(), StreamEntry::sse(tx.clone()));
        self.inner.watch_stream(stream_id, tx);

        Some(sse_response(
            rx,
            self.inner.shutdown.clone(),
            self.inner.options.sse_keep_alive,
            state.session.id.as_deref(),
        ))
    }

    #[instrument(skip_all)]
    async fn handle_post(
        &self,
        request: Request,
        auth_info: Option<AuthInfo>,
    ) -> TransportResult<Response> {
        let json_mode = self.inner.options.enable_json_response;
        let headers = request.headers();
        let acceptable = if json_mode {
            accepts(headers, APPLICATION_JSON)
        } else {
            accepts(headers, APPLICATION_JSON) && accepts(headers, EVENT_STREAM)
        };
        if !acceptable {
            return Err(TransportError::NotAcceptable {
                expected: if json_mode {
                    "Client must accept application/json"
                } else {
                    "Client must accept both application/json and text/event-stream"
                },
            });
        }

        let is_json = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains(APPLICATION_JSON));
        if !is_json {
            return Err(TransportError::UnsupportedMediaType);
        }

        let (parts, body) = request.into_parts();
        let bytes = to_bytes(body, self.inner.options.max_body_bytes)
            .await
            .map_err(|e| TransportError::internal(format!("failed to read request body: {e}")))?;
        let messages = parse_batch(&bytes).map_err(|e| TransportError::Parse {
            detail: e.to_string(),
        })?;
        if messages.is_empty() {
            return Err(TransportError::invalid_request("Empty batch"));
        }

        let mut state = self.inner.state.lock().await;
        let mut initialized_id = None;
        if messages.iter().any(JsonRpcMessage::is_initialize_request) {
            let generator = self.inner.options.session_id_generator.clone();
            initialized_id = state
                .session
                .initialize(messages.len(), || generator.map(|generate| generate()))?;
            debug!(session_id = ?initialized_id, "session initialized");
        } else {
            state.session.validate(&parts.headers)?;
            validate_protocol_version(&parts.headers)?;
        }
        let session_id = state.session.id.clone();

        let request_ids: Vec<RequestId> = messages
            .iter()
            .filter(|message| message.is_request())
            .filter_map(|message| message.id().cloned())
            .collect();

        if request_ids.is_empty() {
            drop(state);
            self.inner.fire_initialized(initialized_id.as_deref());
            self.dispatch(messages, auth_info);
            return Ok(with_session_header(
                StatusCode::ACCEPTED.into_response(),
                session_id.as_deref(),
            ));
        }

        let stream_id = uuid::Uuid::new_v4().to_string();
        for id in &request_ids {
            state.correlations.insert(id.clone(), stream_id.clone());
        }

        if json_mode {
            let (tx, rx) = oneshot::channel();
            state.streams.insert(
                stream_id.clone(),
                StreamEntry::json(JsonCollector::new(request_ids, tx)),
            );
            drop(state);

            self.inner.fire_initialized(initialized_id.as_deref());
            self.dispatch(messages, auth_info);

            let body = rx.await.map_err(|_| {
                TransportError::internal("transport closed before all replies were delivered")
            })?;
            return Ok(with_session_header(
                Json(body).into_response(),
                session_id.as_deref(),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state
            .streams
            .insert(stream_id.clone(), StreamEntry::sse(tx.clone()));
        drop(state);

        self.inner.watch_stream(stream_id, tx);
        self.inner.fire_initialized(initialized_id.as_deref());
        self.dispatch(messages, auth_info);

        Ok(sse_response(
            rx,
            self.inner.shutdown.clone(),
            self.inner.options.sse_keep_alive,
            session_id.as_deref(),
        ))
    }

    #[instrument(skip_all)]
    async fn handle_delete(&self, request: Request) -> TransportResult<Response> {
        let session_id = {
            let state = self.inner.state.lock().await;
            state.session.validate(request.headers())?;
            validate_protocol_version(request.headers())?;
            state.session.id.clone()
        };
        self.close().await;
        Ok(with_session_header(
            (StatusCode::OK, Body::empty()).into_response(),
            session_id.as_deref(),
        ))
    }

    /// Hand a batch to the handler in array order.
    fn dispatch(&self, messages: Vec<JsonRpcMessage>, auth_info: Option<AuthInfo>) {
        let context = MessageContext {
            auth_info,
            outbound: self.outbound(),
        };
        for message in messages {
            self.inner.handler.on_message(message, context.clone());
        }
    }
}

impl Inner {
    async fn send(
        &self,
        message: JsonRpcMessage,
        related_request_id: Option<RequestId>,
    ) -> TransportResult<()> {
        let request_id = if message.is_reply() {
            message.id().cloned()
        } else {
            related_request_id
        };

        let mut state = self.state.lock().await;
        let Some(request_id) = request_id else {
            if message.is_reply() {
                return Err(TransportError::ResponseWithoutRequest);
            }
            return self.send_standalone(&state, &message);
        };

        let Some(stream_id) = state.correlations.get(&request_id).cloned() else {
            debug!(%request_id, "no stream correlated with request, dropping message");
            return Ok(());
        };

        let state = &mut *state;
        let Some(entry) = state.streams.get_mut(&stream_id) else {
            debug!(%request_id, %stream_id, "stream already closed, dropping message");
            if message.is_reply() {
                state.correlations.remove(&request_id);
            }
            return Ok(());
        };

        match &mut entry.sink {
            StreamSink::Sse(tx) => {
                let frame = self.frame(&stream_id, &message)?;
                if tx.send(frame).is_err() {
                    debug!(%stream_id, "SSE peer gone, dropping message");
                }
            }
            StreamSink::Json(collector) => {
                if !message.is_reply() {
                    debug!(%request_id, "JSON responses carry replies only, dropping message");
                    return Ok(());
                }
                if collector.is_abandoned() {
                    let ids = collector.request_ids().to_vec();
                    state.streams.remove(&stream_id);
                    for id in ids {
                        state.correlations.remove(&id);
                    }
                    debug!(%request_id, "HTTP response abandoned, dropping reply");
                    return Ok(());
                }
                if collector.deliver(request_id, message) {
                    let ids = collector.request_ids().to_vec();
                    state.streams.remove(&stream_id);
                    for id in ids {
                        state.correlations.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }

    fn send_standalone(
        &self,
        state: &TransportState,
        message: &JsonRpcMessage,
    ) -> TransportResult<()> {
        let Some(entry) = state.streams.get(STANDALONE_STREAM_ID) else {
            debug!(method = ?message.method(), "no standalone stream, dropping message");
            return Ok(());
        };
        if let StreamSink::Sse(tx) = &entry.sink {
            let frame = self.frame(STANDALONE_STREAM_ID, message)?;
            if tx.send(frame).is_err() {
                debug!("standalone SSE peer gone, dropping message");
            }
        }
        Ok(())
    }

    fn frame(&self, stream_id: &str, message: &JsonRpcMessage) -> TransportResult<SseFrame> {
        let data = serde_json::to_string(message)
            .map_err(|e| TransportError::internal(format!("failed to encode message: {e}")))?;
        let event_id = self
            .options
            .event_store
            .as_ref()
            .map(|store| store.store_event(&self.scoped(stream_id), message));
        Ok(SseFrame { event_id, data })
    }

    fn scoped(&self, stream_id: &str) -> String {
        format!("{}/{stream_id}", self.event_scope)
    }

    /// Local stream id of a stored stream, if this transport stored it.
    fn unscoped<'a>(&self, stored: &'a str) -> Option<&'a str> {
        stored
            .strip_prefix(self.event_scope.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }

    /// Deregister an SSE stream once its peer disconnects.
    fn watch_stream(self: &Arc<Self>, stream_id: StreamId, tx: mpsc::UnboundedSender<SseFrame>) {
        let inner = Arc::downgrade(self);
        tokio::spawn(async move {
            tx.closed().await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let mut state = inner.state.lock().await;
            let owned = state
                .streams
                .get(&stream_id)
                .is_some_and(|entry| entry.owns_channel(&tx));
            if owned {
                state.streams.remove(&stream_id);
                debug!(%stream_id, "SSE stream closed by peer");
            }
        });
    }

    async fn close(&self) {
        let session_id = {
            let mut state = self.state.lock().await;
            if state.session.closed {
                return;
            }
            state.session.closed = true;
            state.streams.clear();
            state.correlations.clear();
            state.session.id.clone()
        };
        self.shutdown.cancel();
        debug!(session_id = ?session_id, "transport closed");
        if let Some(on_close) = &self.options.on_close {
            on_close(session_id.as_deref());
        }
    }

    fn fire_initialized(&self, session_id: Option<&str>) {
        if let (Some(callback), Some(id)) = (&self.options.on_session_initialized, session_id) {
            callback(id);
        }
    }

    fn report_error(&self, err: &TransportError) {
        warn!(error = %err, "MCP transport error");
        if let Some(on_error) = &self.options.on_error {
            on_error(err);
        }
    }
}

/// Echo the session id on a session-bound response.
fn with_session_header(mut response: Response, session_id: Option<&str>) -> Response {
    if let Some(value) = session_id.and_then(|id| HeaderValue::from_str(id).ok()) {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    response
}

/// True when the `Accept` header lists `media_type`.
fn accepts(headers: &HeaderMap, media_type: &str) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains(media_type))
}
