use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::ALLOW},
    response::{IntoResponse, Response},
};
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

use crate::mcp::jsonrpc::{
    ErrorObject, INVALID_REQUEST, JsonRpcErrorResponse, JsonRpcVersion, PARSE_ERROR,
    TRANSPORT_ERROR,
};

/// Rejections produced by the streamable HTTP transport.
///
/// Every variant maps to an HTTP status and a JSON-RPC error envelope with
/// `id: null`.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Method not allowed.")]
    #[diagnostic(code(rtm_bridge::transport::method_not_allowed))]
    MethodNotAllowed,

    #[error("Not Acceptable: {expected}")]
    #[diagnostic(code(rtm_bridge::transport::not_acceptable))]
    NotAcceptable { expected: &'static str },

    #[error("Unsupported Media Type: Content-Type must be application/json")]
    #[diagnostic(code(rtm_bridge::transport::unsupported_media_type))]
    UnsupportedMediaType,

    #[error("Parse error")]
    #[diagnostic(code(rtm_bridge::transport::parse_error))]
    Parse { detail: String },

    #[error("Invalid Request: {message}")]
    #[diagnostic(code(rtm_bridge::transport::invalid_request))]
    InvalidRequest { message: String },

    #[error("Bad Request: {message}")]
    #[diagnostic(code(rtm_bridge::transport::bad_request))]
    BadRequest { message: String },

    #[error("Session not found")]
    #[diagnostic(
        code(rtm_bridge::transport::session_not_found),
        help("Start a new session with an initialize request.")
    )]
    SessionNotFound,

    #[error("Conflict: Only one SSE stream is allowed per session")]
    #[diagnostic(code(rtm_bridge::transport::conflict))]
    Conflict,

    #[error(
        "Cannot send a response on a standalone SSE stream unless resuming a previous client request"
    )]
    #[diagnostic(code(rtm_bridge::transport::response_without_request))]
    ResponseWithoutRequest,

    #[error("Internal transport error: {message}")]
    #[diagnostic(code(rtm_bridge::transport::internal))]
    Internal { message: String },
}

impl TransportError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        TransportError::BadRequest {
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        TransportError::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        TransportError::Internal {
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            TransportError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            TransportError::NotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
            TransportError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            TransportError::SessionNotFound => StatusCode::NOT_FOUND,
            TransportError::Conflict => StatusCode::CONFLICT,
            TransportError::Parse { .. }
            | TransportError::InvalidRequest { .. }
            | TransportError::BadRequest { .. }
            | TransportError::ResponseWithoutRequest
            | TransportError::Internal { .. } => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            TransportError::Parse { .. } | TransportError::Internal { .. } => PARSE_ERROR,
            TransportError::InvalidRequest { .. } => INVALID_REQUEST,
            _ => TRANSPORT_ERROR,
        }
    }

    /// JSON-RPC error envelope for this rejection.
    ///
    /// Internal failures are reported as a generic parse error so that no
    /// transport internals leak to the peer.
    pub fn envelope(&self) -> JsonRpcErrorResponse {
        let error = match self {
            TransportError::Parse { detail } => ErrorObject::new(PARSE_ERROR, self.to_string())
                .with_data(Value::String(detail.clone())),
            TransportError::Internal { .. } => ErrorObject::new(PARSE_ERROR, "Parse error"),
            other => ErrorObject::new(other.code(), other.to_string()),
        };
        JsonRpcErrorResponse {
            jsonrpc: JsonRpcVersion,
            error,
            id: None,
        }
    }
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.envelope())).into_response();
        if self == TransportError::MethodNotAllowed {
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, POST, DELETE"));
        }
        response
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
