//! Direct REST wrapper around the upstream API.

use std::collections::BTreeMap;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::Serialize;
use serde_json::Value;
use tracing::{instrument, warn};
use utoipa::ToSchema;

use crate::context::AppContext;
use crate::rtm::{ErrorClass, RtmError};

/// Namespace every forwarded method must belong to.
pub const METHOD_PREFIX: &str = "rtm.";

/// Error response DTO
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error kind: `unauthorized`, `bad_request`, `invalid_token`, `temporary` or `upstream`
    #[schema(example = "invalid_token")]
    pub error: String,
    /// Human readable message
    #[schema(example = "RTM API error 98: Login failed / Invalid auth token")]
    pub message: String,
    /// Upstream error code, when the API reported one
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = 98)]
    pub code: Option<u32>,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, kind: &str, message: impl Into<String>) -> HandlerError {
    (
        status,
        Json(ErrorResponse {
            error: kind.to_string(),
            message: message.into(),
            code: None,
        }),
    )
}

impl From<RtmError> for ErrorResponse {
    fn from(err: RtmError) -> Self {
        Self {
            error: err.class().as_str().to_string(),
            message: err.to_string(),
            code: err.code(),
        }
    }
}

fn upstream_status(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::InvalidToken => StatusCode::UNAUTHORIZED,
        ErrorClass::Temporary => StatusCode::SERVICE_UNAVAILABLE,
        ErrorClass::Other => StatusCode::BAD_GATEWAY,
    }
}

/// Call an upstream API method
///
/// Forwards the string parameters of the request body to `method`, signed with
/// the caller's active token, and returns the upstream `rsp` object.
#[utoipa::path(
    post,
    path = "/api/v1/rtm/{method}",
    tag = "rtm",
    params(
        ("method" = String, Path, description = "Upstream method name, e.g. rtm.tasks.getList")
    ),
    request_body(content = BTreeMap<String, String>, description = "Method parameters", content_type = "application/json"),
    responses(
        (status = 200, description = "Upstream rsp object"),
        (status = 400, description = "Invalid method or parameters", body = ErrorResponse),
        (status = 401, description = "Missing credentials or invalid upstream token", body = ErrorResponse),
        (status = 502, description = "Upstream failure", body = ErrorResponse),
        (status = 503, description = "Upstream temporarily unavailable", body = ErrorResponse)
    )
)]
#[instrument(skip(context, headers, body))]
pub async fn call_method(
    State(context): State<AppContext>,
    Path(method): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, HandlerError> {
    let user_id = context.auth().resolve_user(&headers).ok_or_else(|| {
        error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid credentials",
        )
    })?;

    let token = context
        .tokens()
        .active_token(&user_id)
        .map_err(|e| error(StatusCode::UNAUTHORIZED, "invalid_token", e.to_string()))?;

    if !method.starts_with(METHOD_PREFIX) || method.len() == METHOD_PREFIX.len() {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "bad_request",
            format!("method must start with '{METHOD_PREFIX}'"),
        ));
    }

    let params: BTreeMap<String, String> = if body.iter().all(u8::is_ascii_whitespace) {
        BTreeMap::new()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            error(
                StatusCode::BAD_REQUEST,
                "bad_request",
                format!("body must be a JSON object of string values: {e}"),
            )
        })?
    };
    let params: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    match context.client().call(&method, &params, Some(&token)).await {
        Ok(rsp) => Ok(Json(rsp)),
        Err(err) => {
            let status = upstream_status(err.class());
            warn!(%user_id, %method, status = status.as_u16(), error = %err, "upstream call failed");
            Err((status, Json(ErrorResponse::from(err))))
        }
    }
}
