//! Per-transport session state and header validation.

use axum::http::HeaderMap;

use super::error::{TransportError, TransportResult};
use super::{PROTOCOL_VERSION_HEADER, SESSION_ID_HEADER, SUPPORTED_PROTOCOL_VERSIONS};

/// Lifecycle: uninitialized → initialized → closed. Closing is reachable
/// from any state and is terminal.
#[derive(Debug, Default)]
pub(crate) struct Session {
    pub id: Option<String>,
    pub initialized: bool,
    pub closed: bool,
    /// False when no session id generator is configured.
    pub stateful: bool,
}

impl Session {
    pub fn new(stateful: bool) -> Self {
        Self {
            stateful,
            ..Default::default()
        }
    }

    /// Accept an initialization batch and assign the session id.
    pub fn initialize(
        &mut self,
        batch_len: usize,
        generate_id: impl FnOnce() -> Option<String>,
    ) -> TransportResult<Option<String>> {
        if self.closed {
            return Err(TransportError::SessionNotFound);
        }
        if self.initialized {
            return Err(TransportError::invalid_request("Server already initialized"));
        }
        if batch_len > 1 {
            return Err(TransportError::invalid_request(
                "Only one initialization request is allowed",
            ));
        }
        self.id = generate_id();
        self.initialized = true;
        Ok(self.id.clone())
    }

    /// Check the `Mcp-Session-Id` header of a non-initialization request.
    pub fn validate(&self, headers: &HeaderMap) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::SessionNotFound);
        }
        if !self.stateful {
            return Ok(());
        }
        if !self.initialized {
            return Err(TransportError::bad_request("Server not initialized"));
        }

        let mut values = headers.get_all(SESSION_ID_HEADER).iter();
        let Some(value) = values.next() else {
            return Err(TransportError::bad_request(
                "Mcp-Session-Id header is required",
            ));
        };
        if values.next().is_some() {
            return Err(TransportError::bad_request(
                "Mcp-Session-Id header must be a single value",
            ));
        }

        match (value.to_str().ok(), self.id.as_deref()) {
            (Some(given), Some(current)) if given == current => Ok(()),
            _ => Err(TransportError::SessionNotFound),
        }
    }
}

/// Reject requests that name a protocol revision this server does not speak.
/// A missing header is accepted.
pub(crate) fn validate_protocol_version(headers: &HeaderMap) -> TransportResult<()> {
    let Some(value) = headers.get(PROTOCOL_VERSION_HEADER) else {
        return Ok(());
    };
    let supported = value
        .to_str()
        .map(|version| SUPPORTED_PROTOCOL_VERSIONS.contains(&version.trim()))
        .unwrap_or(false);
    if supported {
        Ok(())
    } else {
        Err(TransportError::bad_request(format!(
            "Unsupported protocol version (supported versions: {})",
            SUPPORTED_PROTOCOL_VERSIONS.join(", ")
        )))
    }
}
