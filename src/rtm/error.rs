//! Upstream API error types.

use miette::Diagnostic;
use thiserror::Error;

/// Upstream error codes meaning the auth token is missing, invalid or revoked.
pub const INVALID_TOKEN_CODES: [u32; 2] = [98, 99];

/// Upstream error code for "service currently unavailable".
pub const SERVICE_UNAVAILABLE_CODE: u32 = 105;

/// How a caller should react to an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The stored token is no longer usable; the user must re-authorize.
    InvalidToken,
    /// Transient failure; the call may be retried later.
    Temporary,
    /// Anything else.
    Other,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::InvalidToken => "invalid_token",
            ErrorClass::Temporary => "temporary",
            ErrorClass::Other => "upstream",
        }
    }
}

/// Errors returned by [`RtmClient`](super::RtmClient).
#[derive(Error, Diagnostic, Debug)]
pub enum RtmError {
    #[error("RTM API error {code}: {message}")]
    #[diagnostic(code(rtm_bridge::rtm::api))]
    Api {
        code: u32,
        message: String,
        status: u16,
    },

    #[error("RTM API returned HTTP {status}")]
    #[diagnostic(code(rtm_bridge::rtm::http))]
    Http { status: u16, body: String },

    #[error("Invalid response from RTM API: {message}")]
    #[diagnostic(
        code(rtm_bridge::rtm::invalid_response),
        help("The upstream response did not contain a JSON `rsp` envelope.")
    )]
    InvalidResponse { message: String },

    #[error("Failed to reach RTM API")]
    #[diagnostic(code(rtm_bridge::rtm::request_failed))]
    Request {
        #[source]
        source: reqwest::Error,
    },
}

impl From<reqwest::Error> for RtmError {
    fn from(source: reqwest::Error) -> Self {
        RtmError::Request { source }
    }
}

impl RtmError {
    /// Upstream error code, when the API reported one.
    pub fn code(&self) -> Option<u32> {
        match self {
            RtmError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// HTTP status of the upstream response, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            RtmError::Api { status, .. } | RtmError::Http { status, .. } => Some(*status),
            RtmError::Request { source } => source.status().map(|s| s.as_u16()),
            RtmError::InvalidResponse { .. } => None,
        }
    }

    pub fn class(&self) -> ErrorClass {
        if self
            .code()
            .is_some_and(|code| INVALID_TOKEN_CODES.contains(&code))
        {
            return ErrorClass::InvalidToken;
        }
        if self.code() == Some(SERVICE_UNAVAILABLE_CODE)
            || matches!(self.status(), Some(503) | Some(429))
        {
            return ErrorClass::Temporary;
        }
        ErrorClass::Other
    }

    pub fn is_invalid_token(&self) -> bool {
        self.class() == ErrorClass::InvalidToken
    }

    pub fn is_temporary(&self) -> bool {
        self.class() == ErrorClass::Temporary
    }
}

/// Result type for upstream calls.
pub type RtmResult<T> = Result<T, RtmError>;
