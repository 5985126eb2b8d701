//! Error types for the request layer.
//!
//! # Design
//! Every failure a caller can observe is an `ApiError`, and every `ApiError`
//! can be rendered as the same `{code, message, data}` envelope the backend
//! uses for success. Callers pattern-match on the variant when they care
//! about the class of failure and use `envelope()` when they only need the
//! uniform shape.

use serde_json::Value;
use thiserror::Error;

use crate::envelope::ResponseEnvelope;

/// Code used for failures that did not come from the server.
pub const CLIENT_ERROR_CODE: i64 = -1;

pub const CANCELED_MESSAGE: &str = "request canceled";
pub const NETWORK_MESSAGE: &str = "request timed out, check network connection";
pub const MISSING_DELETE_TARGET: &str = "must supply id or ids";
pub const MALFORMED_BODY_MESSAGE: &str = "malformed response body";

/// Failures returned by `RequestClient`.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport succeeded but the body carried a code other than 200 or 401.
    #[error("business error {code}: {message}")]
    Business { code: i64, message: String },

    /// The body carried code 401; the stored token has been cleared.
    #[error("session expired: {message}")]
    AuthExpired { message: String },

    /// Superseded by a duplicate, evicted for capacity, or canceled by a caller.
    #[error("request canceled: {reason}")]
    Canceled { reason: String },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        body: Option<Value>,
    },

    /// No response was received.
    #[error("network error: {source}")]
    Network {
        #[source]
        source: TransportError,
    },

    /// The call was rejected before anything was sent.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// A 2xx body that is not an envelope, or `data` of the wrong shape.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn code(&self) -> i64 {
        match self {
            ApiError::Business { code, .. } => *code,
            ApiError::AuthExpired { .. } => 401,
            ApiError::Http { status, .. } => i64::from(*status),
            ApiError::Canceled { .. }
            | ApiError::Network { .. }
            | ApiError::InvalidRequest { .. }
            | ApiError::Decode(_) => CLIENT_ERROR_CODE,
        }
    }

    /// The message carried in the envelope, suitable for display.
    pub fn message(&self) -> &str {
        match self {
            ApiError::Business { message, .. }
            | ApiError::AuthExpired { message }
            | ApiError::Http { message, .. }
            | ApiError::InvalidRequest { message } => message,
            ApiError::Canceled { .. } => CANCELED_MESSAGE,
            ApiError::Network { .. } => NETWORK_MESSAGE,
            ApiError::Decode(_) => MALFORMED_BODY_MESSAGE,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, ApiError::Canceled { .. })
    }

    pub fn envelope(&self) -> ResponseEnvelope<Value> {
        let data = match self {
            ApiError::Http { body, .. } => body.clone(),
            _ => None,
        };
        ResponseEnvelope {
            code: self.code(),
            message: self.message().to_string(),
            data,
        }
    }
}

/// Failures where the transport got no HTTP response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),
}

/// Invalid client configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Token storage failures. Logged by the client, never surfaced to callers.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}
