//! The wire envelope shared by every backend response.
//!
//! The backend wraps all payloads as `{code, message, data}`. `code == 200`
//! is the only success code and `code == 401` signals an expired session.
//! Payload types (articles, categories, tags) are opaque to this crate:
//! callers pick `T` and the envelope decodes `data` into it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

pub const SUCCESS_CODE: i64 = 200;
pub const AUTH_EXPIRED_CODE: i64 = 401;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope<T = Value> {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<T>,
}

impl ResponseEnvelope<Value> {
    /// Decode `data` into the caller's payload type.
    ///
    /// A JSON `null` payload decodes as `None` rather than failing, so
    /// endpoints that answer with no data work for any `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<ResponseEnvelope<T>, ApiError> {
        let data = match self.data {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))?,
            ),
        };
        Ok(ResponseEnvelope {
            code: self.code,
            message: self.message,
            data,
        })
    }
}

impl<T> ResponseEnvelope<T> {
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}
