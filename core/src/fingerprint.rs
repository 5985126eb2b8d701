//! Deterministic request fingerprints for duplicate detection.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::http::{HttpMethod, RequestBody, MULTIPART_CONTENT_TYPE};

/// Hash `{method, url, params, body}` into a hex id.
///
/// Keys are serialized in sorted order, so logically equal parameter maps
/// produce the same id. Multipart bodies hash as a fixed placeholder: file
/// content is never compared.
pub fn generate_request_id(
    method: HttpMethod,
    url: &str,
    params: Option<&Value>,
    body: Option<&RequestBody>,
) -> String {
    let body = match body {
        None => Value::Null,
        Some(RequestBody::Json(value)) => value.clone(),
        Some(RequestBody::Multipart(_)) => Value::String(MULTIPART_CONTENT_TYPE.to_string()),
    };
    let canonical = json!({
        "method": method.as_str(),
        "url": url,
        "params": params.cloned().unwrap_or(Value::Null),
        "body": body,
    });
    hex::encode(Sha256::digest(canonical.to_string().as_bytes()))
}
