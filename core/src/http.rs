//! HTTP transport types and the transport seam.
//!
//! # Design
//! Requests and responses are described as plain data. `RequestClient`
//! builds an `HttpRequest`, hands it to a `Transport`, and interprets the
//! `HttpResponse` that comes back. The transport never interprets status
//! codes or bodies: any HTTP status is returned as data, and only the
//! "no response at all" conditions (timeout, connection failure) are errors.
//! Tests swap in scripted transports; production uses `ReqwestTransport`.
//!
//! All fields use owned types (`String`, `Vec`) so requests can be recorded,
//! cloned and compared freely.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;

pub const CONTENT_TYPE: &str = "content-type";
pub const AUTHORIZATION: &str = "authorization";
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/form-data";

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// A single part of a multipart payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPart {
    Text { name: String, value: String },
    File { name: String, file: FilePart },
}

/// Raw file content to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FilePart {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Ordered multipart payload. Parts are sent in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    parts: Vec<FormPart>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_text(name, value);
        self
    }

    pub fn file(mut self, name: impl Into<String>, file: FilePart) -> Self {
        self.parts.push(FormPart::File {
            name: name.into(),
            file,
        });
        self
    }

    pub fn push_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parts.push(FormPart::Text {
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Multipart(MultipartForm),
}

/// An HTTP request described as plain data.
///
/// `url` is the absolute address without a query string; `query` holds the
/// decoded pairs in send order, so `ids=1&ids=2` is two entries with the same
/// key.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes one HTTP round-trip.
///
/// Implementations must return every HTTP status as `Ok`; `Err` is reserved
/// for failures where no response was received.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}

/// Case-insensitive header lookup.
pub fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Insert or replace a header, matching names case-insensitively.
pub fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: impl Into<String>) {
    let value = value.into();
    match headers
        .iter_mut()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
    {
        Some(entry) => entry.1 = value,
        None => headers.push((name.to_ascii_lowercase(), value)),
    }
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };
        let is_multipart = matches!(request.body, Some(RequestBody::Multipart(_)));

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(timeout)
            .query(&request.query);
        for (name, value) in &request.headers {
            // reqwest writes its own boundary-carrying content type for forms.
            if is_multipart && name.eq_ignore_ascii_case(CONTENT_TYPE) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            Some(RequestBody::Json(value)) => builder.body(value.to_string()),
            Some(RequestBody::Multipart(form)) => builder.multipart(into_reqwest_form(form)?),
            None => builder,
        };

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn into_reqwest_form(form: MultipartForm) -> Result<reqwest::multipart::Form, TransportError> {
    let mut out = reqwest::multipart::Form::new();
    for part in form.parts {
        out = match part {
            FormPart::Text { name, value } => out.text(name, value),
            FormPart::File { name, file } => {
                let mut part = reqwest::multipart::Part::bytes(file.bytes).file_name(file.file_name);
                if let Some(mime) = file.content_type {
                    part = part
                        .mime_str(&mime)
                        .map_err(|e| TransportError::Connect(format!("invalid content type: {e}")))?;
                }
                out.part(name, part)
            }
        };
    }
    Ok(out)
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Connect(err.to_string())
    }
}
