//! HTTP request layer for the blog front end.
//!
//! # Overview
//! Every call the pages and stores make to the content API goes through
//! `RequestClient`. It gives each call the same treatment: a uniform
//! `{code, message, data}` envelope for success and failure, optional
//! bearer-token injection, optional duplicate coalescing (last request
//! wins), a bounded registry of cancelable requests, and a debounced global
//! loading indicator.
//!
//! # Design
//! - The network sits behind the `Transport` trait. `build_request` and
//!   `normalize_response` are pure, so request shaping and response
//!   interpretation are tested without I/O.
//! - Results are `Result<ResponseEnvelope<T>, ApiError>`; `ApiError::envelope`
//!   renders any failure in the envelope shape.
//! - Collaborators (token store, error display, loading display) are traits
//!   injected through `RequestClientBuilder`.
//! - Payload types are opaque: callers choose `T` and define their own DTOs.

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod fingerprint;
pub mod http;
pub mod loading;
pub mod notify;
pub mod query;
pub mod registry;
pub mod storage;

pub use client::{
    normalize_response, status_message, ApiResult, DeleteOptions, RequestClient,
    RequestClientBuilder, UploadPayload,
};
pub use config::{ClientConfig, RequestConfig, RequestOptions};
pub use envelope::ResponseEnvelope;
pub use error::{ApiError, ConfigError, StoreError, TransportError};
pub use fingerprint::generate_request_id;
pub use http::{
    FilePart, FormPart, HttpMethod, HttpRequest, HttpResponse, MultipartForm, RequestBody,
    ReqwestTransport, Transport,
};
pub use loading::{LoadingGuard, LoadingIndicator, LoadingSink, TracingLoadingSink};
pub use notify::{ErrorNotifier, TracingNotifier};
pub use storage::{FileStore, KeyValueStore, MemoryStore, TOKEN_KEY};
