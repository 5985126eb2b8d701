//! The request client: single entry point for all outbound API calls.
//!
//! # Design
//! `RequestClient` is a cheap `Clone` handle over shared state: the pending
//! registry, the loading indicator and the injected collaborators. Every
//! verb funnels into `request`, which runs the same dispatch sequence:
//!
//! 1. `build_request` attaches default and per-call headers and, when asked
//!    for, the bearer token.
//! 2. Duplicate-prevented calls are registered (superseding an identical
//!    pending call, evicting the oldest when full).
//! 3. Loading-tracked calls take a `LoadingGuard`.
//! 4. The transport call races the cancel signal and the timeout.
//! 5. Guards drop (registry cleanup, loading decrement), then
//!    `normalize_response` turns the outcome into an envelope or `ApiError`.
//!
//! All bookkeeping happens between suspension points, so interleaved
//! requests never observe a half-updated registry or counter.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::config::{ClientConfig, RequestConfig, RequestOptions};
use crate::envelope::{ResponseEnvelope, AUTH_EXPIRED_CODE, SUCCESS_CODE};
use crate::error::{ApiError, TransportError, MISSING_DELETE_TARGET};
use crate::fingerprint::generate_request_id;
use crate::http::{
    set_header, FilePart, HttpMethod, HttpRequest, HttpResponse, MultipartForm, ReqwestTransport,
    RequestBody, Transport, AUTHORIZATION, CONTENT_TYPE, MULTIPART_CONTENT_TYPE,
};
use crate::loading::{LoadingIndicator, LoadingSink, TracingLoadingSink};
use crate::notify::{ErrorNotifier, TracingNotifier};
use crate::query::encode_params;
use crate::registry::{PendingRegistry, Registration};
use crate::storage::{KeyValueStore, MemoryStore, TOKEN_KEY};

pub type ApiResult<T> = Result<ResponseEnvelope<T>, ApiError>;

pub const CANCEL_ALL_REASON: &str = "all requests canceled";

struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    store: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn ErrorNotifier>,
    loading: LoadingIndicator,
    registry: Mutex<PendingRegistry>,
}

#[derive(Clone)]
pub struct RequestClient {
    inner: Arc<ClientInner>,
}

/// Wires collaborators into a `RequestClient`. Anything not supplied gets
/// the default: `reqwest` transport, in-memory token store, `tracing`
/// notifier and loading sink.
pub struct RequestClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn KeyValueStore>>,
    notifier: Option<Arc<dyn ErrorNotifier>>,
    loading_sink: Option<Arc<dyn LoadingSink>>,
}

impl RequestClientBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn token_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn error_notifier(mut self, notifier: Arc<dyn ErrorNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn loading_sink(mut self, sink: Arc<dyn LoadingSink>) -> Self {
        self.loading_sink = Some(sink);
        self
    }

    pub fn build(self) -> RequestClient {
        let sink = self
            .loading_sink
            .unwrap_or_else(|| Arc::new(TracingLoadingSink));
        let loading = LoadingIndicator::new(self.config.loading_debounce, sink);
        let registry = Mutex::new(PendingRegistry::new(self.config.max_pending));
        RequestClient {
            inner: Arc::new(ClientInner {
                transport: self
                    .transport
                    .unwrap_or_else(|| Arc::new(ReqwestTransport::new())),
                store: self.store.unwrap_or_else(|| Arc::new(MemoryStore::new())),
                notifier: self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier)),
                loading,
                registry,
                config: self.config,
            }),
        }
    }
}

/// Target of a `delete` call: one id as a path segment, or many as
/// repeated `ids` query parameters.
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub id: Option<String>,
    pub ids: Vec<String>,
    pub options: RequestOptions,
}

impl DeleteOptions {
    pub fn id(id: impl ToString) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Self::default()
        }
    }

    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Self {
            ids: ids.into_iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

/// What `upload` sends: a single file (sent as the `file` field) or a
/// multipart form the caller already built.
#[derive(Debug, Clone)]
pub enum UploadPayload {
    File(FilePart),
    Form(MultipartForm),
}

impl From<FilePart> for UploadPayload {
    fn from(file: FilePart) -> Self {
        UploadPayload::File(file)
    }
}

impl From<MultipartForm> for UploadPayload {
    fn from(form: MultipartForm) -> Self {
        UploadPayload::Form(form)
    }
}

struct PendingGuard<'a> {
    registry: &'a Mutex<PendingRegistry>,
    id: String,
    ticket: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.registry).release(&self.id, self.ticket);
    }
}

impl RequestClient {
    pub fn new(config: ClientConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: ClientConfig) -> RequestClientBuilder {
        RequestClientBuilder {
            config,
            transport: None,
            store: None,
            notifier: None,
            loading_sink: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn loading(&self) -> &LoadingIndicator {
        &self.inner.loading
    }

    pub fn pending_count(&self) -> usize {
        self.registry().len()
    }

    /// Ids of tracked requests, oldest first.
    pub fn pending_ids(&self) -> Vec<String> {
        self.registry().ids()
    }

    /// Describe the HTTP call for `config` without sending it.
    pub fn build_request(&self, config: &RequestConfig) -> HttpRequest {
        let mut headers = self.inner.config.default_headers.clone();
        for (name, value) in &config.options.headers {
            set_header(&mut headers, name, value.clone());
        }
        if config.options.with_token {
            match self.inner.store.get(TOKEN_KEY) {
                Some(token) if !token.is_empty() => {
                    set_header(&mut headers, AUTHORIZATION, format!("Bearer {token}"));
                }
                _ => debug!(url = %config.url, "no stored token, sending without authorization"),
            }
        }

        HttpRequest {
            method: config.method,
            url: self.resolve_url(&config.url),
            query: config.params.as_ref().map(encode_params).unwrap_or_default(),
            headers,
            body: config.body.clone(),
        }
    }

    /// Send a call and decode the envelope payload as `T`.
    pub async fn request<T: DeserializeOwned>(&self, config: RequestConfig) -> ApiResult<T> {
        let options = config.options.clone();
        let envelope = self.dispatch(config).await?;
        envelope.decode().inspect_err(|err| self.report(err, &options))
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> ApiResult<T> {
        let mut config = RequestConfig::new(HttpMethod::Get, url).options(options);
        config.params = params;
        self.request(config).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        url: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> ApiResult<T> {
        let mut config = RequestConfig::new(HttpMethod::Post, url).options(options);
        config.body = body.map(RequestBody::Json);
        self.request(config).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        url: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> ApiResult<T> {
        let mut config = RequestConfig::new(HttpMethod::Put, url).options(options);
        config.body = body.map(RequestBody::Json);
        self.request(config).await
    }

    /// `DELETE {url}/{id}` or `DELETE {url}?ids=a&ids=b`.
    ///
    /// Without an id or a non-empty id list, fails with
    /// `ApiError::InvalidRequest` and sends nothing.
    pub async fn delete<T: DeserializeOwned>(
        &self,
        url: &str,
        target: DeleteOptions,
    ) -> ApiResult<T> {
        let DeleteOptions { id, ids, options } = target;
        let config = if let Some(id) = id {
            let url = format!("{}/{id}", url.trim_end_matches('/'));
            RequestConfig::new(HttpMethod::Delete, url).options(options)
        } else if !ids.is_empty() {
            RequestConfig::new(HttpMethod::Delete, url)
                .params(serde_json::json!({ "ids": ids }))
                .options(options)
        } else {
            warn!(url, "delete called without id or ids");
            return Err(ApiError::InvalidRequest {
                message: MISSING_DELETE_TARGET.to_string(),
            });
        };
        self.request(config).await
    }

    /// Upload a file or multipart form, appending `extra` fields.
    ///
    /// Uploads are never deduplicated: `prevent_duplicate` is forced off and
    /// the content type is forced to multipart.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        url: &str,
        payload: impl Into<UploadPayload>,
        extra: Option<Map<String, Value>>,
        mut options: RequestOptions,
    ) -> ApiResult<T> {
        let mut form = match payload.into() {
            UploadPayload::Form(form) => form,
            UploadPayload::File(file) => MultipartForm::new().file("file", file),
        };
        for (name, value) in extra.unwrap_or_default() {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            form.push_text(name, value);
        }

        options.is_upload = true;
        options.prevent_duplicate = false;
        set_header(&mut options.headers, CONTENT_TYPE, MULTIPART_CONTENT_TYPE);

        let config = RequestConfig::new(HttpMethod::Post, url)
            .body(RequestBody::Multipart(form))
            .options(options);
        self.request(config).await
    }

    /// Remove the tracked request `id`. With a reason the in-flight call is
    /// canceled; without one only the bookkeeping is cleared.
    pub fn cancel_request(&self, id: &str, reason: Option<&str>) -> bool {
        self.registry().cancel(id, reason)
    }

    /// Cancel every tracked request, oldest first. Returns how many.
    pub fn cancel_all_requests(&self, reason: Option<&str>) -> usize {
        self.registry().cancel_all(reason.unwrap_or(CANCEL_ALL_REASON))
    }

    async fn dispatch(&self, config: RequestConfig) -> ApiResult<Value> {
        let request = self.build_request(&config);
        let options = config.options;
        let timeout = options.timeout.unwrap_or(self.inner.config.timeout);

        let (pending, canceled) = if options.prevent_duplicate && !options.is_upload {
            let id = options.request_id.clone().unwrap_or_else(|| {
                generate_request_id(
                    config.method,
                    &config.url,
                    config.params.as_ref(),
                    config.body.as_ref(),
                )
            });
            let Registration { id, ticket, canceled } = self.registry().register(id);
            let guard = PendingGuard {
                registry: &self.inner.registry,
                id,
                ticket,
            };
            (Some(guard), Some(canceled))
        } else {
            (None, None)
        };
        // Taken after registration so a superseded twin hands the indicator
        // over without a hide/show gap.
        let loading = options.show_loading.then(|| self.inner.loading.begin());

        debug!(
            method = request.method.as_str(),
            url = %request.url,
            request_id = pending.as_ref().map(|p| p.id.as_str()),
            "dispatching request"
        );
        let outcome = self.execute(request, timeout, canceled).await;

        drop(pending);
        drop(loading);

        let result = outcome.and_then(normalize_response);
        if let Err(err) = &result {
            if matches!(err, ApiError::AuthExpired { .. }) {
                self.expire_session();
            }
            self.report(err, &options);
        }
        result
    }

    async fn execute(
        &self,
        request: HttpRequest,
        timeout: Duration,
        canceled: Option<oneshot::Receiver<String>>,
    ) -> Result<HttpResponse, ApiError> {
        let cancel_signal = async move {
            match canceled {
                Some(rx) => match rx.await {
                    Ok(reason) => reason,
                    // Untracked without cancellation: keep waiting for the call.
                    Err(_) => std::future::pending::<String>().await,
                },
                None => std::future::pending::<String>().await,
            }
        };
        let call = tokio::time::timeout(timeout, self.inner.transport.execute(request, timeout));

        tokio::select! {
            biased;
            reason = cancel_signal => Err(ApiError::Canceled { reason }),
            result = call => match result {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(source)) => Err(ApiError::Network { source }),
                Err(_) => Err(ApiError::Network { source: TransportError::Timeout }),
            },
        }
    }

    fn expire_session(&self) {
        error!("session expired, please log in again");
        if let Err(e) = self.inner.store.remove(TOKEN_KEY) {
            warn!(error = %e, "failed to clear stored token");
        }
    }

    fn report(&self, err: &ApiError, options: &RequestOptions) {
        match err {
            ApiError::Canceled { reason } => {
                warn!(reason = %reason, "request canceled");
                return;
            }
            ApiError::AuthExpired { .. } => return,
            ApiError::Business { code, message } => {
                error!(code, message = %message, "server returned business error");
            }
            other => error!(code = other.code(), error = %other, "request failed"),
        }
        if options.show_error {
            self.inner.notifier.notify(err.message());
        }
    }

    fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{url}", self.inner.config.base_url)
        } else {
            format!("{}/{url}", self.inner.config.base_url)
        }
    }

    fn registry(&self) -> MutexGuard<'_, PendingRegistry> {
        lock(&self.inner.registry)
    }
}

fn lock(registry: &Mutex<PendingRegistry>) -> MutexGuard<'_, PendingRegistry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Canned message for the HTTP statuses the backend is known to return.
pub fn status_message(status: u16) -> Option<&'static str> {
    let message = match status {
        400 => "bad request parameters",
        401 => "unauthorized, please log in",
        403 => "access denied",
        404 => "requested resource not found",
        405 => "request method not allowed",
        408 => "request timed out",
        500 => "internal server error",
        501 => "service not implemented",
        502 => "bad gateway",
        503 => "service unavailable",
        504 => "gateway timeout",
        505 => "HTTP version not supported",
        _ => return None,
    };
    Some(message)
}

/// Map a transport response to the success envelope or an `ApiError`.
///
/// Non-2xx statuses become `ApiError::Http`, with the message taken from the
/// status table, then the server's `message` field, then a generic fallback.
/// 2xx bodies must be envelopes; only `code == 200` succeeds and
/// `code == 401` is reported as an expired session.
pub fn normalize_response(response: HttpResponse) -> ApiResult<Value> {
    if !response.is_success() {
        let body: Option<Value> = if response.body.trim().is_empty() {
            None
        } else {
            Some(
                serde_json::from_str(&response.body)
                    .unwrap_or_else(|_| Value::String(response.body.clone())),
            )
        };
        let server_message = body
            .as_ref()
            .and_then(|b| b.get("message"))
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty());
        let message = status_message(response.status)
            .map(str::to_string)
            .or_else(|| server_message.map(str::to_string))
            .unwrap_or_else(|| format!("request failed with status {}", response.status));
        return Err(ApiError::Http {
            status: response.status,
            message,
            body,
        });
    }

    let envelope: ResponseEnvelope<Value> =
        serde_json::from_str(&response.body).map_err(|e| ApiError::Decode(e.to_string()))?;
    match envelope.code {
        SUCCESS_CODE => Ok(envelope),
        AUTH_EXPIRED_CODE => Err(ApiError::AuthExpired {
            message: envelope.message,
        }),
        code => Err(ApiError::Business {
            code,
            message: envelope.message,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> RequestClient {
        RequestClient::new(ClientConfig::new("http://localhost:8080/api"))
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn build_request_joins_base_url_and_params() {
        let config = RequestConfig::new(HttpMethod::Get, "/articleCategory/categoryListWithArticleCount")
            .params(json!({"parentId": 3}));
        let req = client().build_request(&config);
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(
            req.url,
            "http://localhost:8080/api/articleCategory/categoryListWithArticleCount"
        );
        assert_eq!(req.query, vec![("parentId".to_string(), "3".to_string())]);
        assert_eq!(req.header("content-type"), Some("application/json;charset=UTF-8"));
        assert!(req.body.is_none());
    }

    #[test]
    fn build_request_accepts_relative_and_absolute_urls() {
        let c = client();
        let relative = c.build_request(&RequestConfig::new(HttpMethod::Get, "article/total"));
        assert_eq!(relative.url, "http://localhost:8080/api/article/total");
        let absolute = c.build_request(&RequestConfig::new(HttpMethod::Get, "https://cdn.test/x"));
        assert_eq!(absolute.url, "https://cdn.test/x");
    }

    #[test]
    fn build_request_attaches_stored_token() {
        let store = Arc::new(MemoryStore::new());
        store.set(TOKEN_KEY, "abc").unwrap();
        let c = RequestClient::builder(ClientConfig::new("http://localhost"))
            .token_store(store)
            .build();

        let with = c.build_request(
            &RequestConfig::new(HttpMethod::Get, "/x").options(RequestOptions::new().with_token()),
        );
        assert_eq!(with.header("authorization"), Some("Bearer abc"));

        let without = c.build_request(&RequestConfig::new(HttpMethod::Get, "/x"));
        assert!(without.header("authorization").is_none());
    }

    #[test]
    fn build_request_per_call_headers_override_defaults() {
        let config = RequestConfig::new(HttpMethod::Post, "/x")
            .options(RequestOptions::new().header("Content-Type", "text/plain"));
        let req = client().build_request(&config);
        assert_eq!(req.header("content-type"), Some("text/plain"));
        assert_eq!(req.headers.len(), 1);
    }

    #[test]
    fn normalize_success_returns_envelope_unchanged() {
        let env = normalize_response(response(200, r#"{"code":200,"message":"ok","data":{"x":1}}"#)).unwrap();
        assert_eq!(env.code, 200);
        assert_eq!(env.message, "ok");
        assert_eq!(env.data, Some(json!({"x": 1})));
    }

    #[test]
    fn normalize_business_error() {
        let err = normalize_response(response(200, r#"{"code":500,"message":"article not found","data":null}"#))
            .unwrap_err();
        assert!(matches!(err, ApiError::Business { code: 500, .. }));
        assert_eq!(err.envelope().message, "article not found");
        assert!(err.envelope().data.is_none());
    }

    #[test]
    fn normalize_auth_expired() {
        let err = normalize_response(response(200, r#"{"code":401,"message":"token expired","data":null}"#))
            .unwrap_err();
        assert!(matches!(err, ApiError::AuthExpired { .. }));
    }

    #[test]
    fn normalize_http_status_table_wins_over_server_message() {
        let err = normalize_response(response(404, r#"{"message":"no such article"}"#)).unwrap_err();
        assert_eq!(err.code(), 404);
        assert_eq!(err.message(), "requested resource not found");
        assert_eq!(err.envelope().data, Some(json!({"message": "no such article"})));
    }

    #[test]
    fn normalize_http_falls_back_to_server_message() {
        let err = normalize_response(response(418, r#"{"message":"teapot"}"#)).unwrap_err();
        assert_eq!(err.message(), "teapot");
    }

    #[test]
    fn normalize_http_falls_back_to_generic_message() {
        let err = normalize_response(response(429, "")).unwrap_err();
        assert_eq!(err.message(), "request failed with status 429");
        assert!(err.envelope().data.is_none());
    }

    #[test]
    fn normalize_malformed_success_body() {
        let err = normalize_response(response(200, "<html>")).unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
        assert_eq!(err.code(), -1);
    }

    #[test]
    fn status_table_covers_known_codes() {
        for status in [400, 401, 403, 404, 405, 408, 500, 501, 502, 503, 504, 505] {
            assert!(status_message(status).is_some(), "missing {status}");
        }
        assert!(status_message(418).is_none());
    }

    #[test]
    fn delete_options_constructors() {
        let one = DeleteOptions::id(7);
        assert_eq!(one.id.as_deref(), Some("7"));
        let many = DeleteOptions::ids([1, 2, 3]);
        assert_eq!(many.ids, vec!["1", "2", "3"]);
    }
}
