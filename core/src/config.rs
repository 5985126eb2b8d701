//! Client-wide and per-call configuration.
//!
//! # Design
//! `ClientConfig` is fixed at construction and applies to every call.
//! `RequestOptions` carries the per-call switches with documented defaults
//! (all off, no explicit id, client timeout) instead of merging loose maps.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;
use tracing::info;

use crate::error::ConfigError;
use crate::http::{HttpMethod, RequestBody, CONTENT_TYPE, JSON_CONTENT_TYPE};
use crate::loading::DEFAULT_LOADING_DEBOUNCE;
use crate::registry::DEFAULT_MAX_PENDING;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

pub const BASE_URL_VAR: &str = "BLOG_API_URL";
pub const TIMEOUT_VAR: &str = "BLOG_API_TIMEOUT_MS";
pub const MAX_PENDING_VAR: &str = "BLOG_API_MAX_PENDING";
pub const DEBOUNCE_VAR: &str = "BLOG_API_LOADING_DEBOUNCE_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub default_headers: Vec<(String, String)>,
    /// Capacity of the pending-request registry.
    pub max_pending: usize,
    pub loading_debounce: Duration,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
            default_headers: vec![(CONTENT_TYPE.to_string(), JSON_CONTENT_TYPE.to_string())],
            max_pending: DEFAULT_MAX_PENDING,
            loading_debounce: DEFAULT_LOADING_DEBOUNCE,
        }
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Only the base address is required.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(BASE_URL_VAR).ok_or(ConfigError::Missing(BASE_URL_VAR))?;
        let mut config = Self::new(&base_url);
        config.timeout = Duration::from_millis(try_load(&lookup, TIMEOUT_VAR, DEFAULT_TIMEOUT.as_millis() as u64)?);
        config.max_pending = try_load(&lookup, MAX_PENDING_VAR, DEFAULT_MAX_PENDING)?;
        config.loading_debounce = Duration::from_millis(try_load(
            &lookup,
            DEBOUNCE_VAR,
            DEFAULT_LOADING_DEBOUNCE.as_millis() as u64,
        )?);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::Invalid {
                key: BASE_URL_VAR,
                reason: "base address is empty".to_string(),
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: TIMEOUT_VAR,
                reason: "timeout must be positive".to_string(),
            });
        }
        if self.max_pending == 0 {
            return Err(ConfigError::Invalid {
                key: MAX_PENDING_VAR,
                reason: "capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn try_load<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

/// Per-call switches. Everything is off by default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Explicit dedup key; computed from the request when absent.
    pub request_id: Option<String>,
    pub with_token: bool,
    pub show_loading: bool,
    pub prevent_duplicate: bool,
    pub show_error: bool,
    pub is_upload: bool,
    /// Overrides the client timeout for this call.
    pub timeout: Option<Duration>,
    /// Added after the client defaults, replacing same-named ones.
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self) -> Self {
        self.with_token = true;
        self
    }

    pub fn show_loading(mut self) -> Self {
        self.show_loading = true;
        self
    }

    pub fn prevent_duplicate(mut self) -> Self {
        self.prevent_duplicate = true;
        self
    }

    pub fn show_error(mut self) -> Self {
        self.show_error = true;
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A complete call description consumed by `RequestClient::request`.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestConfig {
    pub method: HttpMethod,
    /// Path relative to the base address, or an absolute `http(s)` URL.
    pub url: String,
    /// Query parameters; must be a JSON object when present.
    pub params: Option<Value>,
    pub body: Option<RequestBody>,
    pub options: RequestOptions,
}

impl RequestConfig {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: None,
            body: None,
            options: RequestOptions::default(),
        }
    }

    pub fn params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::new("http://localhost:8080/api/");
        assert_eq!(config.base_url, "http://localhost:8080/api");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.max_pending, 50);
        assert_eq!(config.loading_debounce, Duration::from_millis(300));
        assert_eq!(
            config.default_headers,
            vec![("content-type".to_string(), "application/json;charset=UTF-8".to_string())]
        );
    }

    #[test]
    fn from_lookup_reads_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            (BASE_URL_VAR, "http://blog.test"),
            (TIMEOUT_VAR, "2500"),
            (MAX_PENDING_VAR, "8"),
            (DEBOUNCE_VAR, "50"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "http://blog.test");
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.max_pending, 8);
        assert_eq!(config.loading_debounce, Duration::from_millis(50));
    }

    #[test]
    fn from_lookup_requires_base_url() {
        let err = ClientConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing(BASE_URL_VAR));
    }

    #[test]
    fn from_lookup_rejects_garbage_numbers() {
        let err = ClientConfig::from_lookup(lookup(&[
            (BASE_URL_VAR, "http://blog.test"),
            (TIMEOUT_VAR, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: TIMEOUT_VAR, .. }));
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut config = ClientConfig::new("http://blog.test");
        config.max_pending = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: MAX_PENDING_VAR, .. })
        ));
    }

    #[test]
    fn options_default_to_off() {
        let options = RequestOptions::default();
        assert!(!options.with_token);
        assert!(!options.show_loading);
        assert!(!options.prevent_duplicate);
        assert!(!options.show_error);
        assert!(!options.is_upload);
        assert!(options.timeout.is_none());
    }
}
