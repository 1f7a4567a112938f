//! HTTP transport and request augmentation.
//!
//! [`HttpTransport`] owns the `reqwest` client and base URL. Ordinary calls go
//! through [`HttpTransport::send`], which attaches the bearer credential it is
//! handed; auth exchanges (login, register, refresh) go through
//! [`HttpTransport::post_unauthenticated`] and are never intercepted.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, Response};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::{ClientConfig, ConfigError};
use crate::store::Secret;

/// A replayable description of an outbound call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,

    /// Path relative to the base URL, e.g. `/history`.
    pub path: String,

    pub body: Option<Value>,

    /// Set once the request has been replayed after a 401.
    pub retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            retried: false,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Copy of this request marked as already retried.
    pub fn into_retry(mut self) -> Self {
        self.retried = true;
        self
    }
}

/// Outbound HTTP plumbing shared by every call of one session.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Build a transport from configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let base_url = config.parsed_base_url()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "http_client",
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url,
            request_timeout: config.request_timeout(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for a path, keeping any path prefix on the base URL.
    pub fn url_for(&self, path: &str) -> Result<Url, url::ParseError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{}/{}", base, path))
    }

    /// Send a request, attaching `token` as a bearer credential when present.
    ///
    /// Never waits on a refresh: the caller decides which token to pass.
    pub async fn send(
        &self,
        request: &ApiRequest,
        token: Option<&Secret>,
    ) -> Result<Response, TransportError> {
        let url = self.url_for(&request.path)?;
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .timeout(self.request_timeout);

        match token {
            Some(token) => {
                builder = builder.bearer_auth(token.expose());
                debug!("{} {} (bearer attached)", request.method, request.path);
            }
            None => debug!("{} {} (unauthenticated)", request.method, request.path),
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        Ok(builder.send().await?)
    }

    /// POST a JSON body with no credential attached.
    pub async fn post_unauthenticated(
        &self,
        path: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        let url = self.url_for(path)?;
        debug!("POST {} (auth exchange)", path);
        Ok(self
            .client
            .post(url)
            .timeout(timeout)
            .json(body)
            .send()
            .await?)
    }

    /// Timeout applied to ordinary requests.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

/// Failure before any response was received.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Whether `path` refers to the same endpoint as `endpoint`, ignoring query
/// strings and trailing slashes.
pub fn is_same_endpoint(path: &str, endpoint: &str) -> bool {
    let strip = |p: &str| -> String {
        let p = p.split(['?', '#']).next().unwrap_or("");
        format!("/{}", p.trim_matches('/'))
    };
    strip(path) == strip(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base: &str) -> HttpTransport {
        HttpTransport::from_config(&ClientConfig::with_base_url(base)).unwrap()
    }

    #[test]
    fn test_url_for_joins_paths() {
        let t = transport("http://127.0.0.1:8000");
        assert_eq!(
            t.url_for("/auth/login").unwrap().as_str(),
            "http://127.0.0.1:8000/auth/login"
        );
    }

    #[test]
    fn test_url_for_keeps_base_prefix() {
        let t = transport("https://api.example.com/v1/");
        assert_eq!(
            t.url_for("history").unwrap().as_str(),
            "https://api.example.com/v1/history"
        );
    }

    #[test]
    fn test_is_same_endpoint() {
        assert!(is_same_endpoint("/auth/refresh", "/auth/refresh"));
        assert!(is_same_endpoint("auth/refresh/", "/auth/refresh"));
        assert!(is_same_endpoint("/auth/refresh?x=1", "/auth/refresh"));
        assert!(!is_same_endpoint("/auth/refresh-all", "/auth/refresh"));
        assert!(!is_same_endpoint("/notes", "/auth/refresh"));
    }

    #[test]
    fn test_into_retry_marks_request() {
        let req = ApiRequest::new(Method::GET, "/notes");
        assert!(!req.retried);
        assert!(req.into_retry().retried);
    }
}
