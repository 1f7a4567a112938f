//! The augmented API client.
//!
//! [`ApiClient`] is what the rest of the application calls. Each request gets
//! the stored access token attached; a 401 is recovered by one coordinated
//! refresh and a single replay, invisibly to the caller.

use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::credentials::CredentialStore;
use crate::http::{ApiRequest, HttpTransport, TransportError, is_same_endpoint};
use crate::refresh::{RefreshCoordinator, RefreshError};
use crate::token;

/// Error type for API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was received. Never retried by this layer.
    #[error("network error: {message}")]
    Network { message: String },

    /// The request URL could not be built from the path.
    #[error("invalid request path {path:?}: {message}")]
    InvalidPath { path: String, message: String },

    /// The access token expired and could not be refreshed. The session has
    /// been cleared.
    #[error("session expired: {0}")]
    RefreshFailed(#[from] RefreshError),

    /// A typed helper got a non-2xx status.
    #[error("{path} returned status {status}")]
    Status {
        status: u16,
        path: String,
        detail: Option<String>,
    },

    /// A typed helper could not decode the body.
    #[error("failed to decode response from {path}: {message}")]
    Decode { path: String, message: String },
}

impl ApiError {
    fn from_transport(path: &str, err: TransportError) -> Self {
        match err {
            TransportError::Url(e) => Self::InvalidPath {
                path: path.to_string(),
                message: e.to_string(),
            },
            TransportError::Http(e) => Self::Network {
                message: e.to_string(),
            },
        }
    }

    /// Whether the user has to log in again.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::RefreshFailed(_))
    }
}

/// Augmented client borrowing the session's transport, credentials and
/// refresh coordinator.
///
/// Obtained from [`SessionManager::api`](crate::SessionManager::api).
#[derive(Debug, Clone, Copy)]
pub struct ApiClient<'a> {
    transport: &'a HttpTransport,
    credentials: &'a CredentialStore,
    coordinator: &'a RefreshCoordinator,
}

impl<'a> ApiClient<'a> {
    pub fn new(
        transport: &'a HttpTransport,
        credentials: &'a CredentialStore,
        coordinator: &'a RefreshCoordinator,
    ) -> Self {
        Self {
            transport,
            credentials,
            coordinator,
        }
    }

    /// Send a request with transparent refresh.
    ///
    /// Any status other than 401 is returned untouched. A 401 from the
    /// refresh endpoint, or a second 401 after one replay, is also returned
    /// untouched for the caller to handle.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Response, ApiError> {
        let mut request = ApiRequest::new(method, path);
        if let Some(body) = body {
            request = request.with_body(body);
        }
        self.execute(request).await
    }

    /// Send a prepared request with transparent refresh.
    pub async fn execute(&self, request: ApiRequest) -> Result<Response, ApiError> {
        let sent_with = self.credentials.read_access().await;
        let response = self
            .transport
            .send(&request, sent_with.as_ref())
            .await
            .map_err(|e| ApiError::from_transport(&request.path, e))?;

        if response.status() != StatusCode::UNAUTHORIZED
            || request.retried
            || is_same_endpoint(&request.path, self.coordinator.refresh_path())
        {
            return Ok(response);
        }

        // If the stored token moved on since we sent, someone else already
        // refreshed; replay with it instead of starting another exchange.
        let fresh = match self.credentials.read_access().await {
            Some(current) if sent_with.as_ref() != Some(&current) => {
                debug!("{} rejected a superseded token, replaying", request.path);
                current
            }
            _ => {
                self.coordinator
                    .refresh(self.transport, self.credentials)
                    .await?
            }
        };

        let replay = request.into_retry();
        self.transport
            .send(&replay, Some(&fresh))
            .await
            .map_err(|e| ApiError::from_transport(&replay.path, e))
    }

    pub async fn get(&self, path: &str) -> Result<Response, ApiError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Response, ApiError> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Response, ApiError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Response, ApiError> {
        self.request(Method::DELETE, path, None).await
    }

    /// GET and decode a 2xx JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.get(path).await?;
        decode_json(path, response).await
    }

    /// POST and decode a 2xx JSON body.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
    ) -> Result<T, ApiError> {
        let response = self.post(path, body).await?;
        decode_json(path, response).await
    }
}

async fn decode_json<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let text = response.text().await.map_err(|e| ApiError::Network {
        message: e.to_string(),
    })?;

    if !status.is_success() {
        let detail = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|body| token::error_detail(&body));
        return Err(ApiError::Status {
            status: status.as_u16(),
            path: path.to_string(),
            detail,
        });
    }

    serde_json::from_str(&text).map_err(|e| ApiError::Decode {
        path: path.to_string(),
        message: e.to_string(),
    })
}
