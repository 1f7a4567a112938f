//! Session facade.
//!
//! [`SessionManager`] is the entry point the application holds on to. It
//! owns the credential store and the refresh coordinator for one client
//! instance, performs login/register/logout, and hands out the augmented
//! [`ApiClient`] by reference.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use studyai_core::{ClientConfig, Secret, SessionManager};
//!
//! let session = SessionManager::from_config(&ClientConfig::load()?)?;
//!
//! if session.current_user().await.is_none() {
//!     session
//!         .login("ada@example.com", &Secret::new("hunter2"), true)
//!         .await?;
//! }
//!
//! let history = session.api().get("/history").await?;
//! println!("{}", history.status());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::Response;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::client::ApiClient;
use crate::config::{ClientConfig, ConfigError};
use crate::credentials::{CredentialError, CredentialStore};
use crate::http::HttpTransport;
use crate::model::{PersistenceMode, SessionInfo};
use crate::refresh::RefreshCoordinator;
use crate::store::{MemoryStore, Secret, create_durable_store};
use crate::token;

/// Error type for login and registration.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The login endpoint rejected the credentials (4xx).
    #[error("invalid credentials{}", detail_suffix(.detail))]
    InvalidCredentials { status: u16, detail: Option<String> },

    /// The register endpoint rejected the request (4xx).
    #[error("registration rejected{}", detail_suffix(.detail))]
    RegistrationRejected { status: u16, detail: Option<String> },

    /// The auth endpoint failed on its side (5xx or other non-2xx).
    #[error("auth server error (status {status}){}", detail_suffix(.detail))]
    Server { status: u16, detail: Option<String> },

    /// The login reply carried no access token.
    #[error("login response missing access token")]
    MalformedLoginResponse,

    /// No response was received.
    #[error("network error: {message}")]
    Network { message: String },

    /// Neither lifetime accepted the session.
    #[error("failed to store session: {0}")]
    Storage(#[from] CredentialError),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_ref()
        .map(|d| format!(": {}", d))
        .unwrap_or_default()
}

/// Owner of one client's session state.
pub struct SessionManager {
    transport: HttpTransport,
    credentials: CredentialStore,
    coordinator: RefreshCoordinator,
    login_path: String,
    register_path: String,
}

impl SessionManager {
    /// Build a session over an explicit credential store.
    pub fn new(config: &ClientConfig, credentials: CredentialStore) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            transport: HttpTransport::from_config(config)?,
            credentials,
            coordinator: RefreshCoordinator::new(
                config.refresh_path.clone(),
                config.refresh_timeout(),
            ),
            login_path: config.login_path.clone(),
            register_path: config.register_path.clone(),
        })
    }

    /// Build a session with the configured durable backend and an in-memory
    /// ephemeral lifetime.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let durable = create_durable_store(config.durable_backend, config.session_file.clone());
        let credentials = CredentialStore::new(durable, Box::new(MemoryStore::new()));
        Self::new(config, credentials)
    }

    /// The augmented client.
    pub fn api(&self) -> ApiClient<'_> {
        ApiClient::new(&self.transport, &self.credentials, &self.coordinator)
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Authenticate and store the issued tokens.
    ///
    /// `remember` selects the durable lifetime. If the durable backend
    /// refuses the write, the session is kept in the ephemeral lifetime
    /// instead and the returned [`SessionInfo`] says so.
    pub async fn login(
        &self,
        account_id: &str,
        password: &Secret,
        remember: bool,
    ) -> Result<SessionInfo, AuthError> {
        let body = json!({ "email": account_id, "password": password.expose() });
        let (status, reply) = self.auth_exchange(&self.login_path, &body).await?;

        if !status.is_success() {
            let detail = token::error_detail(&reply);
            warn!("Login rejected for {} (status {})", account_id, status);
            return Err(if status.is_client_error() {
                AuthError::InvalidCredentials {
                    status: status.as_u16(),
                    detail,
                }
            } else {
                AuthError::Server {
                    status: status.as_u16(),
                    detail,
                }
            });
        }

        let access = token::extract_login_access(&reply).ok_or(AuthError::MalformedLoginResponse)?;
        let refresh = token::extract_refresh_token(&reply);
        if refresh.is_none() {
            warn!("Login response carried no refresh token; session cannot be refreshed");
        }

        let requested = PersistenceMode::from_remember(remember);
        let persistence = match self
            .credentials
            .save(&access, refresh.as_ref(), account_id, requested)
            .await
        {
            Ok(()) => requested,
            Err(e) if requested == PersistenceMode::Durable => {
                warn!("Durable storage unavailable ({}), keeping session in memory", e);
                self.credentials
                    .save(&access, refresh.as_ref(), account_id, PersistenceMode::Ephemeral)
                    .await?;
                PersistenceMode::Ephemeral
            }
            Err(e) => return Err(e.into()),
        };

        info!("Logged in as {} ({} session)", account_id, persistence);
        Ok(SessionInfo::new(account_id, persistence))
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, account_id: &str, password: &Secret) -> Result<(), AuthError> {
        let body = json!({ "email": account_id, "password": password.expose() });
        let (status, reply) = self.auth_exchange(&self.register_path, &body).await?;

        if status.is_success() {
            info!("Registered {}", account_id);
            return Ok(());
        }

        let detail = token::error_detail(&reply);
        Err(if status.is_client_error() {
            AuthError::RegistrationRejected {
                status: status.as_u16(),
                detail,
            }
        } else {
            AuthError::Server {
                status: status.as_u16(),
                detail,
            }
        })
    }

    /// Forget the session locally. No network call; idempotent.
    pub async fn logout(&self) {
        self.credentials.clear().await;
        info!("Logged out");
    }

    /// Account id of the stored session, without a round trip.
    ///
    /// `None` whenever no access token is stored, even if an account id or
    /// refresh token lingers.
    pub async fn current_user(&self) -> Option<String> {
        self.credentials.read_access().await?;
        self.credentials.read_account_id().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.credentials.read_access().await.is_some()
    }

    async fn auth_exchange(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<(reqwest::StatusCode, Value), AuthError> {
        let response = self
            .transport
            .post_unauthenticated(path, body, self.auth_timeout())
            .await
            .map_err(|e| AuthError::Network {
                message: e.to_string(),
            })?;
        read_reply(response).await
    }

    fn auth_timeout(&self) -> Duration {
        self.transport.request_timeout()
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("base_url", &self.transport.base_url().as_str())
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

/// Status plus JSON body; a non-JSON body reads as `Null`.
async fn read_reply(response: Response) -> Result<(reqwest::StatusCode, Value), AuthError> {
    let status = response.status();
    let text = response.text().await.map_err(|e| AuthError::Network {
        message: e.to_string(),
    })?;
    let body = serde_json::from_str(&text).unwrap_or(Value::Null);
    Ok((status, body))
}
