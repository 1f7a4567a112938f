//! # StudyAI Core
//!
//! Authenticated API client for the StudyAI service.
//!
//! This crate provides:
//! - A credential store over a durable and an ephemeral storage lifetime
//! - Bearer token attachment on every outbound request
//! - Single-flight token refresh with replay of every request queued behind it
//! - A session facade for login, registration, logout and "who am I"
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use studyai_core::{ClientConfig, Secret, SessionManager};
//!
//! let session = SessionManager::from_config(&ClientConfig::load()?)?;
//! session.login("ada@example.com", &Secret::new("hunter2"), true).await?;
//!
//! // Expired tokens are refreshed transparently.
//! let notes = session.api().get("/notes").await?;
//! ```

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod model;
pub mod refresh;
pub mod session;
pub mod store;
pub mod token;

// Re-export commonly used types at crate root
pub use client::{ApiClient, ApiError};

pub use config::{ClientConfig, ConfigError, DurableBackend};

pub use credentials::{CredentialError, CredentialStore};

pub use error::StudyAiError;

pub use http::{ApiRequest, HttpTransport};

pub use model::{PersistenceMode, SessionInfo};

pub use refresh::{RefreshCoordinator, RefreshError};

pub use session::{AuthError, SessionManager};

pub use store::{FileStore, MemoryStore, Secret, SecretStore, StoreError, create_durable_store};

#[cfg(feature = "keyring-store")]
pub use store::KeyringStore;

pub use reqwest::{Method, StatusCode};
