//! Key/value storage backends for session credentials.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`SecretStore`] - Trait for storage backends
//! - [`MemoryStore`] - In-memory backend, used as the ephemeral lifetime
//! - [`FileStore`] - JSON file backend, a durable lifetime
//! - [`KeyringStore`] - OS keyring backend (with `keyring-store` feature)
//! - [`create_durable_store`] - Helper to select the durable backend
//!
//! # Example
//!
//! ```rust,ignore
//! use studyai_core::store::{MemoryStore, Secret, SecretStore};
//!
//! let store = MemoryStore::new();
//! store.set("studyai/access", &Secret::new("eyJhbGciOi...")).await?;
//!
//! let retrieved = store.get("studyai/access").await?;
//! assert_eq!(retrieved.unwrap().expose(), "eyJhbGciOi...");
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DurableBackend;

mod file;
mod memory;
#[cfg(feature = "keyring-store")]
mod keyring;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "keyring-store")]
pub use keyring::KeyringStore;

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value.
#[derive(Clone, Serialize, Deserialize)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Consume the secret and return the inner value.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Error type for storage backend operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend rejected the operation (quota, disabled, locked).
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// The keyring backend is not available.
    #[error("keyring not available: {message}")]
    KeyringUnavailable { message: String },

    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Abstraction over key/value storage backends.
///
/// One instance backs one persistence lifetime. The credential store pairs a
/// durable instance with an ephemeral one.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError>;

    /// Store a value at the given key, overwriting any existing value.
    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError>;

    /// Delete a value by key.
    ///
    /// Returns `Ok(())` even if the key didn't exist.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Check if a key exists without retrieving the value.
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Create the store backing the durable lifetime.
///
/// A keyring that cannot be opened falls back to [`MemoryStore`] with a
/// warning; the session then lasts only as long as the process.
pub fn create_durable_store(
    backend: DurableBackend,
    session_file: PathBuf,
) -> Box<dyn SecretStore> {
    match backend {
        DurableBackend::File => {
            tracing::debug!("Using session file {:?} for durable storage", session_file);
            return Box::new(FileStore::new(session_file));
        }
        DurableBackend::Keyring => {
            #[cfg(feature = "keyring-store")]
            match KeyringStore::try_new("studyai") {
                Ok(store) => {
                    tracing::info!("Using OS keyring for durable session storage");
                    return Box::new(store);
                }
                Err(e) => {
                    tracing::warn!(
                        "Keyring unavailable ({}), falling back to memory store. \
                         Sessions will not persist across restarts.",
                        e
                    );
                }
            }

            #[cfg(not(feature = "keyring-store"))]
            tracing::warn!(
                "Keyring storage requested but keyring-store feature not enabled. \
                 Sessions will not persist across restarts."
            );
        }
        DurableBackend::Memory => {}
    }

    tracing::debug!("Using in-memory durable storage");
    Box::new(MemoryStore::new())
}
