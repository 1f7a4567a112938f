//! Session credential persistence across two lifetimes.
//!
//! [`CredentialStore`] keeps the access token, refresh token and account id
//! in either a durable or an ephemeral [`SecretStore`]. Reads check the
//! durable lifetime first. Writes never leave both lifetimes populated.
//!
//! The store is a cache of server-issued credentials, not the source of
//! truth, so read failures degrade to "absent" with a warning instead of
//! failing the caller.

use thiserror::Error;
use tracing::{debug, warn};

use crate::model::PersistenceMode;
use crate::store::{MemoryStore, Secret, SecretStore, StoreError};

pub const ACCESS_KEY: &str = "studyai/access";
pub const REFRESH_KEY: &str = "studyai/refresh";
pub const ACCOUNT_ID_KEY: &str = "studyai/account_id";

const ALL_KEYS: [&str; 3] = [ACCESS_KEY, REFRESH_KEY, ACCOUNT_ID_KEY];

/// Error type for credential store writes.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The backing store refused the write.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// An in-place update found no lifetime holding a session.
    #[error("no active session to update")]
    NoActiveSession,
}

/// Owner of the persisted session fields.
pub struct CredentialStore {
    durable: Box<dyn SecretStore>,
    ephemeral: Box<dyn SecretStore>,
}

impl CredentialStore {
    pub fn new(durable: Box<dyn SecretStore>, ephemeral: Box<dyn SecretStore>) -> Self {
        Self { durable, ephemeral }
    }

    /// Both lifetimes in memory; handy for tests and throwaway clients.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()), Box::new(MemoryStore::new()))
    }

    fn lifetime(&self, mode: PersistenceMode) -> &dyn SecretStore {
        match mode {
            PersistenceMode::Durable => self.durable.as_ref(),
            PersistenceMode::Ephemeral => self.ephemeral.as_ref(),
        }
    }

    /// Write a full session into the chosen lifetime.
    ///
    /// The other lifetime is cleared first. A missing refresh token removes
    /// any stale one rather than leaving it behind.
    pub async fn save(
        &self,
        access: &Secret,
        refresh: Option<&Secret>,
        account_id: &str,
        mode: PersistenceMode,
    ) -> Result<(), CredentialError> {
        let other = match mode {
            PersistenceMode::Durable => PersistenceMode::Ephemeral,
            PersistenceMode::Ephemeral => PersistenceMode::Durable,
        };
        self.clear_lifetime(other).await;

        let target = self.lifetime(mode);
        target.set(ACCESS_KEY, access).await?;
        match refresh {
            Some(refresh) => target.set(REFRESH_KEY, refresh).await?,
            None => target.delete(REFRESH_KEY).await?,
        }
        target.set(ACCOUNT_ID_KEY, &Secret::new(account_id)).await?;

        debug!("Saved {} session for {}", mode, account_id);
        Ok(())
    }

    async fn read(&self, key: &str) -> Option<Secret> {
        for mode in [PersistenceMode::Durable, PersistenceMode::Ephemeral] {
            match self.lifetime(mode).get(key).await {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {}
                Err(e) => warn!("Failed to read {} from {} storage: {}", key, mode, e),
            }
        }
        None
    }

    pub async fn read_access(&self) -> Option<Secret> {
        self.read(ACCESS_KEY).await
    }

    pub async fn read_refresh(&self) -> Option<Secret> {
        self.read(REFRESH_KEY).await
    }

    pub async fn read_account_id(&self) -> Option<String> {
        self.read(ACCOUNT_ID_KEY).await.map(Secret::into_inner)
    }

    /// Lifetime currently holding the session, if any.
    ///
    /// A lifetime holds the session when it has an access or refresh entry.
    pub async fn active_mode(&self) -> Option<PersistenceMode> {
        for mode in [PersistenceMode::Durable, PersistenceMode::Ephemeral] {
            let store = self.lifetime(mode);
            for key in [ACCESS_KEY, REFRESH_KEY] {
                match store.exists(key).await {
                    Ok(true) => return Some(mode),
                    Ok(false) => {}
                    Err(e) => warn!("Failed to probe {} storage: {}", mode, e),
                }
            }
        }
        None
    }

    /// Replace the access token in whichever lifetime holds the session.
    ///
    /// Never creates a session in a lifetime that holds none.
    pub async fn update_access(&self, token: &Secret) -> Result<(), CredentialError> {
        let mode = self
            .active_mode()
            .await
            .ok_or(CredentialError::NoActiveSession)?;
        self.lifetime(mode).set(ACCESS_KEY, token).await?;
        debug!("Updated access token in {} storage", mode);
        Ok(())
    }

    /// Move the session into the ephemeral lifetime with a new access token.
    ///
    /// Used when the durable lifetime refuses writes mid-session: the stored
    /// refresh token and account id are carried over and the durable entries
    /// are removed, so later reads see `access` instead of the stale token.
    pub async fn demote_to_ephemeral(&self, access: &Secret) -> Result<(), CredentialError> {
        let refresh = self.read_refresh().await;
        let account_id = self.read_account_id().await.unwrap_or_default();
        self.save(access, refresh.as_ref(), &account_id, PersistenceMode::Ephemeral)
            .await
    }

    /// Replace the refresh token in whichever lifetime holds the session.
    pub async fn update_refresh(&self, token: &Secret) -> Result<(), CredentialError> {
        let mode = self
            .active_mode()
            .await
            .ok_or(CredentialError::NoActiveSession)?;
        self.lifetime(mode).set(REFRESH_KEY, token).await?;
        debug!("Updated refresh token in {} storage", mode);
        Ok(())
    }

    async fn clear_lifetime(&self, mode: PersistenceMode) {
        let store = self.lifetime(mode);
        for key in ALL_KEYS {
            if let Err(e) = store.delete(key).await {
                warn!("Failed to delete {} from {} storage: {}", key, mode, e);
            }
        }
    }

    /// Remove every session field from both lifetimes. Idempotent.
    pub async fn clear(&self) {
        self.clear_lifetime(PersistenceMode::Durable).await;
        self.clear_lifetime(PersistenceMode::Ephemeral).await;
        debug!("Cleared session credentials");
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}
