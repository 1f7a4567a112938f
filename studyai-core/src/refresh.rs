//! Single-flight access token refresh.
//!
//! When a request is rejected with 401, [`RefreshCoordinator::refresh`]
//! either starts the one refresh exchange (the caller becomes the leader) or,
//! if an exchange is already in flight, queues the caller as a waiter. When
//! the exchange settles, every waiter is resolved in arrival order with the
//! same outcome and the coordinator returns to idle.
//!
//! # State machine
//!
//! ```text
//!            first 401                 exchange settles
//!   Idle ─────────────────▶ Refreshing ─────────────────▶ Idle
//!                            │    ▲    (waiters drained FIFO)
//!                            └────┘
//!                         later 401s queue
//! ```
//!
//! The state lives behind a short-lived `parking_lot::Mutex` that is never
//! held across an `.await`. The single exchange is what keeps credential
//! writes from interleaving, not the storage layer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::credentials::{CredentialError, CredentialStore};
use crate::http::HttpTransport;
use crate::store::Secret;
use crate::token;

/// Why a refresh exchange failed.
///
/// Every waiter receives its own copy, hence `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// No refresh token is stored; the network is not contacted.
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// The refresh endpoint could not be reached or timed out.
    #[error("refresh request failed: {message}")]
    Network { message: String },

    /// The refresh endpoint answered with a non-2xx status.
    #[error("refresh rejected with status {status}")]
    Rejected { status: u16 },

    /// The reply carried none of the accepted access token fields.
    #[error("refresh response missing access token")]
    MalformedResponse,

    /// The session was cleared while the exchange was in flight.
    #[error("session ended during refresh")]
    SessionEnded,

    /// The leading request was dropped before the exchange settled.
    #[error("refresh abandoned before completion")]
    Abandoned,
}

type Outcome = Result<Secret, RefreshError>;
type Waiter = oneshot::Sender<Outcome>;

enum RefreshState {
    Idle,
    Refreshing { waiters: VecDeque<Waiter> },
}

/// Owner of the refresh state machine for one session.
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    refresh_path: String,
    timeout: Duration,
    exchanges: AtomicU64,
}

impl RefreshCoordinator {
    /// Create an idle coordinator.
    ///
    /// `timeout` bounds the refresh exchange, and with it how long any
    /// waiter can stay suspended.
    pub fn new(refresh_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            state: Mutex::new(RefreshState::Idle),
            refresh_path: refresh_path.into(),
            timeout,
            exchanges: AtomicU64::new(0),
        }
    }

    pub fn refresh_path(&self) -> &str {
        &self.refresh_path
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.state.lock(), RefreshState::Refreshing { .. })
    }

    /// Number of refresh exchanges issued over this coordinator's lifetime.
    pub fn exchanges(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }

    /// Number of callers currently queued behind the exchange.
    pub fn waiting(&self) -> usize {
        match &*self.state.lock() {
            RefreshState::Idle => 0,
            RefreshState::Refreshing { waiters } => waiters.len(),
        }
    }

    /// Obtain a new access token, joining an in-flight exchange if any.
    ///
    /// On failure the credential store has been cleared by the time this
    /// returns, for the leader and every waiter alike.
    pub async fn refresh(
        &self,
        transport: &HttpTransport,
        credentials: &CredentialStore,
    ) -> Result<Secret, RefreshError> {
        let queued = {
            let mut state = self.state.lock();
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push_back(tx);
                    debug!(position = waiters.len(), "Refresh in flight, queueing request");
                    Some(rx)
                }
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing {
                        waiters: VecDeque::new(),
                    };
                    None
                }
            }
        };

        if let Some(rx) = queued {
            // A dropped sender means the leader went away without settling.
            return rx.await.unwrap_or(Err(RefreshError::Abandoned));
        }

        let in_flight = InFlight {
            coordinator: self,
            settled: false,
        };

        let outcome = self.exchange(transport, credentials).await;
        match &outcome {
            Ok(_) => info!("Access token refreshed"),
            Err(e) => {
                error!("Token refresh failed, ending session: {}", e);
                credentials.clear().await;
            }
        }

        in_flight.settle(outcome.clone());
        outcome
    }

    async fn exchange(
        &self,
        transport: &HttpTransport,
        credentials: &CredentialStore,
    ) -> Result<Secret, RefreshError> {
        let refresh = credentials
            .read_refresh()
            .await
            .ok_or(RefreshError::MissingRefreshToken)?;

        self.exchanges.fetch_add(1, Ordering::Relaxed);
        debug!("Exchanging refresh token at {}", self.refresh_path);

        let body = json!({ "refresh_token": refresh.expose() });
        let response = transport
            .post_unauthenticated(&self.refresh_path, &body, self.timeout)
            .await
            .map_err(|e| RefreshError::Network {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await.map_err(|e| {
            if e.is_decode() {
                RefreshError::MalformedResponse
            } else {
                RefreshError::Network {
                    message: e.to_string(),
                }
            }
        })?;

        let access = token::extract_refreshed_access(&body).ok_or(RefreshError::MalformedResponse)?;

        match credentials.update_access(&access).await {
            Ok(()) => {}
            Err(CredentialError::NoActiveSession) => return Err(RefreshError::SessionEnded),
            Err(CredentialError::Storage(e)) => {
                warn!(
                    "Could not persist refreshed access token ({}), keeping session in memory",
                    e
                );
                if let Err(e) = credentials.demote_to_ephemeral(&access).await {
                    warn!("Could not move session to memory: {}", e);
                }
            }
        }

        // Only rotate the refresh token when the server supplied a new one.
        if let Some(new_refresh) = token::extract_refresh_token(&body) {
            if let Err(e) = credentials.update_refresh(&new_refresh).await {
                warn!("Could not persist rotated refresh token: {}", e);
            }
        }

        Ok(access)
    }

    /// Return to idle and resolve every waiter, oldest first.
    fn finish(&self, outcome: Outcome) {
        let waiters = match std::mem::replace(&mut *self.state.lock(), RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => VecDeque::new(),
        };

        if !waiters.is_empty() {
            debug!(count = waiters.len(), "Releasing queued requests");
        }
        for waiter in waiters {
            // The waiter may have been dropped; nothing to deliver then.
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refresh_path", &self.refresh_path)
            .field("refreshing", &self.is_refreshing())
            .field("waiting", &self.waiting())
            .finish()
    }
}

/// Held by the leader while the exchange runs.
///
/// Dropping it unsettled (the leader's future was cancelled) still returns
/// the coordinator to idle and rejects the waiters.
struct InFlight<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, outcome: Outcome) {
        self.settled = true;
        self.coordinator.finish(outcome);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Refresh leader dropped mid-exchange");
            self.coordinator.finish(Err(RefreshError::Abandoned));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::model::PersistenceMode;

    fn coordinator() -> RefreshCoordinator {
        RefreshCoordinator::new("/auth/refresh", Duration::from_secs(1))
    }

    fn unreachable_transport() -> HttpTransport {
        // Port 9 (discard) is closed on test hosts; nothing here should dial it.
        HttpTransport::from_config(&ClientConfig::with_base_url("http://127.0.0.1:9")).unwrap()
    }

    #[tokio::test]
    async fn test_missing_refresh_token_fails_without_network() {
        let coordinator = coordinator();
        let credentials = CredentialStore::in_memory();

        let result = coordinator
            .refresh(&unreachable_transport(), &credentials)
            .await;

        assert_eq!(result, Err(RefreshError::MissingRefreshToken));
        assert_eq!(coordinator.exchanges(), 0);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_failure_clears_credentials_and_returns_idle() {
        let coordinator = coordinator();
        let credentials = CredentialStore::in_memory();
        credentials
            .save(&Secret::new("a1"), None, "ada@example.com", PersistenceMode::Durable)
            .await
            .unwrap();

        let result = coordinator
            .refresh(&unreachable_transport(), &credentials)
            .await;

        assert!(result.is_err());
        assert!(credentials.read_access().await.is_none());
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_finish_delivers_outcome_to_every_waiter() {
        let coordinator = coordinator();
        let mut receivers = Vec::new();
        {
            let mut waiters = VecDeque::new();
            for _ in 0..3 {
                let (tx, rx) = oneshot::channel();
                waiters.push_back(tx);
                receivers.push(rx);
            }
            *coordinator.state.lock() = RefreshState::Refreshing { waiters };
        }
        assert_eq!(coordinator.waiting(), 3);

        coordinator.finish(Ok(Secret::new("fresh")));

        assert!(!coordinator.is_refreshing());
        for rx in receivers {
            assert_eq!(rx.await.unwrap().unwrap().expose(), "fresh");
        }
    }

    #[tokio::test]
    async fn test_dropped_leader_rejects_waiters() {
        let coordinator = coordinator();
        let (tx, rx) = oneshot::channel();
        *coordinator.state.lock() = RefreshState::Refreshing {
            waiters: VecDeque::from([tx]),
        };

        drop(InFlight {
            coordinator: &coordinator,
            settled: false,
        });

        assert_eq!(rx.await.unwrap(), Err(RefreshError::Abandoned));
        assert!(!coordinator.is_refreshing());
    }
}
