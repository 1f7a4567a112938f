//! Top-level error type.

use thiserror::Error;

use crate::client::ApiError;
use crate::config::ConfigError;
use crate::credentials::CredentialError;
use crate::refresh::RefreshError;
use crate::session::AuthError;
use crate::store::StoreError;

/// Error type encompassing everything the core can fail with.
#[derive(Debug, Error)]
pub enum StudyAiError {
    /// Error from a storage backend.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error writing session credentials.
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// The refresh exchange failed and the session was cleared.
    #[error("refresh error: {0}")]
    Refresh(#[from] RefreshError),

    /// Error from an API call.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// Login or registration failed.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl StudyAiError {
    /// Whether this failure should be shown to the user.
    ///
    /// Only refresh and login failures are user-facing; everything else is
    /// recovered or degraded silently.
    pub fn is_user_facing(&self) -> bool {
        match self {
            Self::Refresh(_) | Self::Auth(_) => true,
            Self::Api(e) => e.is_session_expired(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_classification() {
        let refresh: StudyAiError =
            ApiError::RefreshFailed(RefreshError::MissingRefreshToken).into();
        assert!(refresh.is_user_facing());

        let login: StudyAiError = AuthError::MalformedLoginResponse.into();
        assert!(login.is_user_facing());

        let network: StudyAiError = ApiError::Network {
            message: "connection refused".to_string(),
        }
        .into();
        assert!(!network.is_user_facing());
    }
}
