//! Domain model types for the StudyAI session.
//!
//! - [`PersistenceMode`] - Which storage lifetime backs a session
//! - [`SessionInfo`] - What a successful login hands back to the caller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage lifetime chosen at login ("remember me").
///
/// # Examples
///
/// ```
/// use studyai_core::PersistenceMode;
///
/// assert_eq!(PersistenceMode::from_remember(true), PersistenceMode::Durable);
/// assert_eq!(PersistenceMode::from_remember(false), PersistenceMode::Ephemeral);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    /// Survives process restarts.
    Durable,

    /// Lives only as long as the process.
    Ephemeral,
}

impl PersistenceMode {
    /// Map the "remember me" flag onto a lifetime.
    pub fn from_remember(remember: bool) -> Self {
        if remember {
            Self::Durable
        } else {
            Self::Ephemeral
        }
    }

    /// Get the mode as a string slice.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Durable => "durable",
            Self::Ephemeral => "ephemeral",
        }
    }
}

impl fmt::Display for PersistenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Identifying attribute of the authenticated user (the email).
    pub account_id: String,

    /// Lifetime that actually holds the session.
    ///
    /// May be `Ephemeral` even when `Durable` was requested, if the durable
    /// backend refused the write.
    pub persistence: PersistenceMode,

    /// When the login completed.
    pub authenticated_at: DateTime<Utc>,
}

impl SessionInfo {
    /// Create session info stamped with the current time.
    pub fn new(account_id: impl Into<String>, persistence: PersistenceMode) -> Self {
        Self {
            account_id: account_id.into(),
            persistence,
            authenticated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_mode_serde() {
        let json = serde_json::to_string(&PersistenceMode::Durable).unwrap();
        assert_eq!(json, "\"durable\"");

        let parsed: PersistenceMode = serde_json::from_str("\"ephemeral\"").unwrap();
        assert_eq!(parsed, PersistenceMode::Ephemeral);
    }

    #[test]
    fn test_session_info_new() {
        let before = Utc::now();
        let info = SessionInfo::new("ada@example.com", PersistenceMode::Ephemeral);
        assert_eq!(info.account_id, "ada@example.com");
        assert!(info.authenticated_at >= before);
    }
}
