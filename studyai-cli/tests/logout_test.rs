//! Integration tests for the logout command.
//!
//! These tests verify that logout removes a remembered session from the
//! session file the CLI uses, and that it works without a reachable server.

use studyai_core::{
    ClientConfig, CredentialStore, DurableBackend, FileStore, PersistenceMode, Secret,
    SessionManager,
};
use tempfile::TempDir;

/// Helper to build a config whose durable lifetime is a file in a temp dir.
fn test_config() -> (ClientConfig, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = ClientConfig {
        durable_backend: DurableBackend::File,
        session_file: temp_dir.path().join("session.json"),
        // Nothing listens here; logout must not need the network.
        ..ClientConfig::with_base_url("http://127.0.0.1:9")
    };
    (config, temp_dir)
}

#[tokio::test]
async fn test_logout_clears_remembered_session() {
    let (config, _temp) = test_config();

    // Simulate an earlier `studyai login`.
    let seeded = CredentialStore::new(
        Box::new(FileStore::new(&config.session_file)),
        Box::new(studyai_core::MemoryStore::new()),
    );
    seeded
        .save(
            &Secret::new("access-1"),
            Some(&Secret::new("refresh-1")),
            "ada@example.com",
            PersistenceMode::Durable,
        )
        .await
        .unwrap();

    let session = SessionManager::from_config(&config).unwrap();
    assert_eq!(session.current_user().await.as_deref(), Some("ada@example.com"));

    session.logout().await;

    let after = SessionManager::from_config(&config).unwrap();
    assert!(after.current_user().await.is_none());
    assert!(!after.is_authenticated().await);
}

#[tokio::test]
async fn test_logout_without_session_is_a_no_op() {
    let (config, _temp) = test_config();

    let session = SessionManager::from_config(&config).unwrap();
    session.logout().await;
    session.logout().await;

    assert!(session.current_user().await.is_none());
    assert!(!config.session_file.exists());
}
