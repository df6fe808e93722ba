//! Integration tests for moving credentials out of legacy durable storage.

use std::fs;
use tempfile::TempDir;
use weftgate_core::{
    ApiClient, ClientConfig, CredentialStore, FileLegacyStore, LegacyStore, MemoryLegacyStore,
    legacy::{LEGACY_ACCESS_KEY, LEGACY_REFRESH_KEY},
};

/// Helper to create a legacy session file in a temporary directory.
fn legacy_file(contents: &str) -> (FileLegacyStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("session.json");
    fs::write(&path, contents).unwrap();
    (FileLegacyStore::new(path), temp_dir)
}

#[tokio::test]
async fn test_migrate_once_then_noop() {
    let (legacy, _temp) =
        legacy_file(r#"{"accessToken":"legacy-access","refreshToken":"legacy-refresh"}"#);
    let store = CredentialStore::new();

    assert!(store.migrate_from_legacy(&legacy).await);
    assert_eq!(store.access().unwrap().expose(), "legacy-access");
    assert_eq!(store.refresh().unwrap().expose(), "legacy-refresh");
    assert!(legacy.get(LEGACY_ACCESS_KEY).await.unwrap().is_none());
    assert!(legacy.get(LEGACY_REFRESH_KEY).await.unwrap().is_none());
    assert!(!legacy.path().exists());

    // Second run on a clean location changes nothing.
    let clean = CredentialStore::new();
    assert!(!clean.migrate_from_legacy(&legacy).await);
    assert!(!clean.is_authenticated());
}

#[tokio::test]
async fn test_migrate_keeps_unrelated_entries() {
    let (legacy, _temp) = legacy_file(r#"{"accessToken":"legacy-access","locale":"pt-BR"}"#);
    let store = CredentialStore::new();

    assert!(store.migrate_from_legacy(&legacy).await);

    assert!(store.refresh().is_none());
    assert_eq!(legacy.get("locale").await.unwrap().unwrap().expose(), "pt-BR");
}

#[tokio::test]
async fn test_migrate_from_corrupt_file_is_a_noop() {
    let (legacy, _temp) = legacy_file("{ not json");
    let store = CredentialStore::new();

    assert!(!store.migrate_from_legacy(&legacy).await);
    assert!(!store.is_authenticated());
    assert!(legacy.path().exists());
}

#[tokio::test]
async fn test_migrated_credentials_feed_the_client() {
    let legacy = MemoryLegacyStore::with_entries([
        (LEGACY_ACCESS_KEY, "legacy-access"),
        (LEGACY_REFRESH_KEY, "legacy-refresh"),
    ]);
    let client = ApiClient::builder(ClientConfig::default()).build().unwrap();

    assert!(client.credentials().migrate_from_legacy(&legacy).await);
    assert!(client.credentials().is_authenticated());
    assert!(legacy.is_empty());
}
