//! Durable credential locations used by earlier portal builds.
//!
//! Earlier releases persisted the access and refresh credentials in durable
//! storage. Current builds keep them in memory only (see
//! [`CredentialStore`](crate::CredentialStore)); this module exposes the old
//! locations just far enough to read what is there and delete it.
//!
//! This module provides:
//! - [`LegacyStore`] - Trait for a legacy key/value location
//! - [`MemoryLegacyStore`] - In-memory implementation for testing
//! - [`FileLegacyStore`] - JSON file in the platform data directory
//! - [`KeyringLegacyStore`] - OS keyring entries (with `keyring-store` feature)
//!
//! # Keys
//!
//! The prior version stored the pair under [`LEGACY_ACCESS_KEY`] and
//! [`LEGACY_REFRESH_KEY`].

use async_trait::async_trait;
use thiserror::Error;

use crate::secret::Secret;

mod file;
mod memory;
#[cfg(feature = "keyring-store")]
mod keyring;

pub use file::FileLegacyStore;
pub use memory::MemoryLegacyStore;
#[cfg(feature = "keyring-store")]
pub use self::keyring::KeyringLegacyStore;

/// Key the prior version used for the access credential.
pub const LEGACY_ACCESS_KEY: &str = "accessToken";

/// Key the prior version used for the refresh credential.
pub const LEGACY_REFRESH_KEY: &str = "refreshToken";

/// Error type for legacy storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// I/O error reading or writing a file-backed store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The keyring backend is not available.
    #[error("keyring not available: {message}")]
    KeyringUnavailable { message: String },

    /// No platform data directory could be determined.
    #[error("data directory not available")]
    DataDirUnavailable,
}

/// A durable key/value location that may still hold credentials.
#[async_trait]
pub trait LegacyStore: Send + Sync {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError>;

    /// Delete a value by key.
    ///
    /// Returns `Ok(())` even if the key didn't exist.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}
