//! # Weftgate Core
//!
//! Authenticated HTTP client core for the weftgate supply-chain portal
//! (brands, production partners and platform operators).
//!
//! This crate provides:
//! - [`CredentialStore`] - memory-only access/refresh credential pair, with a
//!   one-time migration out of [`legacy`] durable locations
//! - [`Pipeline`] - the interceptor chain: [`AuthDecorator`] stamps
//!   credentials and impersonation on every call, [`EnvelopeNormalizer`]
//!   unwraps `{data, meta}` envelopes and flattens error messages
//! - [`RefreshCoordinator`] - single-flight credential refresh with a FIFO
//!   queue of parked callers
//! - [`ApiClient`] - ties the above together over `reqwest`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use weftgate_core::{ApiClient, ClientConfig, FileLegacyStore};
//!
//! async fn orders() -> Result<serde_json::Value, Box<dyn std::error::Error>> {
//!     let client = ApiClient::builder(ClientConfig::from_env()?).build()?;
//!
//!     // Pick up a session left on disk by an older build.
//!     let legacy = FileLegacyStore::open_default()?;
//!     if !client.credentials().migrate_from_legacy(&legacy).await {
//!         client.login("buyer@brand.example", "hunter2").await?;
//!     }
//!
//!     Ok(client.get("/orders").await?)
//! }
//! ```

pub mod client;
pub mod config;
pub mod credentials;
pub mod decorator;
pub mod envelope;
pub mod error;
pub mod impersonation;
pub mod legacy;
pub mod pipeline;
pub mod refresh;
pub mod secret;

// Re-export commonly used types at crate root
pub use client::{ApiClient, ApiClientBuilder, ApiRequest, AuthSession};

pub use config::ClientConfig;

pub use credentials::{CredentialPair, CredentialStore};

pub use decorator::AuthDecorator;

pub use envelope::{EnvelopeNormalizer, flatten_error_message, unwrap_envelope};

pub use error::{ApiError, ConfigError};

pub use impersonation::ImpersonationContext;

pub use legacy::{FileLegacyStore, LegacyStore, MemoryLegacyStore, StoreError};

#[cfg(feature = "keyring-store")]
pub use legacy::KeyringLegacyStore;

pub use pipeline::{ApiResponse, Pipeline, RequestStage, ResponseStage};

pub use refresh::{
    CredentialRefresher,
    LogSessionObserver,
    RefreshCoordinator,
    RefreshError,
    SessionObserver,
};

pub use secret::Secret;

pub use reqwest::{Method, StatusCode};
