//! Session bootstrap for CLI commands.
//!
//! Credentials only live in memory, so every invocation starts signed out.
//! A session is established by first migrating whatever an older client
//! left in durable storage, then falling back to signing in with the
//! supplied email and password.

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use std::sync::Arc;
use tracing::{debug, info, warn};
use weftgate_core::{
    ApiClient, ClientConfig, FileLegacyStore, KeyringLegacyStore, LegacyStore, RefreshError,
    SessionObserver,
};

use crate::config::CliConfig;

/// Where to look for credentials left by an older client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LegacySource {
    /// The JSON session file in the data directory.
    File,
    /// The OS keyring.
    Keyring,
    /// Do not look.
    None,
}

/// Sign-in details given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Login {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Tells the user to sign in again when the session can't be refreshed.
struct CliSessionObserver;

impl SessionObserver for CliSessionObserver {
    fn session_ended(&self, reason: &RefreshError) {
        eprintln!("Session ended ({}). Sign in again with --email/--password.", reason);
    }
}

/// Build a client for the resolved configuration.
pub fn build_client(config: ClientConfig, as_company: Option<&str>) -> Result<ApiClient> {
    let client = ApiClient::builder(config)
        .session_observer(Arc::new(CliSessionObserver))
        .build()
        .context("Failed to build HTTP client")?;

    if let Some(company) = as_company {
        client.impersonation().begin(company);
    }

    Ok(client)
}

/// Open the legacy location selected by `source`.
pub fn open_legacy(
    source: LegacySource,
    cli_config: &CliConfig,
    client_config: &ClientConfig,
) -> Result<Option<Box<dyn LegacyStore>>> {
    let store: Box<dyn LegacyStore> = match source {
        LegacySource::None => return Ok(None),
        LegacySource::File => match &cli_config.legacy_session_file {
            Some(path) => Box::new(FileLegacyStore::new(path)),
            None => Box::new(
                FileLegacyStore::open_default().context("No data directory for session file")?,
            ),
        },
        LegacySource::Keyring => {
            match KeyringLegacyStore::try_new(&client_config.legacy_keyring_service) {
                Ok(store) => Box::new(store),
                Err(e) => {
                    warn!("Keyring unavailable ({}), skipping legacy migration", e);
                    return Ok(None);
                }
            }
        }
    };
    Ok(Some(store))
}

/// Migrate legacy credentials if there are any, else sign in.
///
/// Fails when neither yields a session.
pub async fn establish(
    client: &ApiClient,
    legacy: Option<&dyn LegacyStore>,
    login: &Login,
) -> Result<()> {
    if let Some(legacy) = legacy {
        if client.credentials().migrate_from_legacy(legacy).await {
            info!("Using credentials migrated from legacy storage");
            return Ok(());
        }
        debug!("No legacy credentials found");
    }

    match (&login.email, &login.password) {
        (Some(email), Some(password)) => {
            client
                .login(email, password)
                .await
                .with_context(|| format!("Sign-in failed for {}", email))?;
            info!("Signed in as {}", email);
            Ok(())
        }
        (Some(_), None) => bail!("--password (or WEFTGATE_PASSWORD) is required with --email"),
        _ => bail!("Not signed in: pass --email and --password, or migrate a legacy session"),
    }
}
