//! Weftgate CLI
//!
//! Command-line client for the weftgate portal API, for operators and for
//! checking an API deployment from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Call an endpoint, signing in first
//! weftgate --email ops@weftgate.dev call get /orders
//!
//! # Act on behalf of a company (operators only)
//! weftgate --as-company 42 call get /dashboard/summary
//!
//! # Move a session left by the desktop client into memory and use it
//! weftgate --legacy file whoami
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};
use weftgate_core::{ApiClient, ApiRequest, LegacyStore, Method};

mod config;
mod session;

use session::{LegacySource, Login};

#[derive(Parser)]
#[command(name = "weftgate")]
#[command(about = "Client for the weftgate supply-chain portal API")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Portal API base address (overrides config and WEFTGATE_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Account email used to sign in
    #[arg(long, global = true, env = "WEFTGATE_EMAIL")]
    email: Option<String>,

    /// Account password used to sign in
    #[arg(long, global = true, env = "WEFTGATE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Where to look for a session left by an older client
    #[arg(long, global = true, value_enum, default_value = "file")]
    legacy: LegacySource,

    /// Company to act on behalf of (operators only)
    #[arg(long, global = true)]
    as_company: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call an API endpoint and print the payload
    Call {
        /// HTTP method
        #[arg(value_enum)]
        method: HttpMethod,

        /// Path below the API base address (e.g., /orders)
        path: String,

        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query", value_parser = parse_query)]
        query: Vec<(String, String)>,
    },

    /// Show the signed-in account
    Whoami,

    /// Move a legacy session out of durable storage and show whose it was
    Migrate,

    /// Refresh the access credential
    Refresh,

    /// Sign out and revoke the refresh credential
    Logout,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    fn method(self) -> Method {
        match self {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

fn parse_query(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {:?}", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let cli_config = match &cli.config {
        Some(path) => config::load_config_from(path)?,
        None => config::load_config()?,
    };
    info!("Loaded configuration from {:?}", cli_config.config_path);

    let mut client_config = cli_config.client_config(|key| std::env::var(key).ok())?;
    if let Some(url) = &cli.api_url {
        client_config.base_url = weftgate_core::ClientConfig::new(url)?.base_url;
    }

    let legacy = session::open_legacy(cli.legacy, &cli_config, &client_config)?;
    let client = session::build_client(client_config, cli.as_company.as_deref())?;
    let login = Login {
        email: cli.email.clone(),
        password: cli.password.clone(),
    };

    if !matches!(cli.command, Commands::Migrate) {
        session::establish(&client, legacy.as_deref(), &login).await?;
    }

    match cli.command {
        Commands::Call {
            method,
            path,
            data,
            query,
        } => call(&client, method, &path, data.as_deref(), query).await,
        Commands::Whoami => whoami(&client).await,
        Commands::Refresh => refresh(&client).await,
        Commands::Logout => logout(&client).await,
        Commands::Migrate => migrate(&client, legacy.as_deref()).await,
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn call(
    client: &ApiClient,
    method: HttpMethod,
    path: &str,
    data: Option<&str>,
    query: Vec<(String, String)>,
) -> Result<()> {
    let method = method.method();
    let mut request = ApiRequest::new(method.clone(), path);
    if let Some(data) = data {
        let body: Value = serde_json::from_str(data).context("--data is not valid JSON")?;
        request = request.with_body(body);
    }
    for (key, value) in query {
        request = request.with_query(key, value);
    }

    let payload = client
        .send(request)
        .await
        .with_context(|| format!("{} {} failed", method, path))?;
    print_json(&payload)
}

async fn whoami(client: &ApiClient) -> Result<()> {
    let me = client.get("/auth/me").await.context("Could not load profile")?;
    print_json(&me)
}

async fn migrate(client: &ApiClient, legacy: Option<&dyn LegacyStore>) -> Result<()> {
    let Some(legacy) = legacy else {
        println!("No legacy location selected");
        return Ok(());
    };

    if !client.credentials().migrate_from_legacy(legacy).await {
        println!("No legacy session found");
        return Ok(());
    }

    println!("Legacy session moved out of durable storage");
    whoami(client).await
}

async fn refresh(client: &ApiClient) -> Result<()> {
    client
        .refresh_now()
        .await
        .context("Could not refresh the session")?;
    println!("Access credential refreshed");
    Ok(())
}

async fn logout(client: &ApiClient) -> Result<()> {
    client.logout().await;
    println!("Signed out");
    Ok(())
}
