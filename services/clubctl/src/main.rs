//! clubctl
//!
//! Command-line client for the Clubhouse API:
//! 1. Loads config and opens the session store
//! 2. Runs one command through the authenticated client
//! 3. Prints the response body to stdout
//!
//! Logs go to stderr as JSON so stdout stays pipeable.

mod cli;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use club_api::{ApiClient, ApiResponse, AuthEvent};
use club_auth::{FileStorage, TokenStore};
use common::Secret;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Command;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON on stderr, LOG_LEVEL / RUST_LOG filter
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = cli::parse(&args)?;

    let config_path = Config::resolve_path(cli.config.as_deref());
    debug!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let store = match &config.storage.path {
        Some(path) => {
            let storage = FileStorage::open(path.clone())
                .await
                .with_context(|| format!("failed to open session file {}", path.display()))?;
            TokenStore::new(Arc::new(storage))
        }
        None => {
            debug!("no storage.path configured, session will not persist");
            TokenStore::in_memory()
        }
    };

    info!(
        base_url = %config.api.base_url,
        api_prefix = %config.api.api_prefix,
        timeout_secs = config.api.timeout_secs,
        persistent = config.storage.path.is_some(),
        "configuration loaded"
    );

    let client = ApiClient::new(config.client_options(), store)?;
    let _expired = client.events().subscribe(|event| {
        if *event == AuthEvent::SessionExpired {
            eprintln!("session expired, please log in again");
        }
    });

    run(&client, cli.command).await
}

async fn run(client: &ApiClient, command: Command) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            let password = match password {
                Some(p) => p,
                None => std::env::var("CLUB_PASSWORD")
                    .context("no password given: pass it as an argument or set CLUB_PASSWORD")?,
            };
            let user = client
                .login(&email, &Secret::new(password))
                .await
                .context("login failed")?;
            match user {
                Some(user) => print_json(&serde_json::to_value(user)?)?,
                None => println!("logged in as {email}"),
            }
        }
        Command::Logout => {
            client.logout().await;
            println!("logged out");
        }
        Command::Whoami => match client.current_user().await {
            Some(user) => print_json(&serde_json::to_value(user)?)?,
            None if client.token_store().is_authenticated().await => {
                println!("logged in (no profile stored)")
            }
            None => bail!("not logged in"),
        },
        Command::Get { path } => {
            let response = client.get(&path).await?;
            print_response(&response)?;
        }
        Command::Post { path, body } => {
            let response = client.post(&path, &body).await?;
            print_response(&response)?;
        }
    }
    Ok(())
}

/// Print the body, pretty when it is JSON. Non-2xx statuses become an error
/// after the body is shown.
fn print_response(response: &ApiResponse) -> Result<()> {
    match response.json::<serde_json::Value>() {
        Ok(value) => print_json(&value)?,
        Err(_) => println!("{}", response.text()),
    }
    if !response.is_success() {
        bail!("{} {}", response.status(), response.error_message());
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
