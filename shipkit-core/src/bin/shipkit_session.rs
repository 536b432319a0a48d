//! ShipKit session driver
//!
//! Run with: cargo run --bin shipkit-session -- whoami
//! Against another server: SHIPKIT_API_URL=https://api.example.com cargo run --bin shipkit-session -- login a@b.com secret

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shipkit_core::auth::{AuthenticatedClient, Credentials, FileTokenStore, SessionManager};
use shipkit_core::{SessionState, load_settings};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "shipkit-session", about = "Inspect and manage the stored ShipKit session")]
struct Cli {
    /// Override the API base URL from settings.json
    #[arg(long)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the signed-in user, refreshing tokens if needed
    Whoami,
    /// Sign in and store the session
    Login { email: String, password: String },
    /// Forget the stored session on this machine
    Logout,
    /// Revoke every session on the server, then log out locally
    LogoutAll,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set up logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(url) = cli.api_url {
        settings.api_base_url = url;
    }
    log::info!("Using API at {}", settings.api_base_url);

    let store = FileTokenStore::new().context("failed to open token storage")?;
    let client = AuthenticatedClient::with_reqwest(settings, Arc::new(store))
        .context("failed to build HTTP client")?;

    let manager = SessionManager::new(client);
    let mut states = manager.subscribe();
    let reporter = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            println!("session: {}", describe(&state));
        }
    });

    manager.initialize().await;

    match cli.command {
        Command::Whoami => match manager.current_user() {
            Some(user) => {
                println!("{} <{}>", user.name.as_deref().unwrap_or("-"), user.email);
                println!("  id:       {}", user.id);
                println!("  plan:     {:?}", user.plan);
                println!("  tokens:   {}", user.tokens_balance);
                println!("  verified: {}", user.is_verified);
            }
            None => println!("Not signed in"),
        },
        Command::Login { email, password } => {
            let user = manager
                .login(&Credentials::new(email, password))
                .await
                .context("login failed")?;
            println!("Signed in as {}", user.email);
        }
        Command::Logout => {
            manager.logout();
            println!("Signed out");
        }
        Command::LogoutAll => {
            manager.logout_everywhere().await;
            println!("Signed out everywhere");
        }
    }

    drop(manager);
    let _ = reporter.await;
    Ok(())
}

fn describe(state: &SessionState) -> String {
    match state {
        SessionState::Initializing => "initializing".to_string(),
        SessionState::Ready(Some(user)) => format!("signed in as {}", user.email),
        SessionState::Ready(None) => "signed out".to_string(),
    }
}
