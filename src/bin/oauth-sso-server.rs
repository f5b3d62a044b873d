// ABOUTME: Command-line entry point: run the authorization server or manage users and clients
// ABOUTME: Subcommands serve, create-user and register-client share the environment configuration
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # OAuth SSO Server Binary
//!
//! Usage:
//! ```bash
//! # Start the server
//! oauth-sso-server serve --http-port 8080
//!
//! # Create a user
//! oauth-sso-server create-user --email alice@example.com --password 'correct horse' --name Alice
//!
//! # Register a confidential client
//! oauth-sso-server register-client --name "Demo App" \
//!     --redirect-uri https://app.example.com/callback --scope openid --scope profile
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bcrypt::DEFAULT_COST;
use chrono::Utc;
use clap::{Parser, Subcommand};
use oauth_sso_server::config::ServerConfig;
use oauth_sso_server::crypto::KeyStore;
use oauth_sso_server::database::Database;
use oauth_sso_server::logging;
use oauth_sso_server::oauth2_server::{
    hash_password, ClientRegistrationManager, ClientRegistrationRequest, MaintenanceTask,
};
use oauth_sso_server::resources::ServerResources;
use oauth_sso_server::routes;
use oauth_sso_server::scopes::ScopeRegistry;
use sso_core::models::{User, UserProfile};
use tokio::net::TcpListener;
use tokio::{fs, signal};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "oauth-sso-server")]
#[command(about = "OAuth 2.0 / OpenID Connect authorization server with SSO sessions")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Database URL override
    #[arg(long, global = true)]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Override HTTP port
        #[arg(long)]
        http_port: Option<u16>,
    },

    /// Create a user account
    CreateUser {
        /// Login email
        #[arg(long)]
        email: String,

        /// Password (stored as a bcrypt hash)
        #[arg(long)]
        password: String,

        /// Full name
        #[arg(long)]
        name: Option<String>,

        /// Given name
        #[arg(long)]
        given_name: Option<String>,

        /// Family name
        #[arg(long)]
        family_name: Option<String>,

        /// Phone number
        #[arg(long)]
        phone_number: Option<String>,
    },

    /// Register an OAuth client and print its credentials
    RegisterClient {
        /// Display name shown on the consent screen
        #[arg(long)]
        name: String,

        /// Allowed redirect URI (repeatable)
        #[arg(long = "redirect-uri")]
        redirect_uris: Vec<String>,

        /// Allowed scope (repeatable; none means unrestricted)
        #[arg(long = "scope")]
        scopes: Vec<String>,

        /// Allowed grant type (repeatable; defaults to authorization_code and refresh_token)
        #[arg(long = "grant-type")]
        grant_types: Vec<String>,

        /// Fixed client id instead of a generated one
        #[arg(long)]
        client_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_from_env()?;

    let mut config = ServerConfig::from_env()?;
    if let Some(database_url) = args.database_url {
        config.database_url = database_url;
    }

    match args.command {
        Command::Serve { http_port } => {
            if let Some(http_port) = http_port {
                config.http_port = http_port;
            }
            serve(config).await
        }
        Command::CreateUser {
            email,
            password,
            name,
            given_name,
            family_name,
            phone_number,
        } => {
            let database = open_database(&config.database_url).await?;
            let profile = UserProfile {
                name,
                given_name,
                family_name,
                email: Some(email.clone()),
                email_verified: Some(false),
                phone_number,
                ..UserProfile::default()
            };
            create_user(&database, &email, &password, profile).await
        }
        Command::RegisterClient {
            name,
            redirect_uris,
            scopes,
            grant_types,
            client_id,
        } => {
            let database = open_database(&config.database_url).await?;
            let request = ClientRegistrationRequest {
                client_id,
                client_name: name,
                redirect_uris,
                allowed_scopes: scopes,
                grant_types: (!grant_types.is_empty()).then_some(grant_types),
            };
            register_client(database, request).await
        }
    }
}

async fn serve(config: ServerConfig) -> Result<()> {
    info!("Starting OAuth SSO server");
    info!("{}", config.summary());

    let key_store = Arc::new(KeyStore::load_or_generate(&config.key_store)?);
    let database = open_database(&config.database_url).await?;
    let sweep_interval = Duration::from_secs(config.sessions.sweep_interval_secs);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));

    let resources = Arc::new(ServerResources::new(config, database.clone(), key_store));
    let maintenance = MaintenanceTask::spawn(database, sweep_interval);
    let app = routes::build_router(resources);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "HTTP server listening");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    maintenance.shutdown().await;
    served.context("HTTP server failed")?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}

async fn open_database(database_url: &str) -> Result<Arc<Database>> {
    if let Some(path) = database_url
        .strip_prefix("sqlite:")
        .filter(|path| !path.contains(":memory:"))
        .and_then(|path| Path::new(path.trim_start_matches("//")).parent())
        .filter(|dir| !dir.as_os_str().is_empty())
    {
        fs::create_dir_all(path)
            .await
            .with_context(|| format!("Failed to create database directory {}", path.display()))?;
    }
    info!(database_url, "Opening database");
    Ok(Arc::new(Database::new(database_url).await?))
}

async fn create_user(
    database: &Database,
    email: &str,
    password: &str,
    profile: UserProfile,
) -> Result<()> {
    let user = User {
        id: Uuid::new_v4(),
        email: email.to_lowercase(),
        password_hash: hash_password(password, DEFAULT_COST).await?,
        profile,
        created_at: Utc::now(),
    };
    database.create_user(&user).await?;
    info!(user_id = %user.id, email = %user.email, "Created user");
    println!("{}", user.id);
    Ok(())
}

async fn register_client(database: Arc<Database>, request: ClientRegistrationRequest) -> Result<()> {
    let manager = ClientRegistrationManager::new(database, Arc::new(ScopeRegistry::standard()));
    let response = manager
        .register_client(request)
        .await
        .context("Client registration failed")?;
    info!(client_id = %response.client_id, "Registered client");
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
