// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: In-memory database, a process-wide RSA key, and user, client and session helpers
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::redundant_closure_for_method_calls
)]
//! Shared test utilities for `oauth_sso_server`
//!
//! This module provides common test setup functions to reduce duplication
//! across integration tests.

use std::env;
use std::sync::{Arc, Once, OnceLock};

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use oauth_sso_server::config::ServerConfig;
use oauth_sso_server::crypto::KeyStore;
use oauth_sso_server::database::Database;
use oauth_sso_server::oauth2_server::{
    hash_password, AuthorizeOutcome, AuthorizeRequest, ClientCredentials,
    ClientRegistrationRequest, ClientRegistrationResponse, OAuth2Error, TokenRequest,
    TokenResponse,
};
use oauth_sso_server::resources::ServerResources;
use oauth_sso_server::scopes::ScopeSet;
use oauth_sso_server::tokens::TokenFormat;
use sso_core::models::{SsoSession, User, UserProfile};
use tracing::Level;
use url::Url;
use uuid::Uuid;

/// Redirect URI registered for every test client
pub const REDIRECT_URI: &str = "https://app.example.com/callback";

/// Password of every test user
pub const TEST_PASSWORD: &str = "correct horse battery staple";

/// A valid PKCE verifier (RFC 7636 appendix B)
pub const PKCE_VERIFIER: &str = "dBjftJeZ4CVP-mJ0kVRd8FJ4P6LNr1j8ya0ANbCTPpM";

static INIT_LOGGER: Once = Once::new();
static KEY_STORE: OnceLock<Arc<KeyStore>> = OnceLock::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        // Check for TEST_LOG environment variable to control test logging level
        let log_level = match env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => Level::TRACE,
            Ok("DEBUG") => Level::DEBUG,
            Ok("INFO") => Level::INFO,
            _ => Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// RSA key pair shared by every test in the process; generation is slow
pub fn test_key_store() -> Arc<KeyStore> {
    KEY_STORE
        .get_or_init(|| Arc::new(KeyStore::generate("test-key", 2048).unwrap()))
        .clone()
}

/// Standard test database setup
pub async fn create_test_database() -> Result<Arc<Database>> {
    init_test_logging();
    Ok(Arc::new(Database::new("sqlite::memory:").await?))
}

/// Default configuration pointed at an in-memory database
pub fn test_config() -> ServerConfig {
    ServerConfig::default()
}

/// Server resources issuing JWT tokens
pub async fn create_test_resources() -> Result<Arc<ServerResources>> {
    create_test_resources_with_format(TokenFormat::Jwt).await
}

/// Server resources issuing tokens in `format`
pub async fn create_test_resources_with_format(
    format: TokenFormat,
) -> Result<Arc<ServerResources>> {
    let mut config = test_config();
    config.tokens.format = format;
    create_test_resources_with_config(config).await
}

/// Server resources built from an explicit configuration
pub async fn create_test_resources_with_config(
    config: ServerConfig,
) -> Result<Arc<ServerResources>> {
    let database = create_test_database().await?;
    Ok(Arc::new(ServerResources::new(
        config,
        database,
        test_key_store(),
    )))
}

/// User with a full profile and the shared test password
pub async fn create_test_user(database: &Database, email: &str) -> Result<User> {
    let user = User {
        id: Uuid::new_v4(),
        email: email.to_owned(),
        password_hash: hash_password(TEST_PASSWORD, 4).await?,
        profile: UserProfile {
            name: Some("Alice Example".to_owned()),
            given_name: Some("Alice".to_owned()),
            family_name: Some("Example".to_owned()),
            email: Some(email.to_owned()),
            email_verified: Some(true),
            phone_number: Some("+1 555 0100".to_owned()),
            ..UserProfile::default()
        },
        created_at: Utc::now(),
    };
    database.create_user(&user).await?;
    Ok(user)
}

/// Register a confidential client with the test redirect URI
pub async fn register_test_client(
    resources: &ServerResources,
    allowed_scopes: &[&str],
    grant_types: Option<&[&str]>,
) -> Result<ClientRegistrationResponse> {
    let request = ClientRegistrationRequest {
        client_id: None,
        client_name: "Test App".to_owned(),
        redirect_uris: vec![REDIRECT_URI.to_owned()],
        allowed_scopes: allowed_scopes.iter().map(|s| (*s).to_owned()).collect(),
        grant_types: grant_types.map(|g| g.iter().map(|s| (*s).to_owned()).collect()),
    };
    Ok(resources.oauth2_server.clients().register_client(request).await?)
}

/// Credentials for a registered client
pub fn credentials(client: &ClientRegistrationResponse) -> ClientCredentials {
    ClientCredentials {
        client_id: client.client_id.clone(),
        client_secret: client.client_secret.clone(),
    }
}

/// HTTP Basic `Authorization` header value
pub fn basic_auth(client_id: &str, client_secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{client_id}:{client_secret}")))
}

/// Open an SSO session for `user`
pub async fn login(resources: &ServerResources, user: &User) -> Result<SsoSession> {
    Ok(resources
        .oauth2_server
        .sessions()
        .create_session(user, Some("127.0.0.1".to_owned()), None)
        .await?)
}

/// Authorization request for the test redirect URI
pub fn authorize_request(client_id: &str, scope: &str) -> AuthorizeRequest {
    AuthorizeRequest {
        response_type: Some("code".to_owned()),
        client_id: Some(client_id.to_owned()),
        redirect_uri: Some(REDIRECT_URI.to_owned()),
        scope: Some(scope.to_owned()),
        state: Some("af0ifjsldkj".to_owned()),
        nonce: Some("n-0S6_WzA2Mj".to_owned()),
        ..AuthorizeRequest::default()
    }
}

/// Record consent for `scope` and return the issued authorization code
pub async fn obtain_code(
    resources: &ServerResources,
    session: &SsoSession,
    request: &AuthorizeRequest,
) -> Result<String> {
    let client_id = request
        .client_id
        .as_deref()
        .ok_or_else(|| anyhow!("request has no client_id"))?;
    let scopes = ScopeSet::parse(request.scope.as_deref().unwrap_or_default());
    resources
        .oauth2_server
        .consents()
        .grant(session.user_id, client_id, &scopes)
        .await?;

    match resources
        .oauth2_server
        .authorize(request, Some(session))
        .await
        .map_err(|e| anyhow!("authorize failed: {}", e.error()))?
    {
        AuthorizeOutcome::Redirect(url) => {
            query_param(&url, "code").ok_or_else(|| anyhow!("redirect carries no code: {url}"))
        }
        other => Err(anyhow!("expected a code redirect, got {other:?}")),
    }
}

/// Exchange a code at the token endpoint
pub async fn exchange_code(
    resources: &ServerResources,
    client: &ClientRegistrationResponse,
    code: &str,
    code_verifier: Option<&str>,
) -> Result<TokenResponse, OAuth2Error> {
    let request = TokenRequest {
        grant_type: Some("authorization_code".to_owned()),
        code: Some(code.to_owned()),
        redirect_uri: Some(REDIRECT_URI.to_owned()),
        code_verifier: code_verifier.map(str::to_owned),
        ..TokenRequest::default()
    };
    resources
        .oauth2_server
        .token(request, Some(credentials(client)))
        .await
}

/// First value of query parameter `name` in `url`
pub fn query_param(url: &str, name: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
