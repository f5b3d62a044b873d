// ABOUTME: OAuth 2.0 client registration and client authentication
// ABOUTME: Secrets are Argon2id-hashed at rest; redirect URIs, grant types and scopes are validated up front
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sso_core::constants::grant_types;
use sso_core::models::OAuthClient;
use tokio::task;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use super::models::OAuth2Error;
use crate::crypto::generate_random_string;
use crate::database::Database;
use crate::errors::{AppResult, ErrorCode};
use crate::scopes::{ScopeError, ScopeRegistry};

/// Out-of-band redirect for native apps (RFC 8252)
const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Client registration request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientRegistrationRequest {
    /// Fixed client id; generated when absent
    #[serde(default)]
    pub client_id: Option<String>,
    /// Name shown on the consent screen
    pub client_name: String,
    /// Redirect URIs, matched exactly at authorization
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    /// Scopes the client may request; empty means unrestricted
    #[serde(default)]
    pub allowed_scopes: Vec<String>,
    /// Grant types; defaults to `authorization_code` and `refresh_token`
    #[serde(default)]
    pub grant_types: Option<Vec<String>>,
}

/// Registration result. The plaintext secret is only ever returned here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistrationResponse {
    /// Client identifier
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
    /// Client name
    pub client_name: String,
    /// Registered redirect URIs
    pub redirect_uris: Vec<String>,
    /// Allowed scopes
    pub allowed_scopes: Vec<String>,
    /// Allowed grant types
    pub grant_types: Vec<String>,
    /// Registration time, seconds since epoch
    pub client_id_issued_at: i64,
}

/// Credentials presented by a client at the token, introspection or revocation endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    /// Client identifier
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
}

impl ClientCredentials {
    /// Parse an `Authorization: Basic` header value (RFC 6749 section 2.3.1)
    #[must_use]
    pub fn from_basic_header(header: &str) -> Option<Self> {
        let encoded = header
            .strip_prefix("Basic ")
            .or_else(|| header.strip_prefix("basic "))?;
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (id, secret) = decoded.split_once(':')?;
        Some(Self {
            client_id: urlencoding::decode(id).ok()?.into_owned(),
            client_secret: urlencoding::decode(secret).ok()?.into_owned(),
        })
    }

    /// Prefer the Basic header, fall back to form fields
    #[must_use]
    pub fn resolve(
        authorization: Option<&str>,
        client_id: Option<&str>,
        client_secret: Option<&str>,
    ) -> Option<Self> {
        if let Some(credentials) = authorization.and_then(Self::from_basic_header) {
            return Some(credentials);
        }
        match (client_id, client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() => Some(Self {
                client_id: id.to_owned(),
                client_secret: secret.to_owned(),
            }),
            _ => None,
        }
    }
}

/// Registers clients and authenticates them on every back-channel request
#[derive(Clone)]
pub struct ClientRegistrationManager {
    database: Arc<Database>,
    registry: Arc<ScopeRegistry>,
}

impl ClientRegistrationManager {
    /// Creates a new client registration manager
    #[must_use]
    pub const fn new(database: Arc<Database>, registry: Arc<ScopeRegistry>) -> Self {
        Self { database, registry }
    }

    /// Register a new client
    ///
    /// # Errors
    /// Returns `invalid_request` for bad redirect URIs, grant types or a duplicate id,
    /// `invalid_scope` for unregistered scopes and `server_error` on storage failure
    pub async fn register_client(
        &self,
        request: ClientRegistrationRequest,
    ) -> Result<ClientRegistrationResponse, OAuth2Error> {
        let grant_types = request.grant_types.clone().unwrap_or_else(|| {
            vec![
                grant_types::AUTHORIZATION_CODE.to_owned(),
                grant_types::REFRESH_TOKEN.to_owned(),
            ]
        });
        self.validate_registration_request(&request, &grant_types)?;

        let client_id = request
            .client_id
            .clone()
            .unwrap_or_else(|| format!("client_{}", Uuid::new_v4().simple()));
        let client_secret = generate_random_string(32).map_err(|e| {
            error!(error = %e, "System RNG failure while generating client secret");
            OAuth2Error::server_error()
        })?;
        let client_secret_hash = hash_client_secret(client_secret.clone()).await?;

        let client = OAuthClient {
            client_id: client_id.clone(),
            client_secret_hash,
            client_name: request.client_name.clone(),
            redirect_uris: request.redirect_uris.clone(),
            allowed_scopes: request.allowed_scopes.clone(),
            grant_types: grant_types.clone(),
            created_at: Utc::now(),
        };

        self.database.create_client(&client).await.map_err(|e| {
            if e.code == ErrorCode::ResourceAlreadyExists {
                OAuth2Error::invalid_request("client_id is already registered")
            } else {
                error!(error = %e, client_id = %client_id, "Failed to store OAuth2 client registration");
                OAuth2Error::server_error()
            }
        })?;

        info!(client_id = %client_id, grant_types = ?grant_types, "Registered OAuth2 client");
        Ok(ClientRegistrationResponse {
            client_id,
            client_secret,
            client_name: client.client_name,
            redirect_uris: client.redirect_uris,
            allowed_scopes: client.allowed_scopes,
            grant_types,
            client_id_issued_at: client.created_at.timestamp(),
        })
    }

    /// Look up a client without authenticating it
    ///
    /// # Errors
    /// Returns an error if the database query fails
    pub async fn get_client(&self, client_id: &str) -> AppResult<Option<OAuthClient>> {
        self.database.get_client(client_id).await
    }

    /// Authenticate a confidential client
    ///
    /// # Errors
    /// Returns `invalid_client` for an unknown id or a wrong secret
    pub async fn authenticate(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<OAuthClient, OAuth2Error> {
        debug!(client_id = %credentials.client_id, "Authenticating OAuth client");
        let client = self
            .database
            .get_client(&credentials.client_id)
            .await
            .map_err(|e| {
                error!(error = %e, "Client lookup failed");
                OAuth2Error::server_error()
            })?
            .ok_or_else(|| {
                warn!(client_id = %credentials.client_id, "Unknown OAuth client");
                OAuth2Error::invalid_client()
            })?;

        let secret = credentials.client_secret.clone();
        let hash = client.client_secret_hash.clone();
        let verified = task::spawn_blocking(move || verify_client_secret(&secret, &hash))
            .await
            .map_err(|e| {
                error!(error = %e, "Client secret verification task failed");
                OAuth2Error::server_error()
            })?;
        if !verified {
            warn!(client_id = %client.client_id, "OAuth client secret validation failed");
            return Err(OAuth2Error::invalid_client());
        }
        Ok(client)
    }

    fn validate_registration_request(
        &self,
        request: &ClientRegistrationRequest,
        grant_types: &[String],
    ) -> Result<(), OAuth2Error> {
        if request.client_name.trim().is_empty() {
            return Err(OAuth2Error::invalid_request("client_name is required"));
        }
        if let Some(client_id) = &request.client_id {
            if client_id.is_empty() || client_id.chars().any(|c| c.is_whitespace() || c == ':') {
                return Err(OAuth2Error::invalid_request("Invalid client_id"));
            }
        }

        if grant_types.is_empty() {
            return Err(OAuth2Error::invalid_request("At least one grant_type is required"));
        }
        for grant_type in grant_types {
            if !grant_types::SUPPORTED.contains(&grant_type.as_str()) {
                return Err(OAuth2Error::invalid_request(&format!(
                    "Unsupported grant_type: {grant_type}"
                )));
            }
        }

        let needs_redirect = grant_types.iter().any(|g| g == grant_types::AUTHORIZATION_CODE);
        if needs_redirect && request.redirect_uris.is_empty() {
            return Err(OAuth2Error::invalid_request(
                "At least one redirect_uri is required",
            ));
        }
        for uri in &request.redirect_uris {
            if !is_valid_redirect_uri(uri) {
                return Err(OAuth2Error::invalid_request(&format!(
                    "Invalid redirect_uri: {uri}"
                )));
            }
        }

        let unknown: Vec<String> = request
            .allowed_scopes
            .iter()
            .filter(|scope| !self.registry.is_valid_scope(scope))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(ScopeError::Unknown(unknown).into());
        }
        Ok(())
    }
}

/// Absolute URI, no fragment, no wildcard; `https` anywhere, `http` only on loopback
fn is_valid_redirect_uri(uri: &str) -> bool {
    if uri.trim().is_empty() {
        return false;
    }
    if uri.contains('#') {
        warn!("Rejected redirect_uri with fragment: {}", uri);
        return false;
    }
    if uri.contains('*') {
        warn!("Rejected redirect_uri with wildcard: {}", uri);
        return false;
    }
    if uri == OOB_REDIRECT_URI {
        return true;
    }

    let Ok(parsed) = Url::parse(uri) else {
        warn!("Rejected malformed redirect_uri: {}", uri);
        return false;
    };
    let is_loopback = matches!(parsed.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
    match parsed.scheme() {
        "https" => true,
        "http" if is_loopback => true,
        _ => {
            warn!("Rejected redirect_uri with non-HTTPS scheme for non-localhost: {}", uri);
            false
        }
    }
}

/// Hash a client secret with Argon2id and a random salt
async fn hash_client_secret(secret: String) -> Result<String, OAuth2Error> {
    task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
    })
    .await
    .map_err(|e| {
        error!(error = %e, "Client secret hashing task failed");
        OAuth2Error::server_error()
    })?
    .map_err(|e| {
        error!(error = %e, "Argon2 password hashing failed");
        OAuth2Error::server_error()
    })
}

fn verify_client_secret(secret: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        error!("Failed to parse stored client secret hash");
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth2_server::models::OAuth2ErrorCode;

    async fn manager() -> ClientRegistrationManager {
        let database = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        ClientRegistrationManager::new(database, Arc::new(ScopeRegistry::standard()))
    }

    fn request() -> ClientRegistrationRequest {
        ClientRegistrationRequest {
            client_id: Some("web-app".to_owned()),
            client_name: "Web App".to_owned(),
            redirect_uris: vec!["https://app.example/callback".to_owned()],
            allowed_scopes: vec!["openid".to_owned(), "profile".to_owned()],
            grant_types: None,
        }
    }

    #[test]
    fn test_redirect_uri_rules() {
        assert!(is_valid_redirect_uri("https://app.example/cb"));
        assert!(is_valid_redirect_uri("http://localhost:3000/cb"));
        assert!(is_valid_redirect_uri("http://127.0.0.1/cb"));
        assert!(is_valid_redirect_uri(OOB_REDIRECT_URI));
        assert!(!is_valid_redirect_uri("http://app.example/cb"));
        assert!(!is_valid_redirect_uri("https://app.example/cb#frag"));
        assert!(!is_valid_redirect_uri("https://*.example/cb"));
        assert!(!is_valid_redirect_uri("not a uri"));
        assert!(!is_valid_redirect_uri(" "));
    }

    #[test]
    fn test_basic_header_parsing() {
        let header = format!("Basic {}", STANDARD.encode("my%20client:s3cret:x"));
        let credentials = ClientCredentials::from_basic_header(&header).unwrap();
        assert_eq!(credentials.client_id, "my client");
        assert_eq!(credentials.client_secret, "s3cret:x");
        assert!(ClientCredentials::from_basic_header("Bearer abc").is_none());
        assert!(ClientCredentials::from_basic_header("Basic !!!").is_none());
    }

    #[test]
    fn test_resolve_prefers_header() {
        let header = format!("Basic {}", STANDARD.encode("a:b"));
        let credentials = ClientCredentials::resolve(Some(&header), Some("c"), Some("d")).unwrap();
        assert_eq!(credentials.client_id, "a");
        let credentials = ClientCredentials::resolve(None, Some("c"), Some("d")).unwrap();
        assert_eq!(credentials.client_id, "c");
        assert!(ClientCredentials::resolve(None, Some("c"), None).is_none());
    }

    #[tokio::test]
    async fn test_register_and_authenticate() {
        let manager = manager().await;
        let registered = manager.register_client(request()).await.unwrap();
        assert_eq!(registered.client_id, "web-app");
        assert_eq!(
            registered.grant_types,
            vec!["authorization_code".to_owned(), "refresh_token".to_owned()]
        );

        let good = ClientCredentials {
            client_id: "web-app".to_owned(),
            client_secret: registered.client_secret.clone(),
        };
        let client = manager.authenticate(&good).await.unwrap();
        assert_ne!(client.client_secret_hash, registered.client_secret);

        let bad = ClientCredentials {
            client_secret: "wrong".to_owned(),
            ..good
        };
        let err = manager.authenticate(&bad).await.unwrap_err();
        assert_eq!(err.error, OAuth2ErrorCode::InvalidClient);
    }

    #[tokio::test]
    async fn test_duplicate_client_id_rejected() {
        let manager = manager().await;
        manager.register_client(request()).await.unwrap();
        let err = manager.register_client(request()).await.unwrap_err();
        assert_eq!(err.error, OAuth2ErrorCode::InvalidRequest);
    }

    #[tokio::test]
    async fn test_unknown_scope_rejected() {
        let manager = manager().await;
        let err = manager
            .register_client(ClientRegistrationRequest {
                allowed_scopes: vec!["openid".to_owned(), "billing".to_owned()],
                ..request()
            })
            .await
            .unwrap_err();
        assert_eq!(err.error, OAuth2ErrorCode::InvalidScope);
    }

    #[tokio::test]
    async fn test_client_credentials_only_client_needs_no_redirect() {
        let manager = manager().await;
        let registered = manager
            .register_client(ClientRegistrationRequest {
                client_id: None,
                redirect_uris: Vec::new(),
                grant_types: Some(vec!["client_credentials".to_owned()]),
                ..request()
            })
            .await
            .unwrap();
        assert!(registered.client_id.starts_with("client_"));
    }
}
