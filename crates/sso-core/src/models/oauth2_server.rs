// ABOUTME: OAuth 2.0 server persistence models for clients, authorization codes and revocations
// ABOUTME: Records exchanged between the authorization server and the database layer
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Registered OAuth 2.0 client
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// OAuth 2.0 client identifier
    pub client_id: String,
    /// Argon2 PHC hash of the client secret
    pub client_secret_hash: String,
    /// Human-readable client name shown on the consent screen
    pub client_name: String,
    /// Registered redirect URIs, compared by exact string match
    pub redirect_uris: Vec<String>,
    /// Scopes the client may request; empty means unrestricted
    pub allowed_scopes: Vec<String>,
    /// Grant types the client may use
    pub grant_types: Vec<String>,
    /// When this client was registered
    pub created_at: DateTime<Utc>,
}

impl OAuthClient {
    /// Whether the client registered `grant_type`
    #[must_use]
    pub fn allows_grant_type(&self, grant_type: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant_type)
    }

    /// Whether `redirect_uri` exactly matches one of the registered URIs
    #[must_use]
    pub fn has_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }
}

/// Single-use authorization code
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    /// Opaque code value (32 random bytes, base64url)
    pub code: String,
    /// Client the code was issued to
    pub client_id: String,
    /// User who authorized the code
    pub user_id: Uuid,
    /// Redirect URI that must be repeated at the token endpoint
    pub redirect_uri: String,
    /// Space-separated granted scopes
    pub scope: String,
    /// `OpenID` Connect nonce echoed into the ID token
    pub nonce: Option<String>,
    /// PKCE code challenge (RFC 7636)
    pub code_challenge: Option<String>,
    /// PKCE code challenge method (`plain` or `S256`)
    pub code_challenge_method: Option<String>,
    /// When the user authenticated
    pub auth_time: DateTime<Utc>,
    /// When the code was minted
    pub created_at: DateTime<Utc>,
    /// When the code stops being redeemable
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationCode {
    /// Whether the code is past its expiry at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Revoked token identifier, kept until the token would have expired anyway
#[derive(Debug, Clone)]
pub struct RevokedToken {
    /// `jti` of the revoked token
    pub jti: String,
    /// `token_use` of the revoked token
    pub token_use: String,
    /// Client that owned the token
    pub client_id: String,
    /// When the revocation happened
    pub revoked_at: DateTime<Utc>,
    /// Expiry of the revoked token
    pub expires_at: DateTime<Utc>,
}
