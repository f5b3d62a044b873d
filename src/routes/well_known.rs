// ABOUTME: OpenID Connect discovery document and JSON Web Key Set endpoints
// ABOUTME: Advertises endpoints, scopes, claims, algorithms, prompt values and PKCE methods
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use sso_core::constants::{algorithms, endpoints, grant_types, pkce_methods, RESPONSE_TYPE_CODE};

use crate::crypto::JsonWebKeySet;
use crate::resources::ServerResources;

/// `OpenID` Provider metadata (`OpenID` Connect Discovery 1.0, section 3)
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryDocument {
    /// Issuer identifier
    pub issuer: String,
    /// Authorization endpoint
    pub authorization_endpoint: String,
    /// Token endpoint
    pub token_endpoint: String,
    /// Userinfo endpoint
    pub userinfo_endpoint: String,
    /// JWKS endpoint
    pub jwks_uri: String,
    /// RFC 7662 introspection endpoint
    pub introspection_endpoint: String,
    /// RFC 7009 revocation endpoint
    pub revocation_endpoint: String,
    /// SSO logout endpoint
    pub end_session_endpoint: String,
    /// Registered scopes
    pub scopes_supported: Vec<String>,
    /// Only `code`
    pub response_types_supported: Vec<&'static str>,
    /// Token endpoint grant types
    pub grant_types_supported: Vec<&'static str>,
    /// Subject identifier types
    pub subject_types_supported: Vec<&'static str>,
    /// ID token signing algorithms
    pub id_token_signing_alg_values_supported: Vec<&'static str>,
    /// JWE key management algorithms for encrypted tokens
    pub token_encryption_alg_values_supported: Vec<&'static str>,
    /// JWE content encryption algorithms for encrypted tokens
    pub token_encryption_enc_values_supported: Vec<&'static str>,
    /// Client authentication methods
    pub token_endpoint_auth_methods_supported: Vec<&'static str>,
    /// Claims that can be released
    pub claims_supported: Vec<String>,
    /// Accepted `prompt` values
    pub prompt_values_supported: Vec<&'static str>,
    /// PKCE methods
    pub code_challenge_methods_supported: Vec<&'static str>,
}

impl DiscoveryDocument {
    /// Build the document for this server
    #[must_use]
    pub fn for_server(resources: &ServerResources) -> Self {
        let registry = &resources.registry;
        let mut claims: BTreeSet<String> = ["sub", "iss", "aud", "exp", "iat", "auth_time", "nonce"]
            .into_iter()
            .map(str::to_owned)
            .collect();
        for definition in registry.definitions() {
            claims.extend(definition.claims.iter().map(|claim| claim.as_str().to_owned()));
        }

        Self {
            issuer: resources.config.issuer_url.clone(),
            authorization_endpoint: resources.endpoint_url(endpoints::AUTHORIZE),
            token_endpoint: resources.endpoint_url(endpoints::TOKEN),
            userinfo_endpoint: resources.endpoint_url(endpoints::USERINFO),
            jwks_uri: resources.endpoint_url(endpoints::JWKS),
            introspection_endpoint: resources.endpoint_url(endpoints::INTROSPECT),
            revocation_endpoint: resources.endpoint_url(endpoints::REVOKE),
            end_session_endpoint: resources.endpoint_url(endpoints::LOGOUT),
            scopes_supported: registry.definitions().map(|d| d.name.clone()).collect(),
            response_types_supported: vec![RESPONSE_TYPE_CODE],
            grant_types_supported: grant_types::SUPPORTED.to_vec(),
            subject_types_supported: vec!["public"],
            id_token_signing_alg_values_supported: vec![algorithms::RS256],
            token_encryption_alg_values_supported: vec![algorithms::RSA_OAEP_256],
            token_encryption_enc_values_supported: vec![algorithms::A256GCM],
            token_endpoint_auth_methods_supported: vec!["client_secret_basic", "client_secret_post"],
            claims_supported: claims.into_iter().collect(),
            prompt_values_supported: vec!["none", "login", "consent", "select_account"],
            code_challenge_methods_supported: vec![pkce_methods::S256, pkce_methods::PLAIN],
        }
    }
}

/// Discovery and JWKS routes
pub struct WellKnownRoutes;

impl WellKnownRoutes {
    /// Create the well-known routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(endpoints::OPENID_CONFIGURATION, get(Self::handle_discovery))
            .route(endpoints::JWKS, get(Self::handle_jwks))
            .with_state(resources)
    }

    async fn handle_discovery(
        State(resources): State<Arc<ServerResources>>,
    ) -> Json<DiscoveryDocument> {
        Json(DiscoveryDocument::for_server(&resources))
    }

    async fn handle_jwks(State(resources): State<Arc<ServerResources>>) -> Json<JsonWebKeySet> {
        Json(resources.key_store.to_jwks())
    }
}
