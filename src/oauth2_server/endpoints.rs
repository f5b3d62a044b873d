// ABOUTME: OAuth 2.0 / OpenID Connect authorization, consent, token and userinfo operations
// ABOUTME: Transport-agnostic; the HTTP layer only extracts parameters and renders the outcomes
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{Map, Value};
use sso_core::constants::{grant_types, scopes as scope_names, RESPONSE_TYPE_CODE, TOKEN_TYPE_BEARER};
use sso_core::models::{AuthorizationCode, OAuthClient, SsoSession, User};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::client_registration::{ClientCredentials, ClientRegistrationManager};
use super::consent::ConsentManager;
use super::models::{build_redirect, AuthorizeRequest, OAuth2Error, TokenRequest, TokenResponse};
use super::pkce::{self, CodeChallengeMethod};
use super::sessions::SessionManager;
use super::state_machine::{self, AuthorizationState, Prompt};
use crate::config::ServerConfig;
use crate::crypto::generate_random_string;
use crate::database::Database;
use crate::errors::AppError;
use crate::logging::AppLogger;
use crate::scopes::{ClaimFilter, ScopeError, ScopeRegistry, ScopeSet};
use crate::tokens::{AccessTokenClaims, RefreshTokenClaims, TokenEngine, TokenError, TokenFormat};

/// Authorization endpoint failure, split by whether the redirect URI can be trusted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeError {
    /// Client or redirect URI could not be verified: render an error page
    Page(OAuth2Error),
    /// Report the error to the client through its redirect URI
    Redirect {
        /// Protocol error
        error: OAuth2Error,
        /// Verified redirect URI
        redirect_uri: String,
        /// `state` from the request
        state: Option<String>,
    },
}

impl AuthorizeError {
    /// Underlying protocol error
    #[must_use]
    pub const fn error(&self) -> &OAuth2Error {
        match self {
            Self::Page(error) | Self::Redirect { error, .. } => error,
        }
    }

    /// Redirect target, when the error may be sent back to the client
    #[must_use]
    pub fn redirect_url(&self) -> Option<String> {
        match self {
            Self::Page(_) => None,
            Self::Redirect {
                error,
                redirect_uri,
                state,
            } => Some(error.redirect_url(redirect_uri, state.as_deref())),
        }
    }
}

/// Authorization request after client, redirect URI, scope, prompt and PKCE checks
#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    /// Requesting client
    pub client: OAuthClient,
    /// Verified redirect URI
    pub redirect_uri: String,
    /// Opaque client state
    pub state: Option<String>,
    /// `OpenID` Connect nonce
    pub nonce: Option<String>,
    /// Normalized requested scopes
    pub scopes: ScopeSet,
    /// PKCE challenge and method
    pub code_challenge: Option<(String, CodeChallengeMethod)>,
    /// Parsed prompt
    pub prompt: Prompt,
}

impl AuthorizationContext {
    fn redirect_error(&self, error: OAuth2Error) -> AuthorizeError {
        AuthorizeError::Redirect {
            error,
            redirect_uri: self.redirect_uri.clone(),
            state: self.state.clone(),
        }
    }

    fn server_error(&self, cause: &AppError) -> AuthorizeError {
        error!(error = %cause, client_id = %self.client.client_id, "Authorization request failed");
        self.redirect_error(OAuth2Error::server_error())
    }
}

/// Result of `GET /oauth/authorize`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeOutcome {
    /// Redirect the browser to the client with a code
    Redirect(String),
    /// Show the login form, then resume the request
    LoginRequired,
    /// Show the consent screen
    ConsentRequired {
        /// Client identifier
        client_id: String,
        /// Client display name
        client_name: String,
        /// Scopes to present for approval
        missing: ScopeSet,
    },
}

/// OAuth 2.0 / `OpenID` Connect authorization server
#[derive(Clone)]
pub struct OAuth2AuthorizationServer {
    database: Arc<Database>,
    registry: Arc<ScopeRegistry>,
    claim_filter: ClaimFilter,
    tokens: TokenEngine,
    clients: ClientRegistrationManager,
    sessions: SessionManager,
    consents: ConsentManager,
    auth_code_ttl: Duration,
}

impl OAuth2AuthorizationServer {
    /// Wire the server from shared components
    #[must_use]
    pub fn new(
        database: Arc<Database>,
        registry: Arc<ScopeRegistry>,
        tokens: TokenEngine,
        config: &ServerConfig,
    ) -> Self {
        Self {
            claim_filter: ClaimFilter::new(registry.clone()),
            clients: ClientRegistrationManager::new(database.clone(), registry.clone()),
            sessions: SessionManager::new(database.clone(), &config.sessions),
            consents: ConsentManager::new(database.clone(), registry.clone(), config.consent_ttl_days),
            auth_code_ttl: Duration::seconds(config.auth_code_ttl_secs),
            database,
            registry,
            tokens,
        }
    }

    /// Client registration and authentication
    #[must_use]
    pub const fn clients(&self) -> &ClientRegistrationManager {
        &self.clients
    }

    /// SSO sessions
    #[must_use]
    pub const fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Stored consent
    #[must_use]
    pub const fn consents(&self) -> &ConsentManager {
        &self.consents
    }

    /// Scope registry
    #[must_use]
    pub fn registry(&self) -> &ScopeRegistry {
        &self.registry
    }

    /// Token engine
    #[must_use]
    pub const fn tokens(&self) -> &TokenEngine {
        &self.tokens
    }

    pub(super) fn database(&self) -> &Database {
        &self.database
    }

    /// Validate an authorization request without acting on it
    ///
    /// # Errors
    /// Returns [`AuthorizeError::Page`] until the redirect URI is verified,
    /// [`AuthorizeError::Redirect`] afterwards
    pub async fn validate_authorize_request(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<AuthorizationContext, AuthorizeError> {
        let client_id = request
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthorizeError::Page(OAuth2Error::invalid_request("client_id is required")))?;
        let client = self
            .clients
            .get_client(client_id)
            .await
            .map_err(|e| {
                error!(error = %e, client_id, "Client lookup failed");
                AuthorizeError::Page(OAuth2Error::server_error())
            })?
            .ok_or_else(|| {
                warn!(client_id, "Authorization request for unknown client");
                AuthorizeError::Page(OAuth2Error::invalid_client())
            })?;

        let redirect_uri = request.redirect_uri.as_deref().ok_or_else(|| {
            AuthorizeError::Page(OAuth2Error::invalid_request("redirect_uri is required"))
        })?;
        if !client.has_redirect_uri(redirect_uri) {
            AppLogger::log_security_event(
                "redirect_uri_mismatch",
                "medium",
                redirect_uri,
                Some(client_id),
            );
            return Err(AuthorizeError::Page(OAuth2Error::invalid_request(
                "redirect_uri is not registered for this client",
            )));
        }

        let redirect = |error: OAuth2Error| AuthorizeError::Redirect {
            error,
            redirect_uri: redirect_uri.to_owned(),
            state: request.state.clone(),
        };

        match request.response_type.as_deref() {
            Some(RESPONSE_TYPE_CODE) => {}
            Some(_) => return Err(redirect(OAuth2Error::unsupported_response_type())),
            None => return Err(redirect(OAuth2Error::invalid_request("response_type is required"))),
        }
        if !client.allows_grant_type(grant_types::AUTHORIZATION_CODE) {
            return Err(redirect(OAuth2Error::unauthorized_client(
                "Client may not use the authorization_code grant",
            )));
        }

        let prompt = Prompt::parse(request.prompt.as_deref()).map_err(redirect)?;

        let scopes = self
            .authorized_scopes(request.scope.as_deref(), &client)
            .map_err(|e| redirect(e.into()))?;
        let code_challenge = requested_challenge(request).map_err(redirect)?;

        Ok(AuthorizationContext {
            redirect_uri: redirect_uri.to_owned(),
            state: request.state.clone(),
            nonce: request.nonce.clone(),
            client,
            scopes,
            code_challenge,
            prompt,
        })
    }

    /// Handle an authorization request for the browser's current session
    ///
    /// # Errors
    /// Returns an [`AuthorizeError`] for invalid requests and for `prompt=none`
    /// when UI would be required
    pub async fn authorize(
        &self,
        request: &AuthorizeRequest,
        session: Option<&SsoSession>,
    ) -> Result<AuthorizeOutcome, AuthorizeError> {
        let context = self.validate_authorize_request(request).await?;

        let missing = match session {
            Some(session) => {
                let consent = self
                    .consents
                    .current(session.user_id, &context.client.client_id, Utc::now())
                    .await
                    .map_err(|e| context.server_error(&e))?;
                self.consents.missing_scopes(consent.as_ref(), &context.scopes)
            }
            None => context.scopes.clone(),
        };

        let state = state_machine::evaluate(session.is_some(), &context.scopes, &missing, context.prompt)
            .map_err(|e| context.redirect_error(e))?;
        debug!(client_id = %context.client.client_id, ?state, "Authorization decision");

        match (state, session) {
            (AuthorizationState::AutoApproved, Some(session)) => {
                Ok(AuthorizeOutcome::Redirect(self.issue_code(&context, session).await?))
            }
            (AuthorizationState::ConsentRequired { missing }, _) => {
                Ok(AuthorizeOutcome::ConsentRequired {
                    client_id: context.client.client_id,
                    client_name: context.client.client_name,
                    missing,
                })
            }
            _ => Ok(AuthorizeOutcome::LoginRequired),
        }
    }

    /// Record consent for every requested scope and issue a code
    ///
    /// # Errors
    /// Returns an [`AuthorizeError`] if the request no longer validates or storage fails
    pub async fn approve_consent(
        &self,
        request: &AuthorizeRequest,
        session: &SsoSession,
    ) -> Result<String, AuthorizeError> {
        let context = self.validate_authorize_request(request).await?;
        self.consents
            .grant(session.user_id, &context.client.client_id, &context.scopes)
            .await
            .map_err(|e| context.server_error(&e))?;
        self.issue_code(&context, session).await
    }

    /// Redirect URL reporting `access_denied`; no code is issued
    ///
    /// # Errors
    /// Returns an [`AuthorizeError`] if the request no longer validates
    pub async fn deny_consent(&self, request: &AuthorizeRequest) -> Result<String, AuthorizeError> {
        let context = self.validate_authorize_request(request).await?;
        info!(client_id = %context.client.client_id, "User denied consent");
        Ok(OAuth2Error::access_denied().redirect_url(&context.redirect_uri, context.state.as_deref()))
    }

    async fn issue_code(
        &self,
        context: &AuthorizationContext,
        session: &SsoSession,
    ) -> Result<String, AuthorizeError> {
        let now = Utc::now();
        let code = generate_random_string(32).map_err(|e| context.server_error(&e))?;
        let record = AuthorizationCode {
            code: code.clone(),
            client_id: context.client.client_id.clone(),
            user_id: session.user_id,
            redirect_uri: context.redirect_uri.clone(),
            scope: context.scopes.to_string(),
            nonce: context.nonce.clone(),
            code_challenge: context.code_challenge.as_ref().map(|(challenge, _)| challenge.clone()),
            code_challenge_method: context
                .code_challenge
                .as_ref()
                .map(|(_, method)| method.as_str().to_owned()),
            auth_time: session.created_at,
            created_at: now,
            expires_at: now + self.auth_code_ttl,
        };
        self.database
            .store_auth_code(&record)
            .await
            .map_err(|e| context.server_error(&e))?;
        info!(
            client_id = %record.client_id,
            user_id = %record.user_id,
            scope = %record.scope,
            pkce = record.code_challenge.is_some(),
            "Issued authorization code"
        );

        let mut params = vec![("code", code.as_str())];
        if let Some(state) = context.state.as_deref() {
            params.push(("state", state));
        }
        Ok(build_redirect(&context.redirect_uri, &params))
    }

    /// Token endpoint
    ///
    /// # Errors
    /// Returns the RFC 6749 section 5.2 error for the failed check
    pub async fn token(
        &self,
        request: TokenRequest,
        credentials: Option<ClientCredentials>,
    ) -> Result<TokenResponse, OAuth2Error> {
        let grant_type = request
            .grant_type
            .as_deref()
            .ok_or_else(|| OAuth2Error::invalid_request("grant_type is required"))?;
        if !grant_types::SUPPORTED.contains(&grant_type) {
            return Err(OAuth2Error::unsupported_grant_type());
        }

        let credentials = credentials.ok_or_else(OAuth2Error::invalid_client)?;
        let client = self.clients.authenticate(&credentials).await?;
        if !client.allows_grant_type(grant_type) {
            AppLogger::log_security_event(
                "unauthorized_grant_type",
                "low",
                grant_type,
                Some(&client.client_id),
            );
            return Err(OAuth2Error::unauthorized_client(
                "Client may not use this grant type",
            ));
        }

        match grant_type {
            grant_types::AUTHORIZATION_CODE => self.authorization_code_grant(&request, &client).await,
            grant_types::REFRESH_TOKEN => self.refresh_token_grant(&request, &client).await,
            _ => self.client_credentials_grant(&request, &client),
        }
    }

    async fn authorization_code_grant(
        &self,
        request: &TokenRequest,
        client: &OAuthClient,
    ) -> Result<TokenResponse, OAuth2Error> {
        let code = request
            .code
            .as_deref()
            .ok_or_else(|| OAuth2Error::invalid_request("code is required"))?;

        // Deleted before any further check: a failed exchange still burns the code
        let record = self
            .database
            .consume_auth_code(code)
            .await
            .map_err(|e| internal_error(&e))?
            .ok_or_else(|| {
                warn!(client_id = %client.client_id, "Unknown or already used authorization code");
                OAuth2Error::invalid_grant("Invalid or already used authorization code")
            })?;

        if record.client_id != client.client_id {
            AppLogger::log_security_event(
                "code_client_mismatch",
                "high",
                "authorization code presented by another client",
                Some(&client.client_id),
            );
            return Err(OAuth2Error::invalid_grant(
                "Authorization code was issued to another client",
            ));
        }
        if record.is_expired(Utc::now()) {
            return Err(OAuth2Error::invalid_grant("Authorization code expired"));
        }
        if request.redirect_uri.as_deref() != Some(record.redirect_uri.as_str()) {
            return Err(OAuth2Error::invalid_grant(
                "redirect_uri does not match the authorization request",
            ));
        }
        pkce::verify_exchange(
            record.code_challenge.as_deref(),
            record.code_challenge_method.as_deref(),
            request.code_verifier.as_deref(),
        )
        .map_err(|e| {
            warn!(client_id = %client.client_id, error = %e, "PKCE verification failed");
            OAuth2Error::from(e)
        })?;

        let user = self.load_user(record.user_id).await?;
        let subject = user.id.to_string();
        let scopes = ScopeSet::parse(&record.scope);
        let auth_time = record.auth_time.timestamp();

        let (refresh_token, rtid) = if client.allows_grant_type(grant_types::REFRESH_TOKEN) {
            let claims = self
                .tokens
                .refresh_claims(&subject, &client.client_id, &record.scope, Some(auth_time));
            let token = self
                .tokens
                .issue_refresh_token(&claims, self.tokens.format())
                .map_err(encoding_error)?;
            AppLogger::log_token_event(&client.client_id, &subject, "issued", "refresh");
            (Some(token), Some(claims.jti))
        } else {
            (None, None)
        };

        let access_token = self.access_token(&subject, &client.client_id, &scopes, rtid)?;
        let id_token = self.id_token(&user, &client.client_id, &scopes, auth_time, record.nonce)?;
        Ok(self.token_response(access_token, &scopes, refresh_token, id_token))
    }

    async fn refresh_token_grant(
        &self,
        request: &TokenRequest,
        client: &OAuthClient,
    ) -> Result<TokenResponse, OAuth2Error> {
        let token = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| OAuth2Error::invalid_request("refresh_token is required"))?;

        let claims: RefreshTokenClaims = self.tokens.validate(token).map_err(|e| {
            debug!(client_id = %client.client_id, error = %e, "Refresh token rejected");
            OAuth2Error::invalid_grant("Invalid refresh token")
        })?;
        if claims.client_id != client.client_id {
            AppLogger::log_security_event(
                "refresh_client_mismatch",
                "high",
                "refresh token presented by another client",
                Some(&client.client_id),
            );
            return Err(OAuth2Error::invalid_grant("Invalid refresh token"));
        }
        if self
            .database
            .is_any_revoked(&[claims.jti.as_str()])
            .await
            .map_err(|e| internal_error(&e))?
        {
            return Err(OAuth2Error::invalid_grant("Refresh token has been revoked"));
        }

        let original = ScopeSet::parse(&claims.scope);
        let scopes = self
            .registry
            .validate_scope_downgrade(request.scope.as_deref(), &original)?;

        let access_token =
            self.access_token(&claims.sub, &client.client_id, &scopes, Some(claims.jti.clone()))?;
        let id_token = if scopes.contains(scope_names::OPENID) {
            let user_id = Uuid::parse_str(&claims.sub)
                .map_err(|_| OAuth2Error::invalid_grant("Invalid refresh token"))?;
            let user = self.load_user(user_id).await?;
            let auth_time = claims.auth_time.unwrap_or(claims.iat);
            self.id_token(&user, &client.client_id, &scopes, auth_time, None)?
        } else {
            None
        };

        Ok(self.token_response(access_token, &scopes, Some(token.to_owned()), id_token))
    }

    fn client_credentials_grant(
        &self,
        request: &TokenRequest,
        client: &OAuthClient,
    ) -> Result<TokenResponse, OAuth2Error> {
        let mut scopes = self.known_scopes(request.scope.as_deref())?;
        if scopes.is_empty() {
            scopes = client.allowed_scopes.iter().cloned().collect();
        }
        self.registry
            .validate_scope_against_allowed(&scopes, &client.allowed_scopes)
            .into_result()?;

        let access_token = self.access_token(&client.client_id, &client.client_id, &scopes, None)?;
        Ok(self.token_response(access_token, &scopes, None, None))
    }

    /// `OpenID` Connect userinfo for a bearer access token
    ///
    /// # Errors
    /// Returns `invalid_token` for invalid, revoked or non-user tokens and for
    /// tokens without the `openid` scope
    pub async fn userinfo(&self, bearer: &str) -> Result<Map<String, Value>, OAuth2Error> {
        let claims: AccessTokenClaims = self.tokens.validate(bearer).map_err(|e| {
            debug!(error = %e, "Userinfo bearer token rejected");
            OAuth2Error::invalid_token()
        })?;
        let revocation_ids = [Some(claims.jti.as_str()), claims.rtid.as_deref()];
        let revocation_ids: Vec<&str> = revocation_ids.into_iter().flatten().collect();
        if self
            .database
            .is_any_revoked(&revocation_ids)
            .await
            .map_err(|e| internal_error(&e))?
        {
            return Err(OAuth2Error::invalid_token());
        }

        let scopes = ScopeSet::parse(&claims.scope);
        if !scopes.contains(scope_names::OPENID) {
            return Err(OAuth2Error::invalid_token());
        }
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| OAuth2Error::invalid_token())?;
        let user = self
            .database
            .get_user(user_id)
            .await
            .map_err(|e| internal_error(&e))?
            .ok_or_else(OAuth2Error::invalid_token)?;

        Ok(self.claim_filter.userinfo(&claims.sub, &user.profile, &scopes))
    }

    /// Requested scopes for an authorization request: defaults when none are named,
    /// and every scope must be registered and allowed for the client
    fn authorized_scopes(&self, raw: Option<&str>, client: &OAuthClient) -> Result<ScopeSet, ScopeError> {
        let mut scopes = self.known_scopes(raw)?;
        if scopes.is_empty() {
            scopes = self.registry.default_scopes();
        }
        self.registry
            .validate_scope_against_allowed(&scopes, &client.allowed_scopes)
            .into_result()?;
        Ok(scopes)
    }

    /// Registered scopes from a raw scope parameter
    fn known_scopes(&self, raw: Option<&str>) -> Result<ScopeSet, ScopeError> {
        let raw = raw.unwrap_or_default();
        let unknown = self.registry.unknown_scopes(raw);
        if unknown.is_empty() {
            Ok(self.registry.normalize_scope(raw))
        } else {
            Err(ScopeError::Unknown(unknown))
        }
    }

    async fn load_user(&self, user_id: Uuid) -> Result<User, OAuth2Error> {
        self.database
            .get_user(user_id)
            .await
            .map_err(|e| internal_error(&e))?
            .ok_or_else(|| {
                warn!(user_id = %user_id, "Grant references a deleted user");
                OAuth2Error::invalid_grant("User no longer exists")
            })
    }

    fn access_token(
        &self,
        subject: &str,
        client_id: &str,
        scopes: &ScopeSet,
        rtid: Option<String>,
    ) -> Result<String, OAuth2Error> {
        let claims = self
            .tokens
            .access_claims(subject, client_id, &scopes.to_string(), rtid);
        let token = self
            .tokens
            .issue_access_token(&claims, self.tokens.format())
            .map_err(encoding_error)?;
        AppLogger::log_token_event(client_id, subject, "issued", "access");
        Ok(token)
    }

    /// Signed ID token when `openid` was granted
    fn id_token(
        &self,
        user: &User,
        client_id: &str,
        scopes: &ScopeSet,
        auth_time: i64,
        nonce: Option<String>,
    ) -> Result<Option<String>, OAuth2Error> {
        if !scopes.contains(scope_names::OPENID) {
            return Ok(None);
        }
        let profile_claims = self.claim_filter.profile_claims(&user.profile, scopes);
        let subject = user.id.to_string();
        let claims = self
            .tokens
            .id_claims(&subject, client_id, auth_time, nonce, profile_claims);
        let token = self
            .tokens
            .issue_id_token(&claims, TokenFormat::Jwt)
            .map_err(encoding_error)?;
        AppLogger::log_token_event(client_id, &subject, "issued", "id");
        Ok(Some(token))
    }

    fn token_response(
        &self,
        access_token: String,
        scopes: &ScopeSet,
        refresh_token: Option<String>,
        id_token: Option<String>,
    ) -> TokenResponse {
        TokenResponse {
            access_token,
            token_type: TOKEN_TYPE_BEARER.to_owned(),
            expires_in: self.tokens.lifetimes().access_secs,
            scope: scopes.to_string(),
            refresh_token,
            id_token,
        }
    }
}

/// PKCE parameters from an authorization request
fn requested_challenge(
    request: &AuthorizeRequest,
) -> Result<Option<(String, CodeChallengeMethod)>, OAuth2Error> {
    match (
        request.code_challenge.as_deref(),
        request.code_challenge_method.as_deref(),
    ) {
        (Some(challenge), method) => {
            let method = pkce::validate_challenge(challenge, method)?;
            Ok(Some((challenge.to_owned(), method)))
        }
        (None, Some(_)) => Err(OAuth2Error::invalid_request(
            "code_challenge_method requires code_challenge",
        )),
        (None, None) => Ok(None),
    }
}

pub(super) fn internal_error(cause: &AppError) -> OAuth2Error {
    error!(error = %cause, "OAuth2 request failed");
    OAuth2Error::server_error()
}

fn encoding_error(cause: TokenError) -> OAuth2Error {
    error!(error = %cause, "Token encoding failed");
    OAuth2Error::server_error()
}
