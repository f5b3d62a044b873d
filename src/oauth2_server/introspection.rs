// ABOUTME: Token introspection (RFC 7662) and revocation (RFC 7009)
// ABOUTME: Callers only see tokens issued to themselves; revoking a refresh token cascades through rtid
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use chrono::{DateTime, Utc};
use sso_core::constants::token_type_hints;
use sso_core::models::RevokedToken;
use tracing::{debug, warn};

use super::client_registration::ClientCredentials;
use super::endpoints::{internal_error, OAuth2AuthorizationServer};
use super::models::{IntrospectionResponse, OAuth2Error, TokenOperationRequest};
use crate::logging::AppLogger;
use crate::tokens::{TokenKind, ValidatedToken};

/// `token_type` reported by introspection
const fn token_type_name(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Access => token_type_hints::ACCESS_TOKEN,
        TokenKind::Refresh => token_type_hints::REFRESH_TOKEN,
        TokenKind::Id => "id_token",
    }
}

impl OAuth2AuthorizationServer {
    /// Describe a token to the client it was issued to.
    ///
    /// Invalid, expired, revoked and foreign tokens all yield `{"active": false}`.
    ///
    /// # Errors
    /// Returns `invalid_client` when the caller fails authentication and
    /// `invalid_request` when no token is supplied
    pub async fn introspect(
        &self,
        request: &TokenOperationRequest,
        credentials: Option<ClientCredentials>,
    ) -> Result<IntrospectionResponse, OAuth2Error> {
        let credentials = credentials.ok_or_else(OAuth2Error::invalid_client)?;
        let client = self.clients().authenticate(&credentials).await?;
        let token = request
            .token
            .as_deref()
            .ok_or_else(|| OAuth2Error::invalid_request("token is required"))?;

        let validated = match self.tokens().validate_any(token) {
            Ok(validated) => validated,
            Err(e) => {
                debug!(client_id = %client.client_id, error = %e, "Introspected token is not valid");
                return Ok(IntrospectionResponse::inactive());
            }
        };
        if validated.client_id() != client.client_id {
            warn!(client_id = %client.client_id, "Introspection of a token issued to another client");
            return Ok(IntrospectionResponse::inactive());
        }
        if self
            .database()
            .is_any_revoked(&validated.revocation_ids())
            .await
            .map_err(|e| internal_error(&e))?
        {
            return Ok(IntrospectionResponse::inactive());
        }

        Ok(active_response(&validated))
    }

    /// Revoke a token. Unknown, invalid and already revoked tokens succeed silently.
    ///
    /// # Errors
    /// Returns `invalid_client` when the caller fails authentication and
    /// `invalid_request` when no token is supplied
    pub async fn revoke(
        &self,
        request: &TokenOperationRequest,
        credentials: Option<ClientCredentials>,
    ) -> Result<(), OAuth2Error> {
        let credentials = credentials.ok_or_else(OAuth2Error::invalid_client)?;
        let client = self.clients().authenticate(&credentials).await?;
        let token = request
            .token
            .as_deref()
            .ok_or_else(|| OAuth2Error::invalid_request("token is required"))?;

        let validated = match self.tokens().validate_any(token) {
            Ok(validated) => validated,
            Err(e) => {
                debug!(client_id = %client.client_id, error = %e, "Revocation of an invalid token ignored");
                return Ok(());
            }
        };
        if validated.client_id() != client.client_id {
            AppLogger::log_security_event(
                "foreign_token_revocation",
                "medium",
                "revocation requested for a token issued to another client",
                Some(&client.client_id),
            );
            return Ok(());
        }

        let now = Utc::now();
        let revoked = RevokedToken {
            jti: validated.jti().to_owned(),
            token_use: validated.kind().as_str().to_owned(),
            client_id: client.client_id.clone(),
            revoked_at: now,
            expires_at: DateTime::from_timestamp(self.revocation_expiry(&validated), 0)
                .unwrap_or(now),
        };
        let newly_revoked = self
            .database()
            .revoke_token(&revoked)
            .await
            .map_err(|e| internal_error(&e))?;
        if newly_revoked {
            AppLogger::log_token_event(
                &client.client_id,
                validated.sub(),
                "revoked",
                validated.kind().as_str(),
            );
        }
        Ok(())
    }

    /// Unix time after which a revocation row no longer matters.
    ///
    /// A refresh token's row also covers access tokens linked through `rtid`,
    /// and the last of those can be minted just before the refresh token expires.
    fn revocation_expiry(&self, token: &ValidatedToken) -> i64 {
        match token.kind() {
            TokenKind::Refresh => token
                .exp()
                .saturating_add(self.tokens().lifetimes().access_secs),
            TokenKind::Access | TokenKind::Id => token.exp(),
        }
    }
}

fn active_response(token: &ValidatedToken) -> IntrospectionResponse {
    IntrospectionResponse {
        active: true,
        scope: token.scope().map(str::to_owned),
        client_id: Some(token.client_id().to_owned()),
        sub: Some(token.sub().to_owned()),
        exp: Some(token.exp()),
        iat: Some(token.iat()),
        iss: Some(token.iss().to_owned()),
        aud: Some(token.aud().to_owned()),
        jti: Some(token.jti().to_owned()),
        token_type: Some(token_type_name(token.kind()).to_owned()),
    }
}
