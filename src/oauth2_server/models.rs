// ABOUTME: OAuth 2.0 / OpenID Connect request and response structures and the protocol error type
// ABOUTME: Covers authorize, token, introspection and revocation plus RFC 6749 error responses
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::error::Error;
use std::fmt;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use url::Url;

use super::pkce::PkceError;
use crate::scopes::ScopeError;

/// Authorization request (`GET /oauth/authorize`).
///
/// Every field is optional so missing parameters are reported as protocol
/// errors instead of extractor rejections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    /// Must be `code`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
    /// Client identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Must exactly match a registered redirect URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    /// Space-separated requested scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Opaque client state echoed on redirect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// `OpenID` Connect nonce copied into the ID token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// PKCE challenge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    /// PKCE method (`plain` or `S256`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,
    /// Space-separated `none`, `login`, `consent`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl AuthorizeRequest {
    /// URL-encoded query string for the request
    #[must_use]
    pub fn to_query_string(&self) -> String {
        serde_urlencoded::to_string(self).unwrap_or_default()
    }

    /// Copy of the request with `value` removed from `prompt`
    #[must_use]
    pub fn without_prompt(&self, value: &str) -> Self {
        let prompt = self.prompt.as_deref().map(|prompt| {
            prompt
                .split_whitespace()
                .filter(|p| *p != value)
                .collect::<Vec<_>>()
                .join(" ")
        });
        Self {
            prompt: prompt.filter(|p| !p.is_empty()),
            ..self.clone()
        }
    }
}

/// Token request (`POST /oauth/token`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    /// `authorization_code`, `refresh_token` or `client_credentials`
    pub grant_type: Option<String>,
    /// Authorization code
    pub code: Option<String>,
    /// Redirect URI used at authorization
    pub redirect_uri: Option<String>,
    /// Client id (when not sent with HTTP Basic)
    pub client_id: Option<String>,
    /// Client secret (when not sent with HTTP Basic)
    pub client_secret: Option<String>,
    /// Requested scope for refresh or client credentials
    pub scope: Option<String>,
    /// Refresh token
    pub refresh_token: Option<String>,
    /// PKCE verifier
    pub code_verifier: Option<String>,
}

/// Token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token
    pub access_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Granted scope
    pub scope: String,
    /// Refresh token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// ID token when `openid` was granted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// Introspection (RFC 7662) or revocation (RFC 7009) request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenOperationRequest {
    /// Token to inspect or revoke
    pub token: Option<String>,
    /// `access_token` or `refresh_token`; advisory only
    pub token_type_hint: Option<String>,
    /// Client id (when not sent with HTTP Basic)
    pub client_id: Option<String>,
    /// Client secret (when not sent with HTTP Basic)
    pub client_secret: Option<String>,
}

/// Introspection response; inactive tokens carry only `active: false`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    /// Whether the token is currently usable
    pub active: bool,
    /// Granted scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Client the token was issued to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Audience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Token id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// `access_token`, `refresh_token` or `id_token`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl IntrospectionResponse {
    /// `{"active": false}`
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }
}

/// RFC 6749 / OIDC error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuth2ErrorCode {
    /// Malformed or missing parameter
    InvalidRequest,
    /// Client authentication failed
    InvalidClient,
    /// Bad code, PKCE verifier or refresh token
    InvalidGrant,
    /// Client may not use this grant or response type
    UnauthorizedClient,
    /// Grant type unknown
    UnsupportedGrantType,
    /// Response type unknown
    UnsupportedResponseType,
    /// Unknown or unauthorized scope
    InvalidScope,
    /// User denied consent
    AccessDenied,
    /// `prompt=none` without a session
    LoginRequired,
    /// `prompt=none` without sufficient consent
    ConsentRequired,
    /// Bearer token rejected
    InvalidToken,
    /// Unexpected server failure
    ServerError,
}

impl OAuth2ErrorCode {
    /// Wire value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::InvalidScope => "invalid_scope",
            Self::AccessDenied => "access_denied",
            Self::LoginRequired => "login_required",
            Self::ConsentRequired => "consent_required",
            Self::InvalidToken => "invalid_token",
            Self::ServerError => "server_error",
        }
    }

    /// Status used when the error is returned directly rather than by redirect
    #[must_use]
    pub const fn http_status(self) -> StatusCode {
        match self {
            Self::InvalidClient | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for OAuth2ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OAuth 2.0 error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2Error {
    /// Error code
    pub error: OAuth2ErrorCode,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// Link to the relevant RFC section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

const RFC6749_AUTHORIZE_ERRORS: &str = "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1";
const RFC6749_TOKEN_ERRORS: &str = "https://datatracker.ietf.org/doc/html/rfc6749#section-5.2";
const RFC6750_ERRORS: &str = "https://datatracker.ietf.org/doc/html/rfc6750#section-3.1";

impl OAuth2Error {
    fn new(error: OAuth2ErrorCode, description: impl Into<String>, uri: Option<&str>) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
            error_uri: uri.map(str::to_owned),
        }
    }

    /// `invalid_request`
    #[must_use]
    pub fn invalid_request(description: &str) -> Self {
        Self::new(OAuth2ErrorCode::InvalidRequest, description, Some(RFC6749_AUTHORIZE_ERRORS))
    }

    /// `invalid_client`
    #[must_use]
    pub fn invalid_client() -> Self {
        Self::new(
            OAuth2ErrorCode::InvalidClient,
            "Client authentication failed",
            Some(RFC6749_TOKEN_ERRORS),
        )
    }

    /// `invalid_grant`
    #[must_use]
    pub fn invalid_grant(description: &str) -> Self {
        Self::new(OAuth2ErrorCode::InvalidGrant, description, Some(RFC6749_TOKEN_ERRORS))
    }

    /// `unauthorized_client`
    #[must_use]
    pub fn unauthorized_client(description: &str) -> Self {
        Self::new(OAuth2ErrorCode::UnauthorizedClient, description, Some(RFC6749_TOKEN_ERRORS))
    }

    /// `unsupported_grant_type`
    #[must_use]
    pub fn unsupported_grant_type() -> Self {
        Self::new(
            OAuth2ErrorCode::UnsupportedGrantType,
            "Grant type not supported",
            Some(RFC6749_TOKEN_ERRORS),
        )
    }

    /// `unsupported_response_type`
    #[must_use]
    pub fn unsupported_response_type() -> Self {
        Self::new(
            OAuth2ErrorCode::UnsupportedResponseType,
            "Only the 'code' response_type is supported",
            Some(RFC6749_AUTHORIZE_ERRORS),
        )
    }

    /// `invalid_scope`
    #[must_use]
    pub fn invalid_scope(description: &str) -> Self {
        Self::new(OAuth2ErrorCode::InvalidScope, description, Some(RFC6749_AUTHORIZE_ERRORS))
    }

    /// `access_denied`
    #[must_use]
    pub fn access_denied() -> Self {
        Self::new(
            OAuth2ErrorCode::AccessDenied,
            "The user denied the request",
            Some(RFC6749_AUTHORIZE_ERRORS),
        )
    }

    /// `login_required`
    #[must_use]
    pub fn login_required() -> Self {
        Self::new(OAuth2ErrorCode::LoginRequired, "User authentication is required", None)
    }

    /// `consent_required`
    #[must_use]
    pub fn consent_required() -> Self {
        Self::new(OAuth2ErrorCode::ConsentRequired, "User consent is required", None)
    }

    /// `invalid_token`
    #[must_use]
    pub fn invalid_token() -> Self {
        Self::new(
            OAuth2ErrorCode::InvalidToken,
            "The access token is invalid or expired",
            Some(RFC6750_ERRORS),
        )
    }

    /// `server_error`; the cause is logged by the caller, never returned
    #[must_use]
    pub fn server_error() -> Self {
        Self::new(OAuth2ErrorCode::ServerError, "Internal server error", None)
    }

    /// Status for a direct (non-redirect) response
    #[must_use]
    pub const fn http_status(&self) -> StatusCode {
        self.error.http_status()
    }

    /// `redirect_uri` with `error`, `error_description` and `state` appended
    #[must_use]
    pub fn redirect_url(&self, redirect_uri: &str, state: Option<&str>) -> String {
        let mut params = vec![("error", self.error.as_str())];
        if let Some(description) = &self.error_description {
            params.push(("error_description", description));
        }
        if let Some(state) = state {
            params.push(("state", state));
        }
        build_redirect(redirect_uri, &params)
    }
}

impl fmt::Display for OAuth2Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {description}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

impl Error for OAuth2Error {}

impl IntoResponse for OAuth2Error {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let challenge = match self.error {
            OAuth2ErrorCode::InvalidClient => Some(HeaderValue::from_static("Basic realm=\"oauth\"")),
            OAuth2ErrorCode::InvalidToken => {
                Some(HeaderValue::from_static("Bearer error=\"invalid_token\""))
            }
            _ => None,
        };
        let mut response = (status, Json(self)).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        if let Some(challenge) = challenge {
            headers.insert(header::WWW_AUTHENTICATE, challenge);
        }
        response
    }
}

impl From<ScopeError> for OAuth2Error {
    fn from(error: ScopeError) -> Self {
        Self::invalid_scope(&error.to_string())
    }
}

impl From<PkceError> for OAuth2Error {
    fn from(error: PkceError) -> Self {
        match error {
            PkceError::UnsupportedMethod(_) | PkceError::InvalidChallenge => {
                Self::invalid_request(&error.to_string())
            }
            _ => Self::invalid_grant(&error.to_string()),
        }
    }
}

/// Append query parameters to `redirect_uri`, keeping any query it already has
#[must_use]
pub fn build_redirect(redirect_uri: &str, params: &[(&str, &str)]) -> String {
    match Url::parse(redirect_uri) {
        Ok(mut url) => {
            url.query_pairs_mut().extend_pairs(params);
            url.into()
        }
        Err(_) => {
            let query = serde_urlencoded::to_string(params).unwrap_or_default();
            let separator = if redirect_uri.contains('?') { '&' } else { '?' };
            format!("{redirect_uri}{separator}{query}")
        }
    }
}
