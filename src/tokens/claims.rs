// ABOUTME: Claim sets carried by access, refresh and ID tokens
// ABOUTME: Access token claims have no profile fields; ID token profile claims come pre-filtered
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::iter;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::TokenKind;

/// Behaviour shared by every claim set the token engine can encode
pub trait TokenClaims: Serialize + DeserializeOwned {
    /// `token_use` value this claim set must carry
    const KIND: TokenKind;

    /// Expiry, seconds since epoch
    fn expires_at(&self) -> i64;

    /// Unique token identifier
    fn jti(&self) -> &str;
}

/// Access token claims.
///
/// Carries no profile fields: user attributes are only released
/// through ID tokens and the userinfo endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Issuer
    pub iss: String,
    /// Subject (user id, or client id for `client_credentials`)
    pub sub: String,
    /// Audience
    pub aud: String,
    /// Expiry
    pub exp: i64,
    /// Issued at
    pub iat: i64,
    /// Unique token id
    pub jti: String,
    /// Always [`TokenKind::Access`]
    pub token_use: TokenKind,
    /// Space-separated granted scopes
    pub scope: String,
    /// Client the token was issued to
    pub client_id: String,
    /// `jti` of the refresh token this access token was minted alongside or from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtid: Option<String>,
}

impl TokenClaims for AccessTokenClaims {
    const KIND: TokenKind = TokenKind::Access;

    fn expires_at(&self) -> i64 {
        self.exp
    }

    fn jti(&self) -> &str {
        &self.jti
    }
}

/// Refresh token claims; `scope` is the scope originally granted at authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    /// Issuer
    pub iss: String,
    /// Subject (user id)
    pub sub: String,
    /// Audience
    pub aud: String,
    /// Expiry
    pub exp: i64,
    /// Issued at
    pub iat: i64,
    /// Unique token id
    pub jti: String,
    /// Always [`TokenKind::Refresh`]
    pub token_use: TokenKind,
    /// Originally granted scopes
    pub scope: String,
    /// Client the token was issued to
    pub client_id: String,
    /// When the user authenticated, carried into refreshed ID tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,
}

impl TokenClaims for RefreshTokenClaims {
    const KIND: TokenKind = TokenKind::Refresh;

    fn expires_at(&self) -> i64 {
        self.exp
    }

    fn jti(&self) -> &str {
        &self.jti
    }
}

/// `OpenID` Connect ID token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer
    pub iss: String,
    /// Subject (user id)
    pub sub: String,
    /// Audience (the client id)
    pub aud: String,
    /// Expiry
    pub exp: i64,
    /// Issued at
    pub iat: i64,
    /// Unique token id
    pub jti: String,
    /// Always [`TokenKind::Id`]
    pub token_use: TokenKind,
    /// Authorized party (the client id)
    pub azp: String,
    /// When the user authenticated
    pub auth_time: i64,
    /// Nonce from the authorization request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Profile claims already filtered by granted scope
    #[serde(flatten)]
    pub profile_claims: Map<String, Value>,
}

impl TokenClaims for IdTokenClaims {
    const KIND: TokenKind = TokenKind::Id;

    fn expires_at(&self) -> i64 {
        self.exp
    }

    fn jti(&self) -> &str {
        &self.jti
    }
}

/// Claims of any validated token, tagged by kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedToken {
    /// Access token
    Access(AccessTokenClaims),
    /// Refresh token
    Refresh(RefreshTokenClaims),
    /// ID token
    Id(IdTokenClaims),
}

impl ValidatedToken {
    /// Kind of the token
    #[must_use]
    pub const fn kind(&self) -> TokenKind {
        match self {
            Self::Access(_) => TokenKind::Access,
            Self::Refresh(_) => TokenKind::Refresh,
            Self::Id(_) => TokenKind::Id,
        }
    }

    /// Unique token id
    #[must_use]
    pub fn jti(&self) -> &str {
        match self {
            Self::Access(c) => &c.jti,
            Self::Refresh(c) => &c.jti,
            Self::Id(c) => &c.jti,
        }
    }

    /// Client the token belongs to
    #[must_use]
    pub fn client_id(&self) -> &str {
        match self {
            Self::Access(c) => &c.client_id,
            Self::Refresh(c) => &c.client_id,
            Self::Id(c) => &c.azp,
        }
    }

    /// Subject
    #[must_use]
    pub fn sub(&self) -> &str {
        match self {
            Self::Access(c) => &c.sub,
            Self::Refresh(c) => &c.sub,
            Self::Id(c) => &c.sub,
        }
    }

    /// Granted scope, absent for ID tokens
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        match self {
            Self::Access(c) => Some(&c.scope),
            Self::Refresh(c) => Some(&c.scope),
            Self::Id(_) => None,
        }
    }

    /// Expiry
    #[must_use]
    pub const fn exp(&self) -> i64 {
        match self {
            Self::Access(c) => c.exp,
            Self::Refresh(c) => c.exp,
            Self::Id(c) => c.exp,
        }
    }

    /// Issued at
    #[must_use]
    pub const fn iat(&self) -> i64 {
        match self {
            Self::Access(c) => c.iat,
            Self::Refresh(c) => c.iat,
            Self::Id(c) => c.iat,
        }
    }

    /// Issuer
    #[must_use]
    pub fn iss(&self) -> &str {
        match self {
            Self::Access(c) => &c.iss,
            Self::Refresh(c) => &c.iss,
            Self::Id(c) => &c.iss,
        }
    }

    /// Audience
    #[must_use]
    pub fn aud(&self) -> &str {
        match self {
            Self::Access(c) => &c.aud,
            Self::Refresh(c) => &c.aud,
            Self::Id(c) => &c.aud,
        }
    }

    /// `jti` values whose revocation also revokes this token
    #[must_use]
    pub fn revocation_ids(&self) -> Vec<&str> {
        match self {
            Self::Access(c) => iter::once(c.jti.as_str())
                .chain(c.rtid.as_deref())
                .collect(),
            Self::Refresh(c) => vec![c.jti.as_str()],
            Self::Id(c) => vec![c.jti.as_str()],
        }
    }
}
