// ABOUTME: Token engine issuing and validating access, refresh and ID tokens
// ABOUTME: Tokens are RS256 JWTs or RSA-OAEP-256/A256GCM JWEs, classified structurally on validation
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Token Engine
//!
//! Tokens are self-contained bearer strings and are never persisted. Every
//! token carries `iss`, `sub`, `aud`, `exp`, `iat`, `jti` and a `token_use`
//! discriminator so an access token can never be replayed as a refresh token.
//!
//! Validation classifies the bearer string by segment count (three for a
//! JWS, five for a JWE), opens it with the key store, and then applies one
//! expiry rule and one `token_use` rule to the decoded payload.
//!
//! Detailed failure reasons are kept in [`TokenError`] for logging; protocol
//! handlers collapse all of them to `invalid_token` / `invalid_grant`.

/// Claim sets for each token kind
pub mod claims;
mod jwe;
mod jwt;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::config::TokenConfig;
use crate::crypto::KeyStore;

pub use claims::{AccessTokenClaims, IdTokenClaims, RefreshTokenClaims, TokenClaims, ValidatedToken};

/// Wire format used when issuing tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenFormat {
    /// Signed compact JWS (RS256)
    #[default]
    Jwt,
    /// Encrypted compact JWE (RSA-OAEP-256 + A256GCM)
    Jwe,
}

impl fmt::Display for TokenFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jwt => write!(f, "jwt"),
            Self::Jwe => write!(f, "jwe"),
        }
    }
}

impl FromStr for TokenFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jwt" | "jws" => Ok(Self::Jwt),
            "jwe" => Ok(Self::Jwe),
            other => Err(format!("unknown token format '{other}', expected jwt or jwe")),
        }
    }
}

/// `token_use` discriminator carried in every token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Access token
    Access,
    /// Refresh token
    Refresh,
    /// ID token
    Id,
}

impl TokenKind {
    /// Wire value of the `token_use` claim
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::Id => "id",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Internal token failure reasons; logged, never returned to clients
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Header names an algorithm other than the one expected
    #[error("unexpected algorithm: {0}")]
    WrongAlgorithm(String),
    /// Signature does not verify
    #[error("signature verification failed")]
    BadSignature,
    /// JWE could not be decrypted or authenticated
    #[error("decryption failed: {0}")]
    Decryption(String),
    /// `exp` is in the past
    #[error("token expired")]
    Expired,
    /// Token issued by someone else
    #[error("issuer mismatch")]
    WrongIssuer,
    /// Structure or payload cannot be parsed
    #[error("malformed token: {0}")]
    Malformed(String),
    /// Valid token of a different kind than the caller expected
    #[error("expected {expected} token, found {found}")]
    WrongKind {
        /// Kind the caller asked for
        expected: TokenKind,
        /// Kind found in `token_use`
        found: String,
    },
    /// Token could not be produced
    #[error("token encoding failed: {0}")]
    Encoding(String),
}

/// Bearer string classified by its compact serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BearerToken<'a> {
    /// Three segments: signed JWS
    Jwt(&'a str),
    /// Five segments: encrypted JWE
    Jwe(&'a str),
}

impl<'a> BearerToken<'a> {
    /// Classify `token` by segment count
    ///
    /// # Errors
    /// Returns [`TokenError::Malformed`] when the token is neither shape
    pub fn classify(token: &'a str) -> Result<Self, TokenError> {
        if is_jwt(token) {
            Ok(Self::Jwt(token))
        } else if is_jwe(token) {
            Ok(Self::Jwe(token))
        } else {
            Err(TokenError::Malformed(format!(
                "bearer token has {} segments",
                token.split('.').count()
            )))
        }
    }
}

/// Three dot-separated segments with a non-empty header and payload
#[must_use]
pub fn is_jwt(token: &str) -> bool {
    let segments: Vec<&str> = token.split('.').collect();
    segments.len() == 3 && !segments[0].is_empty() && !segments[1].is_empty()
}

/// Five dot-separated segments with non-empty header, IV and ciphertext
#[must_use]
pub fn is_jwe(token: &str) -> bool {
    let segments: Vec<&str> = token.split('.').collect();
    segments.len() == 5
        && !segments[0].is_empty()
        && !segments[2].is_empty()
        && !segments[3].is_empty()
}

/// Lifetimes applied when building claim sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    /// Access token lifetime in seconds
    pub access_secs: i64,
    /// Refresh token lifetime in seconds
    pub refresh_secs: i64,
    /// ID token lifetime in seconds
    pub id_secs: i64,
}

impl From<&TokenConfig> for TokenLifetimes {
    fn from(config: &TokenConfig) -> Self {
        Self {
            access_secs: config.access_ttl_secs,
            refresh_secs: config.refresh_ttl_secs,
            id_secs: config.id_ttl_secs,
        }
    }
}

/// Issues and validates tokens with a shared, immutable key store
#[derive(Debug, Clone)]
pub struct TokenEngine {
    keys: Arc<KeyStore>,
    issuer: String,
    format: TokenFormat,
    lifetimes: TokenLifetimes,
}

impl TokenEngine {
    /// Create an engine issuing tokens for `issuer`
    #[must_use]
    pub fn new(
        keys: Arc<KeyStore>,
        issuer: impl Into<String>,
        format: TokenFormat,
        lifetimes: TokenLifetimes,
    ) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            format,
            lifetimes,
        }
    }

    /// `iss` stamped on and required of every token
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Configured format for access and refresh tokens
    #[must_use]
    pub const fn format(&self) -> TokenFormat {
        self.format
    }

    /// Configured lifetimes
    #[must_use]
    pub const fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    /// Build access token claims starting now
    #[must_use]
    pub fn access_claims(
        &self,
        subject: &str,
        client_id: &str,
        scope: &str,
        rtid: Option<String>,
    ) -> AccessTokenClaims {
        let now = Utc::now().timestamp();
        AccessTokenClaims {
            iss: self.issuer.clone(),
            sub: subject.to_owned(),
            aud: client_id.to_owned(),
            exp: now + self.lifetimes.access_secs,
            iat: now,
            jti: Uuid::new_v4().to_string(),
            token_use: TokenKind::Access,
            scope: scope.to_owned(),
            client_id: client_id.to_owned(),
            rtid,
        }
    }

    /// Build refresh token claims starting now
    #[must_use]
    pub fn refresh_claims(
        &self,
        subject: &str,
        client_id: &str,
        scope: &str,
        auth_time: Option<i64>,
    ) -> RefreshTokenClaims {
        let now = Utc::now().timestamp();
        RefreshTokenClaims {
            iss: self.issuer.clone(),
            sub: subject.to_owned(),
            aud: client_id.to_owned(),
            exp: now + self.lifetimes.refresh_secs,
            iat: now,
            jti: Uuid::new_v4().to_string(),
            token_use: TokenKind::Refresh,
            scope: scope.to_owned(),
            client_id: client_id.to_owned(),
            auth_time,
        }
    }

    /// Build ID token claims starting now; `profile_claims` must already be scope-filtered
    #[must_use]
    pub fn id_claims(
        &self,
        subject: &str,
        client_id: &str,
        auth_time: i64,
        nonce: Option<String>,
        profile_claims: Map<String, Value>,
    ) -> IdTokenClaims {
        let now = Utc::now().timestamp();
        IdTokenClaims {
            iss: self.issuer.clone(),
            sub: subject.to_owned(),
            aud: client_id.to_owned(),
            exp: now + self.lifetimes.id_secs,
            iat: now,
            jti: Uuid::new_v4().to_string(),
            token_use: TokenKind::Id,
            azp: client_id.to_owned(),
            auth_time,
            nonce,
            profile_claims,
        }
    }

    /// Encode an access token
    ///
    /// # Errors
    /// Returns [`TokenError::Encoding`] if signing or encryption fails
    pub fn issue_access_token(
        &self,
        claims: &AccessTokenClaims,
        format: TokenFormat,
    ) -> Result<String, TokenError> {
        self.encode(claims, format)
    }

    /// Encode a refresh token
    ///
    /// # Errors
    /// Returns [`TokenError::Encoding`] if signing or encryption fails
    pub fn issue_refresh_token(
        &self,
        claims: &RefreshTokenClaims,
        format: TokenFormat,
    ) -> Result<String, TokenError> {
        self.encode(claims, format)
    }

    /// Encode an ID token
    ///
    /// # Errors
    /// Returns [`TokenError::Encoding`] if signing or encryption fails
    pub fn issue_id_token(
        &self,
        claims: &IdTokenClaims,
        format: TokenFormat,
    ) -> Result<String, TokenError> {
        self.encode(claims, format)
    }

    /// Encode any claim set in the requested format
    ///
    /// # Errors
    /// Returns [`TokenError::Encoding`] if signing or encryption fails
    pub fn encode<C: TokenClaims>(
        &self,
        claims: &C,
        format: TokenFormat,
    ) -> Result<String, TokenError> {
        match format {
            TokenFormat::Jwt => jwt::sign(&self.keys, claims),
            TokenFormat::Jwe => {
                let payload =
                    serde_json::to_vec(claims).map_err(|e| TokenError::Encoding(e.to_string()))?;
                jwe::encrypt(&self.keys, &payload)
            }
        }
    }

    /// Validate `token` as a token of kind `C`
    ///
    /// # Errors
    /// Returns the reason the token was rejected
    pub fn validate<C: TokenClaims>(&self, token: &str) -> Result<C, TokenError> {
        let payload = self.open(token)?;
        let found = token_use(&payload)?;
        if found != C::KIND.as_str() {
            return Err(TokenError::WrongKind {
                expected: C::KIND,
                found: found.to_owned(),
            });
        }
        serde_json::from_value(payload).map_err(|e| TokenError::Malformed(e.to_string()))
    }

    /// Validate a token of any kind
    ///
    /// # Errors
    /// Returns the reason the token was rejected
    pub fn validate_any(&self, token: &str) -> Result<ValidatedToken, TokenError> {
        let payload = self.open(token)?;
        let kind = match token_use(&payload)? {
            "access" => TokenKind::Access,
            "refresh" => TokenKind::Refresh,
            "id" => TokenKind::Id,
            other => return Err(TokenError::Malformed(format!("unknown token_use '{other}'"))),
        };
        let malformed = |e: serde_json::Error| TokenError::Malformed(e.to_string());
        Ok(match kind {
            TokenKind::Access => ValidatedToken::Access(serde_json::from_value(payload).map_err(malformed)?),
            TokenKind::Refresh => ValidatedToken::Refresh(serde_json::from_value(payload).map_err(malformed)?),
            TokenKind::Id => ValidatedToken::Id(serde_json::from_value(payload).map_err(malformed)?),
        })
    }

    /// Verify or decrypt the token, then apply issuer and expiry checks
    fn open(&self, token: &str) -> Result<Value, TokenError> {
        let payload = match BearerToken::classify(token)? {
            BearerToken::Jwt(jws) => jwt::verify(&self.keys, jws, &self.issuer)?,
            BearerToken::Jwe(jwe) => {
                let plaintext = jwe::decrypt(&self.keys, jwe)?;
                let payload: Value = serde_json::from_slice(&plaintext)
                    .map_err(|e| TokenError::Malformed(format!("JWE payload is not JSON: {e}")))?;
                if payload.get("iss").and_then(Value::as_str) != Some(self.issuer.as_str()) {
                    return Err(TokenError::WrongIssuer);
                }
                payload
            }
        };

        let exp = payload
            .get("exp")
            .and_then(Value::as_i64)
            .ok_or_else(|| TokenError::Malformed("missing exp".to_owned()))?;
        if exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(payload)
    }
}

fn token_use(payload: &Value) -> Result<&str, TokenError> {
    payload
        .get("token_use")
        .and_then(Value::as_str)
        .ok_or_else(|| TokenError::Malformed("missing token_use".to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use std::sync::OnceLock;

    const ISSUER: &str = "https://sso.example.test";

    fn shared_keys() -> Arc<KeyStore> {
        static KEYS: OnceLock<Arc<KeyStore>> = OnceLock::new();
        KEYS.get_or_init(|| Arc::new(KeyStore::generate("unit-test-key", 2048).unwrap()))
            .clone()
    }

    fn engine() -> TokenEngine {
        TokenEngine::new(
            shared_keys(),
            ISSUER,
            TokenFormat::Jwt,
            TokenLifetimes {
                access_secs: 3600,
                refresh_secs: 86_400,
                id_secs: 3600,
            },
        )
    }

    #[test]
    fn test_bearer_classification() {
        assert!(is_jwt("a.b.c"));
        assert!(is_jwt("a.b."));
        assert!(!is_jwt("a.b.c.d.e"));
        assert!(is_jwe("a.b.c.d."));
        assert!(!is_jwe("a.b.c"));
        assert!(BearerToken::classify("opaque-token").is_err());
        assert_eq!(BearerToken::classify("a.b.c").unwrap(), BearerToken::Jwt("a.b.c"));
    }

    #[test]
    fn test_access_token_round_trip_both_formats() {
        let engine = engine();
        let claims = engine.access_claims("user-1", "client-1", "openid profile", Some("r1".to_owned()));
        for format in [TokenFormat::Jwt, TokenFormat::Jwe] {
            let token = engine.issue_access_token(&claims, format).unwrap();
            match format {
                TokenFormat::Jwt => assert!(is_jwt(&token)),
                TokenFormat::Jwe => {
                    assert!(is_jwe(&token));
                    assert!(token.ends_with('.'));
                }
            }
            let decoded: AccessTokenClaims = engine.validate(&token).unwrap();
            assert_eq!(decoded, claims);
        }
    }

    #[test]
    fn test_jwe_uses_fresh_cek_per_token() {
        let engine = engine();
        let claims = engine.access_claims("user-1", "client-1", "openid", None);
        let first = engine.issue_access_token(&claims, TokenFormat::Jwe).unwrap();
        let second = engine.issue_access_token(&claims, TokenFormat::Jwe).unwrap();
        let key_segment = |t: &str| t.split('.').nth(1).unwrap().to_owned();
        assert_ne!(key_segment(&first), key_segment(&second));
    }

    #[test]
    fn test_expired_token_rejected() {
        let engine = engine();
        let mut claims = engine.access_claims("user-1", "client-1", "openid", None);
        claims.exp = Utc::now().timestamp() - 1;
        for format in [TokenFormat::Jwt, TokenFormat::Jwe] {
            let token = engine.issue_access_token(&claims, format).unwrap();
            assert_eq!(
                engine.validate::<AccessTokenClaims>(&token).unwrap_err(),
                TokenError::Expired
            );
        }
    }

    #[test]
    fn test_token_use_enforced() {
        let engine = engine();
        let claims = engine.refresh_claims("user-1", "client-1", "openid", None);
        let token = engine.issue_refresh_token(&claims, TokenFormat::Jwt).unwrap();
        let err = engine.validate::<AccessTokenClaims>(&token).unwrap_err();
        assert!(matches!(err, TokenError::WrongKind { expected: TokenKind::Access, .. }));
        assert!(engine.validate::<RefreshTokenClaims>(&token).is_ok());
    }

    #[test]
    fn test_alg_none_rejected() {
        let engine = engine();
        let claims = engine.access_claims("user-1", "client-1", "openid", None);
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let token = format!("{header}.{payload}.");
        assert_eq!(
            engine.validate::<AccessTokenClaims>(&token).unwrap_err(),
            TokenError::WrongAlgorithm("none".to_owned())
        );
    }

    #[test]
    fn test_hs256_rejected() {
        let engine = engine();
        let claims = engine.access_claims("user-1", "client-1", "openid", None);
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"shared-secret"),
        )
        .unwrap();
        assert!(matches!(
            engine.validate::<AccessTokenClaims>(&token).unwrap_err(),
            TokenError::WrongAlgorithm(_)
        ));
    }

    #[test]
    fn test_tampered_tokens_rejected() {
        let engine = engine();
        let claims = engine.access_claims("user-1", "client-1", "openid", None);

        let jws = engine.issue_access_token(&claims, TokenFormat::Jwt).unwrap();
        let mut parts: Vec<String> = jws.split('.').map(str::to_owned).collect();
        let mut forged = claims.clone();
        forged.scope = "openid admin".to_owned();
        parts[1] = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        assert_eq!(
            engine.validate::<AccessTokenClaims>(&parts.join(".")).unwrap_err(),
            TokenError::BadSignature
        );

        let jwe = engine.issue_access_token(&claims, TokenFormat::Jwe).unwrap();
        let mut parts: Vec<String> = jwe.split('.').map(str::to_owned).collect();
        let mut ciphertext = URL_SAFE_NO_PAD.decode(&parts[3]).unwrap();
        ciphertext[0] ^= 0x01;
        parts[3] = URL_SAFE_NO_PAD.encode(ciphertext);
        assert!(matches!(
            engine.validate::<AccessTokenClaims>(&parts.join(".")).unwrap_err(),
            TokenError::Decryption(_)
        ));
    }

    #[test]
    fn test_jwe_header_is_authenticated() {
        let engine = engine();
        let claims = engine.access_claims("user-1", "client-1", "openid", None);
        let jwe = engine.issue_access_token(&claims, TokenFormat::Jwe).unwrap();
        let mut parts: Vec<String> = jwe.split('.').map(str::to_owned).collect();
        parts[0] = URL_SAFE_NO_PAD
            .encode(br#"{"alg":"RSA-OAEP-256","enc":"A256GCM","typ":"JWT","kid":"other"}"#);
        assert!(matches!(
            engine.validate::<AccessTokenClaims>(&parts.join(".")).unwrap_err(),
            TokenError::Decryption(_)
        ));
    }

    #[test]
    fn test_foreign_issuer_rejected() {
        let engine = engine();
        let other = TokenEngine::new(shared_keys(), "https://evil.example", TokenFormat::Jwt, engine.lifetimes());
        let claims = other.access_claims("user-1", "client-1", "openid", None);
        for format in [TokenFormat::Jwt, TokenFormat::Jwe] {
            let token = other.issue_access_token(&claims, format).unwrap();
            assert_eq!(
                engine.validate::<AccessTokenClaims>(&token).unwrap_err(),
                TokenError::WrongIssuer
            );
        }
    }

    #[test]
    fn test_validate_any_dispatches_on_token_use() {
        let engine = engine();
        let id = engine.id_claims("user-1", "client-1", 1_700_000_000, Some("n-1".to_owned()), Map::new());
        let token = engine.issue_id_token(&id, TokenFormat::Jwt).unwrap();
        let validated = engine.validate_any(&token).unwrap();
        assert_eq!(validated.kind(), TokenKind::Id);
        assert_eq!(validated.client_id(), "client-1");
        assert_eq!(validated, ValidatedToken::Id(id));
    }

    #[test]
    fn test_token_format_parsing() {
        assert_eq!("JWE".parse::<TokenFormat>().unwrap(), TokenFormat::Jwe);
        assert_eq!("jwt".parse::<TokenFormat>().unwrap(), TokenFormat::Jwt);
        assert!("paseto".parse::<TokenFormat>().is_err());
    }
}
