// ABOUTME: Proof Key for Code Exchange (RFC 7636) challenge validation and verifier checking
// ABOUTME: Supports plain and S256 methods with constant-time comparison
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};
use sso_core::constants::pkce_methods;
use subtle::ConstantTimeEq;
use thiserror::Error;

const MIN_LEN: usize = 43;
const MAX_LEN: usize = 128;

/// PKCE transformation applied to the verifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodeChallengeMethod {
    /// Challenge equals the verifier
    #[default]
    Plain,
    /// Challenge is `base64url(SHA256(verifier))`
    S256,
}

impl CodeChallengeMethod {
    /// Wire name of the method
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => pkce_methods::PLAIN,
            Self::S256 => pkce_methods::S256,
        }
    }

    /// Parse an optional method parameter; absent means `plain`
    ///
    /// # Errors
    /// Returns [`PkceError::UnsupportedMethod`] for anything but `plain` or `S256`
    pub fn from_param(method: Option<&str>) -> Result<Self, PkceError> {
        method.map_or(Ok(Self::Plain), str::parse)
    }
}

impl fmt::Display for CodeChallengeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeChallengeMethod {
    type Err = PkceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            pkce_methods::PLAIN => Ok(Self::Plain),
            pkce_methods::S256 => Ok(Self::S256),
            other => Err(PkceError::UnsupportedMethod(other.to_owned())),
        }
    }
}

/// PKCE failures; mapped to `invalid_request` at authorize and `invalid_grant` at exchange
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PkceError {
    /// Method other than `plain` or `S256`
    #[error("unsupported code_challenge_method '{0}'")]
    UnsupportedMethod(String),
    /// Challenge length outside 43..=128
    #[error("code_challenge must be between 43 and 128 characters")]
    InvalidChallenge,
    /// Verifier length or alphabet invalid
    #[error("code_verifier must be 43-128 characters of [A-Za-z0-9-._~]")]
    InvalidVerifier,
    /// Challenge stored but no verifier presented
    #[error("code_verifier is required")]
    MissingVerifier,
    /// Verifier presented but no challenge was stored
    #[error("code_verifier supplied but no code_challenge was issued")]
    UnexpectedVerifier,
    /// Verifier does not match the challenge
    #[error("code_verifier does not match code_challenge")]
    Mismatch,
}

/// Validate challenge parameters received at the authorization endpoint
///
/// # Errors
/// Returns [`PkceError::InvalidChallenge`] for a bad length or
/// [`PkceError::UnsupportedMethod`] for an unknown method
pub fn validate_challenge(
    challenge: &str,
    method: Option<&str>,
) -> Result<CodeChallengeMethod, PkceError> {
    let method = CodeChallengeMethod::from_param(method)?;
    if !(MIN_LEN..=MAX_LEN).contains(&challenge.len()) {
        return Err(PkceError::InvalidChallenge);
    }
    Ok(method)
}

/// Whether `verifier` has the RFC 7636 section 4.1 shape
#[must_use]
pub fn is_valid_verifier(verifier: &str) -> bool {
    (MIN_LEN..=MAX_LEN).contains(&verifier.len())
        && verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

/// `base64url_nopad(SHA256(verifier))`
#[must_use]
pub fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Check `verifier` against a stored challenge. Malformed verifiers are rejected before hashing.
///
/// # Errors
/// Returns [`PkceError::InvalidVerifier`] or [`PkceError::Mismatch`]
pub fn verify(
    verifier: &str,
    challenge: &str,
    method: CodeChallengeMethod,
) -> Result<(), PkceError> {
    if !is_valid_verifier(verifier) {
        return Err(PkceError::InvalidVerifier);
    }
    let computed = match method {
        CodeChallengeMethod::Plain => verifier.to_owned(),
        CodeChallengeMethod::S256 => s256_challenge(verifier),
    };
    if bool::from(computed.as_bytes().ct_eq(challenge.as_bytes())) {
        Ok(())
    } else {
        Err(PkceError::Mismatch)
    }
}

/// Apply the exchange-time rules to what was stored on the code and what the client sent
///
/// # Errors
/// Returns the reason the exchange must be refused
pub fn verify_exchange(
    stored_challenge: Option<&str>,
    stored_method: Option<&str>,
    verifier: Option<&str>,
) -> Result<(), PkceError> {
    match (stored_challenge, verifier) {
        (Some(challenge), Some(verifier)) => {
            verify(verifier, challenge, CodeChallengeMethod::from_param(stored_method)?)
        }
        (Some(_), None) => Err(PkceError::MissingVerifier),
        (None, Some(_)) => Err(PkceError::UnexpectedVerifier),
        (None, None) => Ok(()),
    }
}
