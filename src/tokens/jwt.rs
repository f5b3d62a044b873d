// ABOUTME: RS256 JSON Web Signature encoding and verification
// ABOUTME: Rejects every algorithm other than RS256, including "none"
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, Header, Validation};
use serde::Serialize;
use serde_json::Value;
use sso_core::constants::algorithms;

use super::TokenError;
use crate::crypto::KeyStore;

/// Sign `claims` as a compact JWS with the store's key
pub(super) fn sign<T: Serialize>(keys: &KeyStore, claims: &T) -> Result<String, TokenError> {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(keys.kid().to_owned());
    header.typ = Some("JWT".to_owned());

    encode(&header, claims, keys.encoding_key())
        .map_err(|e| TokenError::Encoding(format!("RS256 signing failed: {e}")))
}

/// Verify the signature and issuer of a compact JWS and return its payload.
///
/// Expiry is not checked here; the engine applies one expiry rule to both
/// JWT and JWE payloads.
pub(super) fn verify(keys: &KeyStore, token: &str, issuer: &str) -> Result<Value, TokenError> {
    // Header first so a non-RS256 token is reported as such rather than as a bad signature
    let alg = raw_header_alg(token)?;
    if alg != algorithms::RS256 {
        return Err(TokenError::WrongAlgorithm(alg));
    }
    decode_header(token).map_err(|e| TokenError::Malformed(e.to_string()))?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation.set_issuer(&[issuer]);

    decode::<Value>(token, keys.decoding_key(), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            ErrorKind::InvalidAlgorithm => TokenError::WrongAlgorithm("RS256 expected".to_owned()),
            ErrorKind::InvalidIssuer => TokenError::WrongIssuer,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed(e.to_string()),
        })
}

/// Read `alg` from the protected header without trusting anything else in it.
///
/// `jsonwebtoken` cannot parse headers naming algorithms it does not know
/// (such as `none`), so the raw JSON is inspected directly.
fn raw_header_alg(token: &str) -> Result<String, TokenError> {
    let encoded = token
        .split('.')
        .next()
        .ok_or_else(|| TokenError::Malformed("empty token".to_owned()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| TokenError::Malformed(format!("header is not base64url: {e}")))?;
    let header: Value = serde_json::from_slice(&bytes)
        .map_err(|e| TokenError::Malformed(format!("header is not JSON: {e}")))?;
    header
        .get("alg")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| TokenError::Malformed("header has no alg".to_owned()))
}
