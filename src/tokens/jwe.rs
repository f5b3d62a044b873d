// ABOUTME: Compact JSON Web Encryption with RSA-OAEP-256 key wrapping and A256GCM content encryption
// ABOUTME: Each token gets a fresh content-encryption key and IV; the protected header is the GCM AAD
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Compact serialization (RFC 7516 section 7.1):
//!
//! `b64(header) . b64(encrypted_key) . b64(iv) . b64(ciphertext) . b64(tag)`
//!
//! The GCM tag is appended to the ciphertext in the fourth segment and the
//! fifth segment is left empty.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::Aes256Gcm;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::Oaep;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sso_core::constants::algorithms;
use zeroize::Zeroizing;

use super::TokenError;
use crate::crypto::KeyStore;

const CEK_LEN: usize = 32;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
struct JweHeader {
    alg: String,
    enc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
}

/// Encrypt `payload` for the store's own public key
pub(super) fn encrypt(keys: &KeyStore, payload: &[u8]) -> Result<String, TokenError> {
    let header = JweHeader {
        alg: algorithms::RSA_OAEP_256.to_owned(),
        enc: algorithms::A256GCM.to_owned(),
        typ: Some("JWT".to_owned()),
        kid: Some(keys.kid().to_owned()),
    };
    let header_json =
        serde_json::to_vec(&header).map_err(|e| TokenError::Encoding(e.to_string()))?;
    let header_b64 = URL_SAFE_NO_PAD.encode(header_json);

    let mut cek = Zeroizing::new([0u8; CEK_LEN]);
    OsRng.fill_bytes(&mut *cek);
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let encrypted_key = keys
        .public_key()
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &cek[..])
        .map_err(|e| TokenError::Encoding(format!("CEK wrapping failed: {e}")))?;

    let cipher = Aes256Gcm::new_from_slice(&cek[..])
        .map_err(|e| TokenError::Encoding(format!("invalid CEK: {e}")))?;
    let ciphertext = cipher
        .encrypt(
            GenericArray::from_slice(&iv),
            Payload {
                msg: payload,
                aad: header_b64.as_bytes(),
            },
        )
        .map_err(|e| TokenError::Encoding(format!("content encryption failed: {e}")))?;

    Ok(format!(
        "{header_b64}.{}.{}.{}.",
        URL_SAFE_NO_PAD.encode(encrypted_key),
        URL_SAFE_NO_PAD.encode(iv),
        URL_SAFE_NO_PAD.encode(ciphertext),
    ))
}

/// Decrypt a compact JWE produced by [`encrypt`] and return the plaintext payload
pub(super) fn decrypt(keys: &KeyStore, token: &str) -> Result<Vec<u8>, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [header_b64, encrypted_key_b64, iv_b64, ciphertext_b64, tag_b64] = segments[..] else {
        return Err(TokenError::Malformed(format!(
            "JWE must have 5 segments, found {}",
            segments.len()
        )));
    };
    if !tag_b64.is_empty() {
        return Err(TokenError::Malformed(
            "JWE tag must be carried with the ciphertext".to_owned(),
        ));
    }

    let header: JweHeader = serde_json::from_slice(&decode_segment(header_b64, "header")?)
        .map_err(|e| TokenError::Malformed(format!("JWE header is not JSON: {e}")))?;
    if header.alg != algorithms::RSA_OAEP_256 {
        return Err(TokenError::WrongAlgorithm(header.alg));
    }
    if header.enc != algorithms::A256GCM {
        return Err(TokenError::WrongAlgorithm(header.enc));
    }

    let encrypted_key = decode_segment(encrypted_key_b64, "encrypted key")?;
    let iv = decode_segment(iv_b64, "iv")?;
    let ciphertext = decode_segment(ciphertext_b64, "ciphertext")?;
    if iv.len() != IV_LEN {
        return Err(TokenError::Malformed(format!(
            "JWE iv must be {IV_LEN} bytes, found {}",
            iv.len()
        )));
    }
    if ciphertext.len() < TAG_LEN {
        return Err(TokenError::Malformed("JWE ciphertext is truncated".to_owned()));
    }

    let cek = Zeroizing::new(
        keys.private_key()
            .decrypt(Oaep::new::<Sha256>(), &encrypted_key)
            .map_err(|_| TokenError::Decryption("CEK unwrap failed".to_owned()))?,
    );
    if cek.len() != CEK_LEN {
        return Err(TokenError::Decryption(format!(
            "CEK must be {CEK_LEN} bytes, found {}",
            cek.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(&cek)
        .map_err(|e| TokenError::Decryption(format!("invalid CEK: {e}")))?;
    cipher
        .decrypt(
            GenericArray::from_slice(&iv),
            Payload {
                msg: &ciphertext,
                aad: header_b64.as_bytes(),
            },
        )
        .map_err(|_| TokenError::Decryption("GCM authentication failed".to_owned()))
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::Malformed(format!("JWE {name} is not base64url: {e}")))
}
