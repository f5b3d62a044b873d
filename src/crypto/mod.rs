// ABOUTME: Cryptographic utilities module
// ABOUTME: RSA key store and secure random token generation
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// RSA key store for signing and key wrapping
pub mod keys;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::rand::{SecureRandom, SystemRandom};

use crate::errors::{AppError, AppResult};

pub use keys::{JsonWebKey, JsonWebKeySet, KeyStore};

/// Generate `byte_len` random bytes from the system CSPRNG, base64url encoded without padding
///
/// # Errors
/// Returns an error if the system random generator fails
pub fn generate_random_string(byte_len: usize) -> AppResult<String> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; byte_len];
    rng.fill(&mut bytes)
        .map_err(|_| AppError::crypto("Failed to generate secure random bytes"))?;
    Ok(URL_SAFE_NO_PAD.encode(&bytes))
}
