// ABOUTME: RSA key store backing JWT signatures and JWE key wrapping
// ABOUTME: Loads or generates one key pair, precomputes jsonwebtoken keys and publishes the JWKS
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Key Store
//!
//! A single RSA key pair is used both to sign JWTs (RS256) and to unwrap JWE
//! content-encryption keys (RSA-OAEP-256). The store is built once at startup
//! and shared as an immutable `Arc<KeyStore>`; nothing in it is mutated after
//! construction, so readers never lock.

use std::fmt;
use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sso_core::constants::algorithms;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::config::KeyStoreConfig;
use crate::errors::{AppError, AppResult};

/// Smallest modulus accepted for loaded or generated keys
pub const MIN_RSA_KEY_BITS: usize = 2048;

/// JSON Web Key (RFC 7517) for an RSA public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type (always "RSA")
    pub kty: String,
    /// Public key use ("sig" or "enc")
    #[serde(rename = "use")]
    pub key_use: String,
    /// Key ID
    pub kid: String,
    /// Algorithm the key is published for
    pub alg: String,
    /// RSA modulus (base64url encoded)
    pub n: String,
    /// RSA exponent (base64url encoded)
    pub e: String,
}

/// JWKS (JSON Web Key Set) container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    /// Array of public keys
    pub keys: Vec<JsonWebKey>,
}

/// Immutable RSA key material shared by the token engine
pub struct KeyStore {
    kid: String,
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    created_at: DateTime<Utc>,
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore")
            .field("kid", &self.kid)
            .field("modulus_bits", &self.modulus_bits())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl KeyStore {
    /// Generate a fresh key pair
    ///
    /// # Errors
    /// Returns an error if `bits` is below 2048 or key generation fails
    pub fn generate(kid: &str, bits: usize) -> AppResult<Self> {
        if bits < MIN_RSA_KEY_BITS {
            return Err(AppError::config(format!(
                "RSA key size {bits} is below the {MIN_RSA_KEY_BITS}-bit minimum"
            )));
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| AppError::crypto(format!("Failed to generate RSA private key: {e}")))?;
        Self::from_private_key(kid, private_key)
    }

    /// Build a store from a PEM private key (PKCS#8 or PKCS#1)
    ///
    /// # Errors
    /// Returns an error if the PEM cannot be parsed or the key is too small
    pub fn from_private_key_pem(kid: &str, pem: &str) -> AppResult<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| AppError::config(format!("Failed to parse private key PEM: {e}")))?;
        Self::from_private_key(kid, private_key)
    }

    /// Load the configured key, generating an ephemeral one when no path is set.
    ///
    /// A configured path that does not exist yet is created with a newly
    /// generated key so restarts keep issuing verifiable tokens.
    ///
    /// # Errors
    /// Returns an error if the key file cannot be read, parsed or written
    pub fn load_or_generate(config: &KeyStoreConfig) -> AppResult<Self> {
        let Some(path) = config.private_key_path.as_deref() else {
            warn!(
                kid = %config.key_id,
                "No SIGNING_KEY_PATH configured, generating an ephemeral RSA key; tokens will not survive a restart"
            );
            return Self::generate(&config.key_id, config.generated_key_bits);
        };

        if path.exists() {
            let pem = Zeroizing::new(fs::read_to_string(path).map_err(|e| {
                AppError::config(format!("Failed to read key file {}: {e}", path.display()))
            })?);
            let store = Self::from_private_key_pem(&config.key_id, &pem)?;
            info!(kid = %store.kid, path = %path.display(), bits = store.modulus_bits(), "Loaded RSA signing key");
            return Ok(store);
        }

        let store = Self::generate(&config.key_id, config.generated_key_bits)?;
        store.write_private_key(path)?;
        info!(kid = %store.kid, path = %path.display(), "Generated and persisted new RSA signing key");
        Ok(store)
    }

    fn from_private_key(kid: &str, private_key: RsaPrivateKey) -> AppResult<Self> {
        let public_key = RsaPublicKey::from(&private_key);
        if public_key.size() * 8 < MIN_RSA_KEY_BITS {
            return Err(AppError::config(format!(
                "RSA key is {} bits, below the {MIN_RSA_KEY_BITS}-bit minimum",
                public_key.size() * 8
            )));
        }

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AppError::crypto(format!("Failed to export private key as PEM: {e}")))?;
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AppError::crypto(format!("Failed to export public key as PEM: {e}")))?;

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| AppError::crypto(format!("Failed to create encoding key: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| AppError::crypto(format!("Failed to create decoding key: {e}")))?;

        Ok(Self {
            kid: kid.to_owned(),
            private_key,
            public_key,
            encoding_key,
            decoding_key,
            created_at: Utc::now(),
        })
    }

    fn write_private_key(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::config(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        let pem = self.export_private_key_pem()?;
        fs::write(path, pem.as_bytes())
            .map_err(|e| AppError::config(format!("Failed to write {}: {e}", path.display())))
    }

    /// Export the private key as PKCS#8 PEM
    ///
    /// # Errors
    /// Returns an error if PEM encoding fails
    pub fn export_private_key_pem(&self) -> AppResult<Zeroizing<String>> {
        self.private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AppError::crypto(format!("Failed to export private key as PEM: {e}")))
    }

    /// Key identifier stamped on token headers
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Modulus size in bits
    #[must_use]
    pub fn modulus_bits(&self) -> usize {
        self.public_key.size() * 8
    }

    /// RS256 signing key
    #[must_use]
    pub const fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// RS256 verification key
    #[must_use]
    pub const fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Public key used to wrap JWE content-encryption keys
    #[must_use]
    pub const fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Private key used to unwrap JWE content-encryption keys
    #[must_use]
    pub const fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// Public keys in JWKS form: one entry for signatures, one for encryption
    #[must_use]
    pub fn to_jwks(&self) -> JsonWebKeySet {
        let n = URL_SAFE_NO_PAD.encode(self.public_key.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(self.public_key.e().to_bytes_be());
        let jwk = |key_use: &str, alg: &str| JsonWebKey {
            kty: "RSA".to_owned(),
            key_use: key_use.to_owned(),
            kid: self.kid.clone(),
            alg: alg.to_owned(),
            n: n.clone(),
            e: e.clone(),
        };

        JsonWebKeySet {
            keys: vec![
                jwk("sig", algorithms::RS256),
                jwk("enc", algorithms::RSA_OAEP_256),
            ],
        }
    }
}
