// ABOUTME: Main library entry point for the OAuth 2.0 / OpenID Connect SSO server
// ABOUTME: Token engine, PKCE, scope registry, SSO sessions, consent, introspection and revocation
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![deny(unsafe_code)]

//! # OAuth SSO Server
//!
//! An OAuth 2.0 authorization server with `OpenID` Connect identity,
//! browser single sign-on and stored user consent.
//!
//! ## Features
//!
//! - **Tokens**: RS256-signed JWTs or RSA-OAEP-256 / A256GCM encrypted JWEs
//! - **PKCE**: `S256` and `plain` code challenges (RFC 7636)
//! - **Scopes**: hierarchical scope registry driving claim release
//! - **SSO**: cookie-backed sessions with `prompt` handling and consent reuse
//! - **Token management**: introspection (RFC 7662) and revocation (RFC 7009)
//!
//! ## Architecture
//!
//! - **`tokens`**: claim sets, JWS / JWE codecs and the `TokenEngine`
//! - **`scopes`**: `ScopeRegistry` and `ClaimFilter`
//! - **`oauth2_server`**: authorization state machine and protocol operations
//! - **`database`**: `SQLite` persistence
//! - **`routes`**: axum handlers
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use oauth_sso_server::config::ServerConfig;
//! use oauth_sso_server::errors::AppResult;
//!
//! fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("Issuer: {}", config.issuer_url);
//!     Ok(())
//! }
//! ```

/// Environment-based configuration
pub mod config;

/// RSA key store and random helpers
pub mod crypto;

/// `SQLite` persistence
pub mod database;

/// Error types
pub mod errors;

/// Structured logging
pub mod logging;

/// Authorization server operations
pub mod oauth2_server;

/// Shared resources handed to HTTP handlers
pub mod resources;

/// HTTP routes
pub mod routes;

/// Scope registry and claim filtering
pub mod scopes;

/// Token issuance and validation
pub mod tokens;
