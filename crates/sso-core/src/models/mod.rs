// ABOUTME: Core data models for the authorization server
// ABOUTME: Re-exports users, clients, codes, sessions, consents and typed claims
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Data Models
//!
//! Records persisted by the database layer and the typed claim vocabulary
//! shared by the scope registry and the token engine.

mod claims;
mod oauth2_server;
mod session;
mod user;

pub use claims::{Claim, UnknownClaim};
pub use oauth2_server::{AuthorizationCode, OAuthClient, RevokedToken};
pub use session::{SsoSession, UserConsent};
pub use user::{Address, User, UserProfile};
