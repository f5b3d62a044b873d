// ABOUTME: Single sign-on session and stored consent records
// ABOUTME: Sessions back the SSO cookie; consents remember scopes a user approved per client
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Server-side SSO session referenced by the session cookie
#[derive(Debug, Clone)]
pub struct SsoSession {
    /// Session identifier, also the cookie value
    pub session_id: String,
    /// Authenticated user
    pub user_id: Uuid,
    /// Whether the user completed authentication
    pub authenticated: bool,
    /// When the session was created (the user's `auth_time`)
    pub created_at: DateTime<Utc>,
    /// Absolute expiry
    pub expires_at: DateTime<Utc>,
    /// Last time the session was used
    pub last_activity: DateTime<Utc>,
    /// Client IP address at login
    pub ip_address: Option<String>,
    /// User agent at login
    pub user_agent: Option<String>,
}

impl SsoSession {
    /// Whether the session can authenticate requests at `now`
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.authenticated && now < self.expires_at
    }
}

/// Scopes a user approved for a client
#[derive(Debug, Clone)]
pub struct UserConsent {
    /// User who granted consent
    pub user_id: Uuid,
    /// Client the consent applies to
    pub client_id: String,
    /// Approved scopes
    pub scopes: Vec<String>,
    /// When consent was last granted
    pub granted_at: DateTime<Utc>,
    /// When consent lapses
    pub expires_at: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped on every write
    pub version: i64,
}

impl UserConsent {
    /// Whether the consent has lapsed at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
