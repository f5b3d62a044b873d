// ABOUTME: Constants module with domain-separated organization
// ABOUTME: Protocol identifiers, endpoint paths, cookie names and default lifetimes
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Constants module
//!
//! Constants are grouped into logical domains rather than being in a single large file.

/// OAuth2 / OpenID Connect protocol identifiers
pub mod oauth;

pub use oauth::*;

/// Endpoint paths served by the authorization server
pub mod endpoints {
    /// Health check endpoint
    pub const HEALTH_CHECK: &str = "/health";
    /// Authorization endpoint
    pub const AUTHORIZE: &str = "/oauth/authorize";
    /// Token endpoint
    pub const TOKEN: &str = "/oauth/token";
    /// Consent screen and submission
    pub const CONSENT: &str = "/oauth/consent";
    /// Withdrawal of a stored consent by the signed-in user
    pub const CONSENT_REVOKE: &str = "/oauth/consent/revoke";
    /// Login form and submission
    pub const LOGIN: &str = "/oauth/login";
    /// SSO logout
    pub const LOGOUT: &str = "/oauth/logout";
    /// Token introspection (RFC 7662)
    pub const INTROSPECT: &str = "/oauth/introspect";
    /// Token revocation (RFC 7009)
    pub const REVOKE: &str = "/oauth/revoke";
    /// `OpenID` Connect userinfo
    pub const USERINFO: &str = "/oauth/userinfo";
    /// `OpenID` Connect discovery document
    pub const OPENID_CONFIGURATION: &str = "/.well-known/openid-configuration";
    /// JSON Web Key Set
    pub const JWKS: &str = "/.well-known/jwks.json";
}

/// Network ports
pub mod ports {
    /// Default HTTP port
    pub const DEFAULT_HTTP_PORT: u16 = 8080;
}

/// SSO session cookie
pub mod cookies {
    /// Name of the SSO session cookie
    pub const SSO_SESSION_COOKIE: &str = "oauth_sso_session";
}

/// Default lifetimes, in seconds unless stated otherwise
pub mod lifetimes {
    /// Access token lifetime (1 hour)
    pub const ACCESS_TOKEN_SECS: i64 = 3600;
    /// Refresh token lifetime (30 days)
    pub const REFRESH_TOKEN_SECS: i64 = 30 * 24 * 3600;
    /// ID token lifetime (1 hour)
    pub const ID_TOKEN_SECS: i64 = 3600;
    /// Authorization code lifetime (10 minutes)
    pub const AUTHORIZATION_CODE_SECS: i64 = 600;
    /// SSO session lifetime in days
    pub const SSO_SESSION_DAYS: i64 = 7;
    /// Stored consent lifetime in days
    pub const CONSENT_DAYS: i64 = 365;
    /// Interval between expired-record sweeps
    pub const SWEEP_INTERVAL_SECS: u64 = 60;
}

/// Service identity used in logs
pub mod service_names {
    /// Service name reported by structured logs
    pub const OAUTH_SSO_SERVER: &str = "oauth-sso-server";
}
