// ABOUTME: OAuth 2.0 / OpenID Connect authorization server core
// ABOUTME: Authorization state machine, consent, sessions, token grants, introspection and revocation
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Client registration and client authentication
pub mod client_registration;
/// Stored consent
pub mod consent;
/// Authorization, consent, token and userinfo operations
pub mod endpoints;
/// Introspection and revocation
pub mod introspection;
/// Expired-record sweeper
pub mod maintenance;
/// Protocol request, response and error types
pub mod models;
/// PKCE (RFC 7636)
pub mod pkce;
/// SSO sessions
pub mod sessions;
/// Authorization decision state machine
pub mod state_machine;

pub use client_registration::{
    ClientCredentials, ClientRegistrationManager, ClientRegistrationRequest,
    ClientRegistrationResponse,
};
pub use consent::ConsentManager;
pub use endpoints::{AuthorizationContext, AuthorizeError, AuthorizeOutcome, OAuth2AuthorizationServer};
pub use maintenance::{sweep, MaintenanceTask, SweepReport};
pub use models::{
    AuthorizeRequest, IntrospectionResponse, OAuth2Error, OAuth2ErrorCode, TokenOperationRequest,
    TokenRequest, TokenResponse,
};
pub use pkce::{CodeChallengeMethod, PkceError};
pub use sessions::{hash_password, session_id_from_cookie_header, SessionManager};
pub use state_machine::{AuthorizationState, Prompt};
