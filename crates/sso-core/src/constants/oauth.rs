// ABOUTME: OAuth2 and OpenID Connect protocol string constants
// ABOUTME: Grant types, response types, PKCE methods, token type hints and algorithms
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Grant type identifiers (RFC 6749)
pub mod grant_types {
    /// Authorization code grant
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
    /// Refresh token grant
    pub const REFRESH_TOKEN: &str = "refresh_token";
    /// Client credentials grant
    pub const CLIENT_CREDENTIALS: &str = "client_credentials";

    /// All grant types the token endpoint accepts
    pub const SUPPORTED: [&str; 3] = [AUTHORIZATION_CODE, REFRESH_TOKEN, CLIENT_CREDENTIALS];
}

/// Only `code` is supported at the authorization endpoint
pub const RESPONSE_TYPE_CODE: &str = "code";

/// `token_type` returned by the token endpoint
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// PKCE `code_challenge_method` values (RFC 7636)
pub mod pkce_methods {
    /// Challenge equals the verifier
    pub const PLAIN: &str = "plain";
    /// Challenge is `base64url(SHA256(verifier))`
    pub const S256: &str = "S256";
}

/// `token_type_hint` values (RFC 7009 / RFC 7662)
pub mod token_type_hints {
    /// Hint for access tokens
    pub const ACCESS_TOKEN: &str = "access_token";
    /// Hint for refresh tokens
    pub const REFRESH_TOKEN: &str = "refresh_token";
}

/// Standard `OpenID` Connect scope names
pub mod scopes {
    /// `OpenID` Connect marker scope
    pub const OPENID: &str = "openid";
    /// Profile claims
    pub const PROFILE: &str = "profile";
    /// Email claims
    pub const EMAIL: &str = "email";
    /// Phone claims
    pub const PHONE: &str = "phone";
    /// Address claim
    pub const ADDRESS: &str = "address";
    /// Refresh tokens usable while the user is absent
    pub const OFFLINE_ACCESS: &str = "offline_access";
}

/// JOSE algorithm identifiers
pub mod algorithms {
    /// Signing algorithm for every JWT the server issues
    pub const RS256: &str = "RS256";
    /// JWE key management algorithm
    pub const RSA_OAEP_256: &str = "RSA-OAEP-256";
    /// JWE content encryption algorithm
    pub const A256GCM: &str = "A256GCM";
}
