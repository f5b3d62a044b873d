// ABOUTME: Integration tests for the token endpoint grants
// ABOUTME: Code exchange with PKCE, single-use codes, refresh downgrade, client credentials and JWE output
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use common::{
    authorize_request, create_test_resources, create_test_resources_with_format,
    create_test_user, credentials, exchange_code, login, obtain_code, register_test_client,
    PKCE_VERIFIER,
};
use oauth_sso_server::oauth2_server::pkce::s256_challenge;
use oauth_sso_server::oauth2_server::{OAuth2ErrorCode, TokenRequest};
use oauth_sso_server::tokens::{is_jwe, AccessTokenClaims, IdTokenClaims, RefreshTokenClaims, TokenFormat};
use serde_json::{Map, Value};

/// Raw JSON payload of a compact JWS
fn jws_payload(token: &str) -> Map<String, Value> {
    let payload = token.split('.').nth(1).unwrap();
    serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap()
}

#[tokio::test]
async fn test_code_exchange_with_s256_pkce() {
    let resources = create_test_resources().await.unwrap();
    let client = register_test_client(&resources, &[], None).await.unwrap();
    let user = create_test_user(&resources.database, "alice@example.com")
        .await
        .unwrap();
    let session = login(&resources, &user).await.unwrap();

    let mut request = authorize_request(&client.client_id, "openid profile");
    request.code_challenge = Some(s256_challenge(PKCE_VERIFIER));
    request.code_challenge_method = Some("S256".to_owned());
    let code = obtain_code(&resources, &session, &request).await.unwrap();

    let response = exchange_code(&resources, &client, &code, Some(PKCE_VERIFIER))
        .await
        .unwrap();
    assert_eq!(response.token_type, "Bearer");
    assert_eq!(response.expires_in, 3600);
    assert_eq!(response.scope, "openid profile");
    assert!(response.refresh_token.is_some());

    let engine = resources.oauth2_server.tokens();
    let access: AccessTokenClaims = engine.validate(&response.access_token).unwrap();
    assert_eq!(access.sub, user.id.to_string());
    assert_eq!(access.client_id, client.client_id);
    let refresh: RefreshTokenClaims = engine
        .validate(response.refresh_token.as_deref().unwrap())
        .unwrap();
    assert_eq!(access.rtid.as_deref(), Some(refresh.jti.as_str()));

    let id_token = response.id_token.unwrap();
    let id: IdTokenClaims = engine.validate(&id_token).unwrap();
    assert_eq!(id.aud, client.client_id);
    assert_eq!(id.azp, client.client_id);
    assert_eq!(id.nonce.as_deref(), Some("n-0S6_WzA2Mj"));
    assert_eq!(id.auth_time, session.created_at.timestamp());
    assert_eq!(id.profile_claims["name"], "Alice Example");
    assert_eq!(id.profile_claims["given_name"], "Alice");
    assert!(!id.profile_claims.contains_key("email"));
    assert!(!id.profile_claims.contains_key("phone_number"));
}

#[tokio::test]
async fn test_access_token_carries_no_profile_claims() {
    let resources = create_test_resources().await.unwrap();
    let client = register_test_client(&resources, &[], None).await.unwrap();
    let user = create_test_user(&resources.database, "alice@example.com")
        .await
        .unwrap();
    let session = login(&resources, &user).await.unwrap();

    let request = authorize_request(&client.client_id, "openid profile email phone");
    let code = obtain_code(&resources, &session, &request).await.unwrap();
    let response = exchange_code(&resources, &client, &code, None).await.unwrap();

    let access = jws_payload(&response.access_token);
    for claim in ["email", "name", "given_name", "phone_number", "email_verified"] {
        assert!(!access.contains_key(claim), "access token leaked {claim}");
    }
    assert_eq!(access["token_use"], "access");

    let id = jws_payload(response.id_token.as_deref().unwrap());
    assert_eq!(id["email"], "alice@example.com");
    assert_eq!(id["email_verified"], true);
    assert_eq!(id["phone_number"], "+1 555 0100");
}

#[tokio::test]
async fn test_wrong_verifier_fails_and_burns_code() {
    let resources = create_test_resources().await.unwrap();
    let client = register_test_client(&resources, &[], None).await.unwrap();
    let user = create_test_user(&resources.database, "alice@example.com")
        .await
        .unwrap();
    let session = login(&resources, &user).await.unwrap();

    let mut request = authorize_request(&client.client_id, "openid");
    request.code_challenge = Some(s256_challenge(PKCE_VERIFIER));
    request.code_challenge_method = Some("S256".to_owned());
    let code = obtain_code(&resources, &session, &request).await.unwrap();

    let wrong = "wrong-verifier-wrong-verifier-wrong-verifier-0000";
    let err = exchange_code(&resources, &client, &code, Some(wrong))
        .await
        .unwrap_err();
    assert_eq!(err.error, OAuth2ErrorCode::InvalidGrant);

    let err = exchange_code(&resources, &client, &code, Some(PKCE_VERIFIER))
        .await
        .unwrap_err();
    assert_eq!(err.error, OAuth2ErrorCode::InvalidGrant);
}

#[tokio::test]
async fn test_missing_verifier_for_challenged_code_fails() {
    let resources = create_test_resources().await.unwrap();
    let client = register_test_client(&resources, &[], None).await.unwrap();
    let user = create_test_user(&resources.database, "alice@example.com")
        .await
        .unwrap();
    let session = login(&resources, &user).await.unwrap();

    let mut request = authorize_request(&client.client_id, "openid");
    request.code_challenge = Some(s256_challenge(PKCE_VERIFIER));
    request.code_challenge_method = Some("S256".to_owned());
    let code = obtain_code(&resources, &session, &request).await.unwrap();

    let err = exchange_code(&resources, &client, &code, None)
        .await
        .unwrap_err();
    assert_eq!(err.error, OAuth2ErrorCode::InvalidGrant);
}

#[tokio::test]
async fn test_concurrent_code_exchange_has_single_winner() {
    let resources = create_test_resources().await.unwrap();
    let client = register_test_client(&resources, &[], None).await.unwrap();
    let user = create_test_user(&resources.database, "alice@example.com")
        .await
        .unwrap();
    let session = login(&resources, &user).await.unwrap();

    let request = authorize_request(&client.client_id, "openid");
    let code = obtain_code(&resources, &session, &request).await.unwrap();

    let (first, second) = tokio::join!(
        exchange_code(&resources, &client, &code, None),
        exchange_code(&resources, &client, &code, None),
    );
    let winners = [first.is_ok(), second.is_ok()]
        .into_iter()
        .filter(|ok| *ok)
        .count();
    assert_eq!(winners, 1);
    let loser = first.err().or_else(|| second.err()).unwrap();
    assert_eq!(loser.error, OAuth2ErrorCode::InvalidGrant);
}

#[tokio::test]
async fn test_code_bound_to_client_and_redirect_uri() {
    let resources = create_test_resources().await.unwrap();
    let client = register_test_client(&resources, &[], None).await.unwrap();
    let other = register_test_client(&resources, &[], None).await.unwrap();
    let user = create_test_user(&resources.database, "alice@example.com")
        .await
        .unwrap();
    let session = login(&resources, &user).await.unwrap();

    let request = authorize_request(&client.client_id, "openid");
    let code = obtain_code(&resources, &session, &request).await.unwrap();
    let err = exchange_code(&resources, &other, &code, None)
        .await
        .unwrap_err();
    assert_eq!(err.error, OAuth2ErrorCode::InvalidGrant);

    let code = obtain_code(&resources, &session, &request).await.unwrap();
    let err = resources
        .oauth2_server
        .token(
            TokenRequest {
                grant_type: Some("authorization_code".to_owned()),
                code: Some(code),
                redirect_uri: Some("https://app.example.com/other".to_owned()),
                ..TokenRequest::default()
            },
            Some(credentials(&client)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, OAuth2ErrorCode::InvalidGrant);
}

#[tokio::test]
async fn test_refresh_downgrade_within_original_grant() {
    let resources = create_test_resources().await.unwrap();
    let client = register_test_client(&resources, &[], None).await.unwrap();
    let user = create_test_user(&resources.database, "alice@example.com")
        .await
        .unwrap();
    let session = login(&resources, &user).await.unwrap();

    let request = authorize_request(&client.client_id, "openid profile email");
    let code = obtain_code(&resources, &session, &request).await.unwrap();
    let issued = exchange_code(&resources, &client, &code, None).await.unwrap();
    let refresh_token = issued.refresh_token.unwrap();

    let refresh = |scope: &str| TokenRequest {
        grant_type: Some("refresh_token".to_owned()),
        refresh_token: Some(refresh_token.clone()),
        scope: Some(scope.to_owned()),
        ..TokenRequest::default()
    };

    let narrowed = resources
        .oauth2_server
        .token(refresh("openid email"), Some(credentials(&client)))
        .await
        .unwrap();
    assert_eq!(narrowed.scope, "openid email");
    let access = resources
        .oauth2_server
        .tokens()
        .validate::<AccessTokenClaims>(&narrowed.access_token)
        .unwrap();
    assert_eq!(access.scope, "openid email");
    let id = jws_payload(narrowed.id_token.as_deref().unwrap());
    assert!(id.contains_key("email"));
    assert!(!id.contains_key("name"));

    let err = resources
        .oauth2_server
        .token(refresh("openid phone"), Some(credentials(&client)))
        .await
        .unwrap_err();
    assert_eq!(err.error, OAuth2ErrorCode::InvalidScope);
    assert!(err.error_description.unwrap().contains("phone"));
}

#[tokio::test]
async fn test_client_credentials_grant() {
    let resources = create_test_resources().await.unwrap();
    let client = register_test_client(
        &resources,
        &["profile", "email"],
        Some(&["client_credentials"]),
    )
    .await
    .unwrap();

    let response = resources
        .oauth2_server
        .token(
            TokenRequest {
                grant_type: Some("client_credentials".to_owned()),
                ..TokenRequest::default()
            },
            Some(credentials(&client)),
        )
        .await
        .unwrap();
    assert!(response.refresh_token.is_none());
    assert!(response.id_token.is_none());
    assert_eq!(response.scope, "profile email");

    let access: AccessTokenClaims = resources
        .oauth2_server
        .tokens()
        .validate(&response.access_token)
        .unwrap();
    assert_eq!(access.sub, client.client_id);
    assert!(access.rtid.is_none());

    let err = resources
        .oauth2_server
        .token(
            TokenRequest {
                grant_type: Some("authorization_code".to_owned()),
                code: Some("anything".to_owned()),
                ..TokenRequest::default()
            },
            Some(credentials(&client)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, OAuth2ErrorCode::UnauthorizedClient);
}

#[tokio::test]
async fn test_bad_client_secret_is_invalid_client() {
    let resources = create_test_resources().await.unwrap();
    let client = register_test_client(&resources, &[], None).await.unwrap();
    let mut creds = credentials(&client);
    creds.client_secret = "not-the-secret".to_owned();

    let err = resources
        .oauth2_server
        .token(
            TokenRequest {
                grant_type: Some("authorization_code".to_owned()),
                code: Some("anything".to_owned()),
                ..TokenRequest::default()
            },
            Some(creds),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, OAuth2ErrorCode::InvalidClient);

    let err = resources
        .oauth2_server
        .token(
            TokenRequest {
                grant_type: Some("password".to_owned()),
                ..TokenRequest::default()
            },
            Some(credentials(&client)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, OAuth2ErrorCode::UnsupportedGrantType);
}

#[tokio::test]
async fn test_jwe_format_tokens_validate() {
    let resources = create_test_resources_with_format(TokenFormat::Jwe)
        .await
        .unwrap();
    let client = register_test_client(&resources, &[], None).await.unwrap();
    let user = create_test_user(&resources.database, "alice@example.com")
        .await
        .unwrap();
    let session = login(&resources, &user).await.unwrap();

    let request = authorize_request(&client.client_id, "openid email");
    let code = obtain_code(&resources, &session, &request).await.unwrap();
    let response = exchange_code(&resources, &client, &code, None).await.unwrap();

    assert!(is_jwe(&response.access_token));
    assert_eq!(response.access_token.split('.').count(), 5);
    let refresh_token = response.refresh_token.unwrap();
    assert!(is_jwe(&refresh_token));
    let id_token = response.id_token.unwrap();
    assert_eq!(id_token.split('.').count(), 3);

    let engine = resources.oauth2_server.tokens();
    let access: AccessTokenClaims = engine.validate(&response.access_token).unwrap();
    assert_eq!(access.scope, "openid email");
    let refresh: RefreshTokenClaims = engine.validate(&refresh_token).unwrap();
    assert_eq!(access.rtid.as_deref(), Some(refresh.jti.as_str()));

    let userinfo = resources
        .oauth2_server
        .userinfo(&response.access_token)
        .await
        .unwrap();
    assert_eq!(userinfo["email"], "alice@example.com");
    assert_eq!(userinfo["sub"], user.id.to_string());
    assert!(!userinfo.contains_key("name"));
}
