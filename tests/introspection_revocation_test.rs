// ABOUTME: Integration tests for token introspection and revocation
// ABOUTME: Active and revoked tokens, idempotent revocation, refresh cascade and cross-client isolation
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::{Duration, Utc};
use common::{
    authorize_request, create_test_resources, create_test_resources_with_config, create_test_user,
    credentials, exchange_code, login, obtain_code, register_test_client, test_config,
};
use oauth_sso_server::oauth2_server::{
    sweep, ClientRegistrationResponse, OAuth2ErrorCode, TokenOperationRequest, TokenRequest,
    TokenResponse,
};
use oauth_sso_server::resources::ServerResources;
use uuid::Uuid;

fn operation(token: &str) -> TokenOperationRequest {
    TokenOperationRequest {
        token: Some(token.to_owned()),
        ..TokenOperationRequest::default()
    }
}

async fn issue_tokens(
    resources: &ServerResources,
    client: &ClientRegistrationResponse,
    scope: &str,
) -> TokenResponse {
    let user = create_test_user(&resources.database, &format!("{}@example.com", Uuid::new_v4()))
        .await
        .unwrap();
    let session = login(resources, &user).await.unwrap();
    let request = authorize_request(&client.client_id, scope);
    let code = obtain_code(resources, &session, &request).await.unwrap();
    exchange_code(resources, client, &code, None).await.unwrap()
}

#[tokio::test]
async fn test_introspect_then_revoke_access_token() {
    let resources = create_test_resources().await.unwrap();
    let client = register_test_client(&resources, &[], None).await.unwrap();
    let tokens = issue_tokens(&resources, &client, "openid profile").await;
    let server = &resources.oauth2_server;

    let active = server
        .introspect(&operation(&tokens.access_token), Some(credentials(&client)))
        .await
        .unwrap();
    assert!(active.active);
    assert_eq!(active.scope.as_deref(), Some("openid profile"));
    assert_eq!(active.client_id.as_deref(), Some(client.client_id.as_str()));
    assert_eq!(active.token_type.as_deref(), Some("access_token"));
    assert_eq!(active.iss.as_deref(), Some(server.tokens().issuer()));

    server
        .revoke(&operation(&tokens.access_token), Some(credentials(&client)))
        .await
        .unwrap();
    let inactive = server
        .introspect(&operation(&tokens.access_token), Some(credentials(&client)))
        .await
        .unwrap();
    assert!(!inactive.active);
    assert_eq!(
        serde_json::to_value(&inactive).unwrap(),
        serde_json::json!({"active": false})
    );

    // Second revocation of the same token is a no-op
    server
        .revoke(&operation(&tokens.access_token), Some(credentials(&client)))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_revoking_refresh_token_cascades_to_access_token() {
    let resources = create_test_resources().await.unwrap();
    let client = register_test_client(&resources, &[], None).await.unwrap();
    let tokens = issue_tokens(&resources, &client, "openid email").await;
    let refresh_token = tokens.refresh_token.clone().unwrap();
    let server = &resources.oauth2_server;

    let refresh = server
        .introspect(&operation(&refresh_token), Some(credentials(&client)))
        .await
        .unwrap();
    assert!(refresh.active);
    assert_eq!(refresh.token_type.as_deref(), Some("refresh_token"));

    server
        .revoke(&operation(&refresh_token), Some(credentials(&client)))
        .await
        .unwrap();

    for token in [&refresh_token, &tokens.access_token] {
        let response = server
            .introspect(&operation(token), Some(credentials(&client)))
            .await
            .unwrap();
        assert!(!response.active);
    }

    let err = server
        .token(
            TokenRequest {
                grant_type: Some("refresh_token".to_owned()),
                refresh_token: Some(refresh_token),
                ..TokenRequest::default()
            },
            Some(credentials(&client)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, OAuth2ErrorCode::InvalidGrant);
}

#[tokio::test]
async fn test_foreign_client_cannot_see_or_revoke() {
    let resources = create_test_resources().await.unwrap();
    let owner = register_test_client(&resources, &[], None).await.unwrap();
    let intruder = register_test_client(&resources, &[], None).await.unwrap();
    let tokens = issue_tokens(&resources, &owner, "openid").await;
    let server = &resources.oauth2_server;

    let seen = server
        .introspect(&operation(&tokens.access_token), Some(credentials(&intruder)))
        .await
        .unwrap();
    assert!(!seen.active);

    server
        .revoke(&operation(&tokens.access_token), Some(credentials(&intruder)))
        .await
        .unwrap();
    let still_active = server
        .introspect(&operation(&tokens.access_token), Some(credentials(&owner)))
        .await
        .unwrap();
    assert!(still_active.active);
}

#[tokio::test]
async fn test_garbage_token_is_inactive_and_revocable() {
    let resources = create_test_resources().await.unwrap();
    let client = register_test_client(&resources, &[], None).await.unwrap();
    let server = &resources.oauth2_server;

    let response = server
        .introspect(&operation("not.a.token"), Some(credentials(&client)))
        .await
        .unwrap();
    assert!(!response.active);
    server
        .revoke(&operation("not-a-token"), Some(credentials(&client)))
        .await
        .unwrap();

    let err = server
        .introspect(&TokenOperationRequest::default(), Some(credentials(&client)))
        .await
        .unwrap_err();
    assert_eq!(err.error, OAuth2ErrorCode::InvalidRequest);

    let err = server
        .revoke(&operation("not-a-token"), None)
        .await
        .unwrap_err();
    assert_eq!(err.error, OAuth2ErrorCode::InvalidClient);
}

#[tokio::test]
async fn test_userinfo_rejects_revoked_token() {
    let resources = create_test_resources().await.unwrap();
    let client = register_test_client(&resources, &[], None).await.unwrap();
    let tokens = issue_tokens(&resources, &client, "openid profile").await;
    let server = &resources.oauth2_server;

    let claims = server.userinfo(&tokens.access_token).await.unwrap();
    assert_eq!(claims["name"], "Alice Example");
    assert!(!claims.contains_key("email"));

    server
        .revoke(&operation(&tokens.access_token), Some(credentials(&client)))
        .await
        .unwrap();
    let err = server.userinfo(&tokens.access_token).await.unwrap_err();
    assert_eq!(err.error, OAuth2ErrorCode::InvalidToken);

    let err = server
        .userinfo(tokens.id_token.as_deref().unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.error, OAuth2ErrorCode::InvalidToken);
}

#[tokio::test]
async fn test_refresh_revocation_outlives_refresh_token_expiry() {
    let mut config = test_config();
    config.tokens.refresh_ttl_secs = 60;
    config.tokens.access_ttl_secs = 3600;
    let resources = create_test_resources_with_config(config).await.unwrap();
    let client = register_test_client(&resources, &[], None).await.unwrap();
    let tokens = issue_tokens(&resources, &client, "openid profile").await;
    let server = &resources.oauth2_server;

    server
        .revoke(
            &operation(tokens.refresh_token.as_deref().unwrap()),
            Some(credentials(&client)),
        )
        .await
        .unwrap();

    let report = sweep(&resources.database, Utc::now() + Duration::seconds(120))
        .await
        .unwrap();
    assert_eq!(report.revocations, 0);

    let access = server
        .introspect(&operation(&tokens.access_token), Some(credentials(&client)))
        .await
        .unwrap();
    assert!(!access.active);

    let report = sweep(&resources.database, Utc::now() + Duration::seconds(60 + 3600 + 5))
        .await
        .unwrap();
    assert_eq!(report.revocations, 1);
}
