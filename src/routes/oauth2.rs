// ABOUTME: OAuth 2.0 / OpenID Connect HTTP endpoints: authorize, login, consent, token, userinfo
// ABOUTME: Introspection, revocation and logout; handlers extract parameters and delegate to the server
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! OAuth 2.0 routes
//!
//! Handlers are thin: they read the session cookie, client credentials and
//! form or query parameters, call [`OAuth2AuthorizationServer`] and turn the
//! outcome into a redirect, an HTML page or a JSON body.
//!
//! [`OAuth2AuthorizationServer`]: crate::oauth2_server::OAuth2AuthorizationServer

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::FormRejection;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::header::AsHeaderName;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sso_core::constants::endpoints;
use sso_core::models::SsoSession;
use tracing::{debug, error, info};

use super::pages;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::oauth2_server::{
    session_id_from_cookie_header, AuthorizeError, AuthorizeOutcome, AuthorizeRequest,
    ClientCredentials, OAuth2Error, TokenOperationRequest, TokenRequest,
};
use crate::resources::ServerResources;

/// Login form submission; the pending authorization request rides along as hidden fields
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    /// Account email
    #[serde(default)]
    pub email: String,
    /// Account password
    #[serde(default)]
    pub password: String,
    /// Authorization request to resume
    #[serde(flatten)]
    pub request: AuthorizeRequest,
}

/// Consent form submission
#[derive(Debug, Deserialize)]
pub struct ConsentForm {
    /// `approve` or `deny`
    #[serde(default)]
    pub decision: String,
    /// Authorization request being approved
    #[serde(flatten)]
    pub request: AuthorizeRequest,
}

/// Consent withdrawal submission
#[derive(Debug, Deserialize)]
pub struct ConsentRevokeForm {
    /// Client whose stored consent is withdrawn
    #[serde(default)]
    pub client_id: String,
}

/// OAuth 2.0 routes implementation
pub struct OAuth2Routes;

impl OAuth2Routes {
    /// Create all OAuth 2.0 routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(endpoints::AUTHORIZE, get(Self::handle_authorize))
            .route(
                endpoints::LOGIN,
                get(Self::handle_login_form).post(Self::handle_login),
            )
            .route(
                endpoints::CONSENT,
                get(Self::handle_consent_form).post(Self::handle_consent),
            )
            .route(endpoints::CONSENT_REVOKE, post(Self::handle_consent_revoke))
            .route(endpoints::TOKEN, post(Self::handle_token))
            .route(endpoints::INTROSPECT, post(Self::handle_introspect))
            .route(endpoints::REVOKE, post(Self::handle_revoke))
            .route(
                endpoints::USERINFO,
                get(Self::handle_userinfo).post(Self::handle_userinfo),
            )
            .route(
                endpoints::LOGOUT,
                get(Self::handle_logout).post(Self::handle_logout),
            )
            .with_state(resources)
    }

    /// Handle GET /oauth/authorize
    async fn handle_authorize(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(request): Query<AuthorizeRequest>,
    ) -> Response {
        let session = match Self::current_session(&resources, &headers).await {
            Ok(session) => session,
            Err(e) => return Self::server_error_page(&e),
        };

        match resources
            .oauth2_server
            .authorize(&request, session.as_ref())
            .await
        {
            Ok(AuthorizeOutcome::Redirect(url)) => Redirect::to(&url).into_response(),
            Ok(AuthorizeOutcome::LoginRequired) => Self::redirect_to_login(&request),
            Ok(AuthorizeOutcome::ConsentRequired {
                client_name,
                missing,
                ..
            }) => pages::consent_page(&request, &client_name, &missing, &resources.registry),
            Err(e) => Self::authorize_error(&e),
        }
    }

    /// Handle GET /oauth/login
    async fn handle_login_form(Query(request): Query<AuthorizeRequest>) -> Response {
        pages::login_page(&request, None, None)
    }

    /// Handle POST /oauth/login
    async fn handle_login(
        State(resources): State<Arc<ServerResources>>,
        connect_info: Option<ConnectInfo<SocketAddr>>,
        headers: HeaderMap,
        Form(form): Form<LoginForm>,
    ) -> Response {
        let sessions = resources.oauth2_server.sessions();
        let user = match sessions.authenticate_user(&form.email, &form.password).await {
            Ok(user) => user,
            Err(e) if e.code == ErrorCode::AuthInvalid => {
                return pages::login_page(
                    &form.request,
                    Some(&form.email),
                    Some("Invalid email or password"),
                );
            }
            Err(e) => return Self::server_error_page(&e),
        };

        // A fresh login never reuses the previous session id
        if let Some(previous) = Self::session_cookie(&headers) {
            if let Err(e) = sessions.logout(previous).await {
                error!(error = %e, "Failed to end the previous session");
            }
        }

        let ip_address = client_ip(connect_info.as_ref(), &headers);
        let user_agent = header_str(&headers, header::USER_AGENT).map(str::to_owned);
        let session = match sessions.create_session(&user, ip_address, user_agent).await {
            Ok(session) => session,
            Err(e) => return Self::server_error_page(&e),
        };
        info!(user_id = %user.id, "User signed in");

        let cookie = sessions.session_cookie(&session.session_id);
        let next = if form.request.client_id.is_some() {
            let resumed = form.request.without_prompt("login");
            Redirect::to(&format!("{}?{}", endpoints::AUTHORIZE, resumed.to_query_string()))
                .into_response()
        } else {
            pages::message_page("Signed in", "You are now signed in.")
        };
        ([(header::SET_COOKIE, cookie)], next).into_response()
    }

    /// Handle GET /oauth/consent
    async fn handle_consent_form(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(request): Query<AuthorizeRequest>,
    ) -> Response {
        let session = match Self::current_session(&resources, &headers).await {
            Ok(Some(session)) => session,
            Ok(None) => return Self::redirect_to_login(&request),
            Err(e) => return Self::server_error_page(&e),
        };
        let server = &resources.oauth2_server;
        let context = match server.validate_authorize_request(&request).await {
            Ok(context) => context,
            Err(e) => return Self::authorize_error(&e),
        };

        let consent = match server
            .consents()
            .current(session.user_id, &context.client.client_id, Utc::now())
            .await
        {
            Ok(consent) => consent,
            Err(e) => return Self::server_error_page(&e),
        };
        let mut scopes = server
            .consents()
            .missing_scopes(consent.as_ref(), &context.scopes);
        if scopes.is_empty() {
            scopes = context.scopes;
        }
        pages::consent_page(&request, &context.client.client_name, &scopes, &resources.registry)
    }

    /// Handle POST /oauth/consent
    async fn handle_consent(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Form(form): Form<ConsentForm>,
    ) -> Response {
        let session = match Self::current_session(&resources, &headers).await {
            Ok(Some(session)) => session,
            Ok(None) => return Self::redirect_to_login(&form.request),
            Err(e) => return Self::server_error_page(&e),
        };

        let server = &resources.oauth2_server;
        let result = match form.decision.as_str() {
            "approve" => server.approve_consent(&form.request, &session).await,
            "deny" => server.deny_consent(&form.request).await,
            _ => {
                return pages::error_page(&OAuth2Error::invalid_request(
                    "decision must be 'approve' or 'deny'",
                ))
            }
        };
        match result {
            Ok(url) => Redirect::to(&url).into_response(),
            Err(e) => Self::authorize_error(&e),
        }
    }

    /// Handle POST /oauth/consent/revoke
    async fn handle_consent_revoke(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        form: Result<Form<ConsentRevokeForm>, FormRejection>,
    ) -> Response {
        let Ok(Form(form)) = form else {
            return pages::error_page(&OAuth2Error::invalid_request("client_id is required"));
        };
        if form.client_id.is_empty() {
            return pages::error_page(&OAuth2Error::invalid_request("client_id is required"));
        }
        let session = match Self::current_session(&resources, &headers).await {
            Ok(Some(session)) => session,
            Ok(None) => return pages::error_page(&OAuth2Error::login_required()),
            Err(e) => return Self::server_error_page(&e),
        };

        match resources
            .oauth2_server
            .consents()
            .revoke(session.user_id, &form.client_id)
            .await
        {
            Ok(_) => pages::message_page(
                "Access removed",
                "The application must ask for your permission again.",
            ),
            Err(e) => Self::server_error_page(&e),
        }
    }

    /// Handle POST /oauth/token
    async fn handle_token(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        form: Result<Form<TokenRequest>, FormRejection>,
    ) -> Response {
        let Form(request) = match form {
            Ok(form) => form,
            Err(rejection) => return Self::form_rejection(&rejection),
        };
        let credentials = ClientCredentials::resolve(
            header_str(&headers, header::AUTHORIZATION),
            request.client_id.as_deref(),
            request.client_secret.as_deref(),
        );

        match resources.oauth2_server.token(request, credentials).await {
            Ok(response) => no_store(Json(response)),
            Err(e) => e.into_response(),
        }
    }

    /// Handle POST /oauth/introspect
    async fn handle_introspect(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        form: Result<Form<TokenOperationRequest>, FormRejection>,
    ) -> Response {
        let Form(request) = match form {
            Ok(form) => form,
            Err(rejection) => return Self::form_rejection(&rejection),
        };
        let credentials = Self::operation_credentials(&headers, &request);

        match resources
            .oauth2_server
            .introspect(&request, credentials)
            .await
        {
            Ok(response) => no_store(Json(response)),
            Err(e) => e.into_response(),
        }
    }

    /// Handle POST /oauth/revoke
    async fn handle_revoke(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        form: Result<Form<TokenOperationRequest>, FormRejection>,
    ) -> Response {
        let Form(request) = match form {
            Ok(form) => form,
            Err(rejection) => return Self::form_rejection(&rejection),
        };
        let credentials = Self::operation_credentials(&headers, &request);

        match resources.oauth2_server.revoke(&request, credentials).await {
            Ok(()) => (StatusCode::OK, Json(json!({}))).into_response(),
            Err(e) => e.into_response(),
        }
    }

    /// Handle GET/POST /oauth/userinfo
    async fn handle_userinfo(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Response {
        let Some(token) = header_str(&headers, header::AUTHORIZATION)
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
        else {
            return OAuth2Error::invalid_token().into_response();
        };

        match resources.oauth2_server.userinfo(token).await {
            Ok(claims) => no_store(Json(claims)),
            Err(e) => e.into_response(),
        }
    }

    /// Handle GET/POST /oauth/logout
    async fn handle_logout(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Response {
        let sessions = resources.oauth2_server.sessions();
        if let Some(session_id) = Self::session_cookie(&headers) {
            if let Err(e) = sessions.logout(session_id).await {
                return Self::server_error_page(&e);
            }
        }
        (
            [(header::SET_COOKIE, sessions.clear_cookie())],
            pages::message_page("Signed out", "You have been signed out."),
        )
            .into_response()
    }

    /// Active SSO session named by the request's cookie
    async fn current_session(
        resources: &ServerResources,
        headers: &HeaderMap,
    ) -> AppResult<Option<SsoSession>> {
        match Self::session_cookie(headers) {
            Some(session_id) => {
                resources
                    .oauth2_server
                    .sessions()
                    .resolve(session_id, Utc::now())
                    .await
            }
            None => Ok(None),
        }
    }

    fn session_cookie(headers: &HeaderMap) -> Option<&str> {
        header_str(headers, header::COOKIE).and_then(session_id_from_cookie_header)
    }

    fn operation_credentials(
        headers: &HeaderMap,
        request: &TokenOperationRequest,
    ) -> Option<ClientCredentials> {
        ClientCredentials::resolve(
            header_str(headers, header::AUTHORIZATION),
            request.client_id.as_deref(),
            request.client_secret.as_deref(),
        )
    }

    fn redirect_to_login(request: &AuthorizeRequest) -> Response {
        Redirect::to(&format!("{}?{}", endpoints::LOGIN, request.to_query_string())).into_response()
    }

    fn authorize_error(error: &AuthorizeError) -> Response {
        match error.redirect_url() {
            Some(url) => {
                debug!(error = %error.error(), "Returning authorization error to the client");
                Redirect::to(&url).into_response()
            }
            None => pages::error_page(error.error()),
        }
    }

    fn server_error_page(cause: &AppError) -> Response {
        error!(error = %cause, "OAuth2 browser flow failed");
        pages::error_page(&OAuth2Error::server_error())
    }

    fn form_rejection(rejection: &FormRejection) -> Response {
        debug!(error = %rejection, "Rejected malformed form body");
        OAuth2Error::invalid_request("Request body must be application/x-www-form-urlencoded")
            .into_response()
    }
}

/// JSON body with the caching headers RFC 6749 requires for token material
fn no_store<T: IntoResponse>(body: T) -> Response {
    (
        [(header::CACHE_CONTROL, "no-store"), (header::PRAGMA, "no-cache")],
        body,
    )
        .into_response()
}

fn header_str<K: AsHeaderName>(headers: &HeaderMap, name: K) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// First `X-Forwarded-For` hop, else the socket peer address
fn client_ip(connect_info: Option<&ConnectInfo<SocketAddr>>, headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next())
        .map(|ip| ip.trim().to_owned())
        .filter(|ip| !ip.is_empty())
        .or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        let peer = ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4000)));
        assert_eq!(client_ip(Some(&peer), &headers).as_deref(), Some("10.0.0.1"));

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        assert_eq!(client_ip(Some(&peer), &headers).as_deref(), Some("203.0.113.9"));
        assert_eq!(client_ip(None, &HeaderMap::new()), None);
    }

    #[test]
    fn test_login_form_keeps_authorize_parameters() {
        let form: LoginForm = serde_urlencoded::from_str(
            "email=a%40example.com&password=pw&client_id=app&prompt=login+consent&state=xyz",
        )
        .unwrap();
        assert_eq!(form.email, "a@example.com");
        assert_eq!(form.request.client_id.as_deref(), Some("app"));
        assert_eq!(
            form.request.without_prompt("login").prompt.as_deref(),
            Some("consent")
        );
    }
}
