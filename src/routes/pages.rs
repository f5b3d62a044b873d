// ABOUTME: Browser-facing HTML pages for login, consent and authorization errors
// ABOUTME: Templates are embedded at compile time; every interpolated value is HTML-escaped
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::fmt::Write;

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use html_escape::{encode_double_quoted_attribute, encode_text};
use serde_json::Value;
use sso_core::constants::endpoints;

use crate::oauth2_server::{AuthorizeRequest, OAuth2Error, OAuth2ErrorCode};
use crate::scopes::{ScopeRegistry, ScopeSet};

/// Loaded with `include_str!()` to avoid blocking filesystem IO at runtime
const OAUTH_ERROR_TEMPLATE: &str = include_str!("../../templates/oauth_error.html");
const LOGIN_TEMPLATE: &str = include_str!("../../templates/login.html");
const CONSENT_TEMPLATE: &str = include_str!("../../templates/consent.html");

/// Error page for failures that cannot be redirected back to the client
#[must_use]
pub fn error_page(error: &OAuth2Error) -> Response {
    let error_title = match error.error {
        OAuth2ErrorCode::InvalidClient => "Invalid Client",
        OAuth2ErrorCode::UnauthorizedClient => "Unauthorized Client",
        OAuth2ErrorCode::AccessDenied => "Access Denied",
        OAuth2ErrorCode::InvalidScope => "Invalid Scope",
        OAuth2ErrorCode::ServerError => "Server Error",
        _ => "Authorization Error",
    };
    let description = error
        .error_description
        .as_deref()
        .unwrap_or("An error occurred during the authorization process.");

    let body = OAUTH_ERROR_TEMPLATE
        .replace("{{error_title}}", error_title)
        .replace("{{ERROR}}", error.error.as_str())
        .replace(
            "{{DESCRIPTION}}",
            &format!(r#"<div class="description">{}</div>"#, encode_text(description)),
        );
    (error.http_status(), Html(body)).into_response()
}

/// Login form that resubmits the pending authorization request
#[must_use]
pub fn login_page(request: &AuthorizeRequest, email: Option<&str>, error: Option<&str>) -> Response {
    let status = if error.is_some() {
        StatusCode::UNAUTHORIZED
    } else {
        StatusCode::OK
    };
    let error = error
        .map(|message| format!(r#"<div class="error">{}</div>"#, encode_text(message)))
        .unwrap_or_default();

    let body = LOGIN_TEMPLATE
        .replace("{{ACTION}}", endpoints::LOGIN)
        .replace("{{ERROR}}", &error)
        .replace("{{EMAIL}}", &encode_double_quoted_attribute(email.unwrap_or_default()))
        .replace("{{HIDDEN_FIELDS}}", &hidden_fields(request));
    (status, Html(body)).into_response()
}

/// Consent screen listing the scopes awaiting approval
#[must_use]
pub fn consent_page(
    request: &AuthorizeRequest,
    client_name: &str,
    scopes: &ScopeSet,
    registry: &ScopeRegistry,
) -> Response {
    let items = scopes.iter().fold(String::new(), |mut items, scope| {
        let description = registry.get(scope).map_or(scope, |d| d.description.as_str());
        let _ = write!(
            items,
            r#"<li>{} <span class="scope">({})</span></li>"#,
            encode_text(description),
            encode_text(scope)
        );
        items
    });

    let body = CONSENT_TEMPLATE
        .replace("{{CLIENT_NAME}}", &encode_text(client_name))
        .replace("{{SCOPES}}", &items)
        .replace("{{ACTION}}", endpoints::CONSENT)
        .replace("{{HIDDEN_FIELDS}}", &hidden_fields(request));
    Html(body).into_response()
}

/// Plain confirmation page
#[must_use]
pub fn message_page(title: &str, message: &str) -> Response {
    let body = format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body><h1>{title}</h1><p>{message}</p></body></html>",
        title = encode_text(title),
        message = encode_text(message)
    );
    Html(body).into_response()
}

/// Hidden inputs carrying every authorization parameter that was present
fn hidden_fields(request: &AuthorizeRequest) -> String {
    let Ok(Value::Object(params)) = serde_json::to_value(request) else {
        return String::new();
    };
    params
        .iter()
        .filter_map(|(name, value)| value.as_str().map(|value| (name, value)))
        .fold(String::new(), |mut fields, (name, value)| {
            let _ = write!(
                fields,
                r#"<input type="hidden" name="{}" value="{}">"#,
                encode_double_quoted_attribute(name),
                encode_double_quoted_attribute(value)
            );
            fields
        })
}
