// ABOUTME: Route module organization for the authorization server HTTP endpoints
// ABOUTME: Merges OAuth, well-known and health routers behind tracing and request-id layers
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Route module
//!
//! Each domain module contains only route definitions and thin handler
//! functions that delegate to the authorization server.

/// Health check route
pub mod health;
/// OAuth 2.0 / `OpenID` Connect endpoints
pub mod oauth2;
/// Login, consent and error pages
pub mod pages;
/// Discovery document and JWKS
pub mod well_known;

use std::sync::Arc;

use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use health::HealthRoutes;
pub use oauth2::OAuth2Routes;
pub use well_known::{DiscoveryDocument, WellKnownRoutes};

use crate::resources::ServerResources;

/// Complete application router
pub fn build_router(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .merge(OAuth2Routes::routes(resources.clone()))
        .merge(WellKnownRoutes::routes(resources.clone()))
        .merge(HealthRoutes::routes(resources))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
