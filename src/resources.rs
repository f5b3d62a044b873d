// ABOUTME: Shared resource container handed to every HTTP handler as axum state
// ABOUTME: Built once at startup; everything inside is immutable or internally synchronized
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Server Resources
//!
//! Expensive objects (the database pool, the RSA key store, the scope
//! registry) are created once and shared through `Arc`s.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::crypto::KeyStore;
use crate::database::Database;
use crate::oauth2_server::OAuth2AuthorizationServer;
use crate::scopes::ScopeRegistry;
use crate::tokens::{TokenEngine, TokenLifetimes};

/// Centralized resource container for dependency injection
#[derive(Clone)]
pub struct ServerResources {
    /// Loaded configuration
    pub config: Arc<ServerConfig>,
    /// Storage
    pub database: Arc<Database>,
    /// Signing / encryption key pair
    pub key_store: Arc<KeyStore>,
    /// Immutable scope registry
    pub registry: Arc<ScopeRegistry>,
    /// Authorization server operations
    pub oauth2_server: OAuth2AuthorizationServer,
}

impl ServerResources {
    /// Wire resources with the standard `OpenID` Connect scope registry
    #[must_use]
    pub fn new(config: ServerConfig, database: Arc<Database>, key_store: Arc<KeyStore>) -> Self {
        Self::with_registry(config, database, key_store, Arc::new(ScopeRegistry::standard()))
    }

    /// Wire resources around a caller-built scope registry
    #[must_use]
    pub fn with_registry(
        config: ServerConfig,
        database: Arc<Database>,
        key_store: Arc<KeyStore>,
        registry: Arc<ScopeRegistry>,
    ) -> Self {
        let tokens = TokenEngine::new(
            key_store.clone(),
            config.issuer_url.clone(),
            config.tokens.format,
            TokenLifetimes::from(&config.tokens),
        );
        let oauth2_server =
            OAuth2AuthorizationServer::new(database.clone(), registry.clone(), tokens, &config);

        Self {
            config: Arc::new(config),
            database,
            key_store,
            registry,
            oauth2_server,
        }
    }

    /// Absolute URL of a server path
    #[must_use]
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}{path}", self.config.issuer_url)
    }
}
