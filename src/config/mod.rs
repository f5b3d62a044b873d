// ABOUTME: Configuration module root
// ABOUTME: Environment-only configuration for the authorization server
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Environment variable parsing and the typed `ServerConfig`
pub mod environment;

pub use environment::{Environment, KeyStoreConfig, ServerConfig, SessionConfig, TokenConfig};
