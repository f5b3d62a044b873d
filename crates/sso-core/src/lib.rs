// ABOUTME: Core types and constants for the OAuth2 / OpenID Connect SSO server
// ABOUTME: Foundation crate with error handling, protocol constants and persisted models
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![deny(unsafe_code)]

//! # SSO Core
//!
//! Foundation crate providing shared types and constants for the authorization
//! server. This crate is designed to change infrequently, enabling incremental
//! compilation benefits in the workspace.
//!
//! ## Modules
//!
//! - **errors**: Unified error handling with `AppError` and `ErrorCode`
//! - **constants**: Protocol identifiers, endpoint paths and default lifetimes
//! - **models**: Users, clients, codes, sessions, consents and the typed `Claim`

/// Unified error handling system with standard error codes and HTTP responses
pub mod errors;

/// Application constants organized by domain
pub mod constants;

/// Core data models
pub mod models;
