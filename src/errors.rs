// ABOUTME: Application error types re-exported from sso-core
// ABOUTME: Keeps crate::errors paths stable for every server module
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Unified error handling
//!
//! Error types live in `sso-core` so that every workspace crate shares one
//! identity for `AppError`.

pub use sso_core::errors::{AppError, AppResult, ErrorCode, ErrorResponse, ErrorResponseDetails};
