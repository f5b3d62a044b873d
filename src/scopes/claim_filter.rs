// ABOUTME: Releases user profile claims according to granted scopes
// ABOUTME: Shared by ID token issuance and the userinfo endpoint so both release the same claims
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{Map, Value};
use sso_core::models::{Claim, UserProfile};

use super::{ScopeRegistry, ScopeSet};

/// Projects a [`UserProfile`] onto the claims a scope set authorizes
#[derive(Debug, Clone)]
pub struct ClaimFilter {
    registry: Arc<ScopeRegistry>,
}

impl ClaimFilter {
    /// Filter backed by `registry`
    #[must_use]
    pub const fn new(registry: Arc<ScopeRegistry>) -> Self {
        Self { registry }
    }

    /// Claims `scopes` authorize, `sub` included
    #[must_use]
    pub fn allowed_claims(&self, scopes: &ScopeSet) -> BTreeSet<Claim> {
        self.registry.claims_for_scopes(scopes)
    }

    /// Profile claims for an ID token. `sub` is excluded because the token carries it already.
    #[must_use]
    pub fn profile_claims(&self, profile: &UserProfile, scopes: &ScopeSet) -> Map<String, Value> {
        self.allowed_claims(scopes)
            .into_iter()
            .filter_map(|claim| {
                profile
                    .claim_value(claim)
                    .map(|value| (claim.as_str().to_owned(), value))
            })
            .collect()
    }

    /// Userinfo response body: `sub` plus every authorized claim the user has a value for
    #[must_use]
    pub fn userinfo(
        &self,
        subject: &str,
        profile: &UserProfile,
        scopes: &ScopeSet,
    ) -> Map<String, Value> {
        let mut claims = self.profile_claims(profile, scopes);
        claims.insert(
            Claim::Sub.as_str().to_owned(),
            Value::String(subject.to_owned()),
        );
        claims
    }
}
