// ABOUTME: Scope handling: ordered scope sets, the immutable scope registry and the claim filter
// ABOUTME: Scope strings are parsed once into ScopeSet and compared structurally afterwards
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Filters profile claims by granted scope
pub mod claim_filter;
/// Scope definitions, hierarchy and validation
pub mod registry;

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

pub use claim_filter::ClaimFilter;
pub use registry::{RegistryError, ScopeDefinition, ScopeRegistry, ScopeRegistryBuilder, ScopeValidation};

/// Ordered, duplicate-free list of scope names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet(Vec<String>);

impl ScopeSet {
    /// Split a space-delimited scope string, dropping duplicates but keeping first-seen order
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        raw.split_whitespace().map(str::to_owned).collect()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of scopes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether `scope` is in the set
    #[must_use]
    pub fn contains(&self, scope: &str) -> bool {
        self.0.iter().any(|s| s == scope)
    }

    /// Iterate in order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Scopes as a slice
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Consume into the underlying vector
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    /// Whether every scope in `self` is also in `other`
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        let other: HashSet<&str> = other.iter().collect();
        self.iter().all(|scope| other.contains(scope))
    }

    /// `self` followed by the scopes of `other` not already present
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        self.iter().chain(other.iter()).map(str::to_owned).collect()
    }

    /// Scopes of `self` missing from `other`
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let other: HashSet<&str> = other.iter().collect();
        self.iter()
            .filter(|scope| !other.contains(scope))
            .map(str::to_owned)
            .collect()
    }
}

impl FromIterator<String> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut seen = HashSet::new();
        let mut scopes = Vec::new();
        for scope in iter {
            if seen.insert(scope.clone()) {
                scopes.push(scope);
            }
        }
        Self(scopes)
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// Scope request failures, each mapped to `invalid_scope`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// Requested scopes the registry does not know
    #[error("unknown scope(s): {}", .0.join(" "))]
    Unknown(Vec<String>),
    /// Requested scopes outside the client's allowed list
    #[error("scope(s) not allowed for this client: {}", .0.join(" "))]
    Unauthorized(Vec<String>),
    /// Refresh requested scopes beyond the original grant
    #[error("scope(s) exceed the original grant: {}", .0.join(" "))]
    ExceedsOriginalGrant(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dedupes_in_first_seen_order() {
        let scopes = ScopeSet::parse("  email openid  email profile openid ");
        assert_eq!(scopes.as_slice(), ["email", "openid", "profile"]);
        assert_eq!(scopes.to_string(), "email openid profile");
    }

    #[test]
    fn test_set_operations() {
        let a = ScopeSet::parse("openid profile email");
        let b = ScopeSet::parse("openid phone");
        assert_eq!(a.union(&b).to_string(), "openid profile email phone");
        assert_eq!(a.difference(&b).to_string(), "profile email");
        assert!(ScopeSet::parse("openid").is_subset_of(&a));
        assert!(!b.is_subset_of(&a));
        assert!(ScopeSet::default().is_subset_of(&a));
    }
}
