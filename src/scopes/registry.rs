// ABOUTME: Scope registry with parent/child hierarchy, built once and shared immutably
// ABOUTME: Normalizes, expands and validates requested scopes against clients and original grants
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Scope Registry
//!
//! Scopes are registered through [`ScopeRegistryBuilder`], which rejects
//! duplicates, dangling parent/child references and cycles. The finished
//! [`ScopeRegistry`] is read-only and is shared as `Arc<ScopeRegistry>`.
//!
//! A parent scope grants all of its descendants: `expand_scopes` walks the
//! hierarchy depth-first and never visits a scope twice.

use std::collections::{BTreeSet, HashMap, HashSet};

use sso_core::constants::scopes as standard;
use sso_core::models::Claim;
use thiserror::Error;

use super::{ScopeError, ScopeSet};

/// One registered scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeDefinition {
    /// Unique scope name
    pub name: String,
    /// Text shown on the consent screen
    pub description: String,
    /// Claims this scope releases
    pub claims: BTreeSet<Claim>,
    /// Granted when a request names no scope
    pub is_default: bool,
    /// Scope this one is nested under
    pub parent_scope: Option<String>,
    /// Scopes granted along with this one
    pub child_scopes: BTreeSet<String>,
}

impl ScopeDefinition {
    /// Scope with no claims, parent or children
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            claims: BTreeSet::new(),
            is_default: false,
            parent_scope: None,
            child_scopes: BTreeSet::new(),
        }
    }

    /// Release `claims` with this scope
    #[must_use]
    pub fn with_claims(mut self, claims: impl IntoIterator<Item = Claim>) -> Self {
        self.claims.extend(claims);
        self
    }

    /// Grant this scope when none is requested
    #[must_use]
    pub const fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Nest this scope under `parent`
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_scope = Some(parent.into());
        self
    }

    /// Grant `children` along with this scope
    #[must_use]
    pub fn with_children<S: Into<String>>(mut self, children: impl IntoIterator<Item = S>) -> Self {
        self.child_scopes.extend(children.into_iter().map(Into::into));
        self
    }
}

/// Registration failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Name is empty or contains characters outside RFC 6749 `scope-token`
    #[error("invalid scope name '{0}'")]
    InvalidName(String),
    /// Name already registered
    #[error("scope '{0}' is already registered")]
    Duplicate(String),
    /// Parent not registered yet
    #[error("scope '{scope}' names unknown parent '{parent}'")]
    UnknownParent {
        /// Scope being registered
        scope: String,
        /// Missing parent
        parent: String,
    },
    /// Child not registered yet
    #[error("scope '{scope}' names unknown child '{child}'")]
    UnknownChild {
        /// Scope being registered
        scope: String,
        /// Missing child
        child: String,
    },
    /// Registration would make the hierarchy cyclic
    #[error("registering scope '{0}' would create a cycle")]
    Cycle(String),
}

/// Outcome of checking requested scopes against a client's allowed list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeValidation {
    /// Whether every requested scope is allowed
    pub valid: bool,
    /// Requested scopes that are not allowed
    pub unauthorized: Vec<String>,
}

impl ScopeValidation {
    /// Convert into a `Result`
    ///
    /// # Errors
    /// Returns [`ScopeError::Unauthorized`] listing the offending scopes
    pub fn into_result(self) -> Result<(), ScopeError> {
        if self.valid {
            Ok(())
        } else {
            Err(ScopeError::Unauthorized(self.unauthorized))
        }
    }
}

/// Collects scope definitions and checks the hierarchy as it grows
#[derive(Debug, Default)]
pub struct ScopeRegistryBuilder {
    scopes: HashMap<String, ScopeDefinition>,
    order: Vec<String>,
}

impl ScopeRegistryBuilder {
    /// Empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pre-loaded with the standard `OpenID` Connect scopes
    #[must_use]
    pub fn with_standard_scopes() -> Self {
        let mut builder = Self::new();
        for definition in standard_scopes() {
            builder.insert(definition);
        }
        builder
    }

    /// Register a scope
    ///
    /// # Errors
    /// Returns a [`RegistryError`] if the name is invalid or taken, a parent or
    /// child is unknown, or the new edges would form a cycle
    pub fn register(&mut self, definition: ScopeDefinition) -> Result<&mut Self, RegistryError> {
        let name = definition.name.clone();
        if !is_scope_token(&name) {
            return Err(RegistryError::InvalidName(name));
        }
        if self.scopes.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        if let Some(parent) = &definition.parent_scope {
            if !self.scopes.contains_key(parent) {
                return Err(RegistryError::UnknownParent {
                    scope: name,
                    parent: parent.clone(),
                });
            }
        }
        if let Some(child) = definition
            .child_scopes
            .iter()
            .find(|child| !self.scopes.contains_key(*child))
        {
            return Err(RegistryError::UnknownChild {
                scope: name,
                child: child.clone(),
            });
        }

        let mut edges = child_edges(self.scopes.values());
        add_edges(&mut edges, &definition);
        if reaches(&edges, &name, &name) {
            return Err(RegistryError::Cycle(name));
        }

        self.insert(definition);
        Ok(self)
    }

    fn insert(&mut self, definition: ScopeDefinition) {
        self.order.push(definition.name.clone());
        self.scopes.insert(definition.name.clone(), definition);
    }

    /// Freeze the registry
    #[must_use]
    pub fn build(self) -> ScopeRegistry {
        let children = child_edges(self.scopes.values());
        ScopeRegistry {
            scopes: self.scopes,
            order: self.order,
            children,
        }
    }
}

/// Read-only scope registry
#[derive(Debug, Clone)]
pub struct ScopeRegistry {
    scopes: HashMap<String, ScopeDefinition>,
    order: Vec<String>,
    children: HashMap<String, BTreeSet<String>>,
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ScopeRegistry {
    /// Registry holding only the standard `OpenID` Connect scopes
    #[must_use]
    pub fn standard() -> Self {
        ScopeRegistryBuilder::with_standard_scopes().build()
    }

    /// Look up a definition
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ScopeDefinition> {
        self.scopes.get(name)
    }

    /// Definitions in registration order
    pub fn definitions(&self) -> impl Iterator<Item = &ScopeDefinition> {
        self.order.iter().filter_map(|name| self.scopes.get(name))
    }

    /// Whether `name` is registered
    #[must_use]
    pub fn is_valid_scope(&self, name: &str) -> bool {
        self.scopes.contains_key(name)
    }

    /// Scopes granted when a request names none
    #[must_use]
    pub fn default_scopes(&self) -> ScopeSet {
        self.definitions()
            .filter(|definition| definition.is_default)
            .map(|definition| definition.name.clone())
            .collect()
    }

    /// Trim, dedupe (first-seen order) and drop unknown scopes
    #[must_use]
    pub fn normalize_scope(&self, raw: &str) -> ScopeSet {
        ScopeSet::parse(raw)
            .into_vec()
            .into_iter()
            .filter(|scope| self.is_valid_scope(scope))
            .collect()
    }

    /// Scopes in `raw` that are not registered
    #[must_use]
    pub fn unknown_scopes(&self, raw: &str) -> Vec<String> {
        ScopeSet::parse(raw)
            .into_vec()
            .into_iter()
            .filter(|scope| !self.is_valid_scope(scope))
            .collect()
    }

    /// Each scope followed by all of its transitive children; unknown scopes are dropped
    #[must_use]
    pub fn expand_scopes(&self, scopes: &ScopeSet) -> ScopeSet {
        let mut visited = HashSet::new();
        let mut expanded = Vec::new();
        for scope in scopes.iter() {
            self.expand_into(scope, &mut visited, &mut expanded);
        }
        ScopeSet(expanded)
    }

    fn expand_into(&self, scope: &str, visited: &mut HashSet<String>, out: &mut Vec<String>) {
        if !self.is_valid_scope(scope) || !visited.insert(scope.to_owned()) {
            return;
        }
        out.push(scope.to_owned());
        if let Some(children) = self.children.get(scope) {
            for child in children {
                self.expand_into(child, visited, out);
            }
        }
    }

    /// Claims released by `scopes` and their descendants; always includes `sub`
    #[must_use]
    pub fn claims_for_scopes(&self, scopes: &ScopeSet) -> BTreeSet<Claim> {
        let mut claims = BTreeSet::from([Claim::Sub]);
        for scope in self.expand_scopes(scopes).iter() {
            if let Some(definition) = self.scopes.get(scope) {
                claims.extend(definition.claims.iter().copied());
            }
        }
        claims
    }

    /// Check `requested` against a client's allowed scopes (empty = unrestricted).
    ///
    /// A requested scope is allowed when it is listed or descends from a listed scope.
    #[must_use]
    pub fn validate_scope_against_allowed(
        &self,
        requested: &ScopeSet,
        allowed: &[String],
    ) -> ScopeValidation {
        if allowed.is_empty() {
            return ScopeValidation {
                valid: true,
                unauthorized: Vec::new(),
            };
        }
        let allowed: ScopeSet = allowed.iter().cloned().collect();
        let permitted = self.expand_scopes(&allowed).union(&allowed);
        let unauthorized = requested.difference(&permitted).into_vec();
        ScopeValidation {
            valid: unauthorized.is_empty(),
            unauthorized,
        }
    }

    /// Scope for a refresh request: the original grant when nothing is requested,
    /// otherwise the requested scopes, which must all lie within the original grant
    ///
    /// # Errors
    /// Returns [`ScopeError::ExceedsOriginalGrant`] listing the offending scopes
    pub fn validate_scope_downgrade(
        &self,
        requested: Option<&str>,
        original: &ScopeSet,
    ) -> Result<ScopeSet, ScopeError> {
        let requested = match requested.map(ScopeSet::parse) {
            Some(requested) if !requested.is_empty() => requested,
            _ => return Ok(original.clone()),
        };
        let granted = original.union(&self.expand_scopes(original));
        let exceeding = requested.difference(&granted);
        if exceeding.is_empty() {
            Ok(requested)
        } else {
            Err(ScopeError::ExceedsOriginalGrant(exceeding.into_vec()))
        }
    }
}

/// RFC 6749 section 3.3 `scope-token`
fn is_scope_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b == 0x21 || (0x23..=0x5B).contains(&b) || (0x5D..=0x7E).contains(&b))
}

fn add_edges(edges: &mut HashMap<String, BTreeSet<String>>, definition: &ScopeDefinition) {
    edges
        .entry(definition.name.clone())
        .or_default()
        .extend(definition.child_scopes.iter().cloned());
    if let Some(parent) = &definition.parent_scope {
        edges
            .entry(parent.clone())
            .or_default()
            .insert(definition.name.clone());
    }
}

fn child_edges<'a>(
    definitions: impl Iterator<Item = &'a ScopeDefinition>,
) -> HashMap<String, BTreeSet<String>> {
    let mut edges = HashMap::new();
    for definition in definitions {
        add_edges(&mut edges, definition);
    }
    edges
}

/// Whether `target` is reachable from `start` through at least one edge
fn reaches(edges: &HashMap<String, BTreeSet<String>>, start: &str, target: &str) -> bool {
    let mut stack: Vec<&str> = edges
        .get(start)
        .map(|children| children.iter().map(String::as_str).collect())
        .unwrap_or_default();
    let mut visited = HashSet::new();
    while let Some(node) = stack.pop() {
        if node == target {
            return true;
        }
        if visited.insert(node) {
            if let Some(children) = edges.get(node) {
                stack.extend(children.iter().map(String::as_str));
            }
        }
    }
    false
}

fn standard_scopes() -> [ScopeDefinition; 6] {
    [
        ScopeDefinition::new(standard::OPENID, "Sign you in with your account")
            .with_claims([Claim::Sub])
            .as_default(),
        ScopeDefinition::new(
            standard::PROFILE,
            "View your basic profile (name, picture, locale)",
        )
        .with_claims(Claim::PROFILE_SCOPE),
        ScopeDefinition::new(standard::EMAIL, "View your email address")
            .with_claims(Claim::EMAIL_SCOPE),
        ScopeDefinition::new(standard::PHONE, "View your phone number")
            .with_claims(Claim::PHONE_SCOPE),
        ScopeDefinition::new(standard::ADDRESS, "View your postal address")
            .with_claims(Claim::ADDRESS_SCOPE),
        ScopeDefinition::new(
            standard::OFFLINE_ACCESS,
            "Keep access to your data while you are not signed in",
        ),
    ]
}
