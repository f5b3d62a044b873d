// ABOUTME: Stored consent lookup and approval with optimistic concurrency
// ABOUTME: Approvals merge into the existing grant and retry a bounded number of times on version conflicts
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sso_core::models::UserConsent;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::{ConsentWrite, Database};
use crate::errors::{AppError, AppResult};
use crate::scopes::{ScopeRegistry, ScopeSet};

const MAX_WRITE_ATTEMPTS: usize = 3;

/// Reads and writes per-(user, client) consent
#[derive(Clone)]
pub struct ConsentManager {
    database: Arc<Database>,
    registry: Arc<ScopeRegistry>,
    ttl: Duration,
}

impl ConsentManager {
    /// Consent manager storing grants for `ttl_days`
    #[must_use]
    pub fn new(database: Arc<Database>, registry: Arc<ScopeRegistry>, ttl_days: i64) -> Self {
        Self {
            database,
            registry,
            ttl: Duration::days(ttl_days),
        }
    }

    /// Unexpired consent for the pair
    ///
    /// # Errors
    /// Returns an error if the lookup fails
    pub async fn current(
        &self,
        user_id: Uuid,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<UserConsent>> {
        Ok(self
            .database
            .get_consent(user_id, client_id)
            .await?
            .filter(|consent| !consent.is_expired(now)))
    }

    /// Requested scopes not covered by `consent` or any scope it expands to
    #[must_use]
    pub fn missing_scopes(&self, consent: Option<&UserConsent>, requested: &ScopeSet) -> ScopeSet {
        let Some(consent) = consent else {
            return requested.clone();
        };
        let stored: ScopeSet = consent.scopes.iter().cloned().collect();
        requested.difference(&self.registry.expand_scopes(&stored))
    }

    /// Record approval of `approved`, merged with whatever is already granted
    ///
    /// # Errors
    /// Returns `ResourceConflict` if every attempt lost a concurrent write, or a database error
    pub async fn grant(
        &self,
        user_id: Uuid,
        client_id: &str,
        approved: &ScopeSet,
    ) -> AppResult<UserConsent> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let now = Utc::now();
            let existing = self.database.get_consent(user_id, client_id).await?;
            let (scopes, outcome) = match &existing {
                None => {
                    let consent = self.record(user_id, client_id, approved.clone(), now, 1);
                    let outcome = self.database.insert_consent(&consent).await?;
                    (consent, outcome)
                }
                Some(stored) => {
                    // An expired grant is replaced, not extended
                    let merged = if stored.is_expired(now) {
                        approved.clone()
                    } else {
                        stored.scopes.iter().cloned().collect::<ScopeSet>().union(approved)
                    };
                    let consent =
                        self.record(user_id, client_id, merged, now, stored.version + 1);
                    let outcome = self.database.update_consent(&consent, stored.version).await?;
                    (consent, outcome)
                }
            };

            match outcome {
                ConsentWrite::Applied => {
                    info!(
                        user_id = %user_id,
                        client_id = %client_id,
                        scopes = %scopes.scopes.join(" "),
                        "Consent granted"
                    );
                    return Ok(scopes);
                }
                ConsentWrite::Conflict => {
                    debug!(user_id = %user_id, client_id = %client_id, attempt, "Consent write conflict, retrying");
                }
            }
        }

        warn!(user_id = %user_id, client_id = %client_id, "Consent write kept conflicting");
        Err(AppError::conflict("Consent was modified concurrently"))
    }

    /// Withdraw consent for a client. Returns whether a stored grant existed.
    ///
    /// # Errors
    /// Returns an error if the delete fails
    pub async fn revoke(&self, user_id: Uuid, client_id: &str) -> AppResult<bool> {
        let removed = self.database.delete_consent(user_id, client_id).await?;
        if removed {
            info!(user_id = %user_id, client_id = %client_id, "Consent withdrawn");
        }
        Ok(removed)
    }

    fn record(
        &self,
        user_id: Uuid,
        client_id: &str,
        scopes: ScopeSet,
        now: DateTime<Utc>,
        version: i64,
    ) -> UserConsent {
        UserConsent {
            user_id,
            client_id: client_id.to_owned(),
            scopes: scopes.into_vec(),
            granted_at: now,
            expires_at: now + self.ttl,
            version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn manager() -> ConsentManager {
        let database = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        ConsentManager::new(database, Arc::new(ScopeRegistry::standard()), 365)
    }

    #[tokio::test]
    async fn test_grant_merges_with_existing() {
        let consents = manager().await;
        let user_id = Uuid::new_v4();
        consents
            .grant(user_id, "app", &ScopeSet::parse("openid profile"))
            .await
            .unwrap();
        let merged = consents
            .grant(user_id, "app", &ScopeSet::parse("email"))
            .await
            .unwrap();
        assert_eq!(merged.scopes, vec!["openid", "profile", "email"]);
        assert_eq!(merged.version, 2);
        assert_eq!(merged.expires_at - merged.granted_at, Duration::days(365));
    }

    #[tokio::test]
    async fn test_missing_scopes_is_delta() {
        let consents = manager().await;
        let user_id = Uuid::new_v4();
        consents
            .grant(user_id, "app", &ScopeSet::parse("openid profile"))
            .await
            .unwrap();
        let stored = consents.current(user_id, "app", Utc::now()).await.unwrap();
        let missing =
            consents.missing_scopes(stored.as_ref(), &ScopeSet::parse("openid profile email"));
        assert_eq!(missing, ScopeSet::parse("email"));
        assert!(consents
            .missing_scopes(stored.as_ref(), &ScopeSet::parse("profile"))
            .is_empty());
        assert_eq!(
            consents.missing_scopes(None, &ScopeSet::parse("openid")),
            ScopeSet::parse("openid")
        );
    }

    #[tokio::test]
    async fn test_expired_consent_is_not_current() {
        let consents = manager().await;
        let user_id = Uuid::new_v4();
        consents
            .grant(user_id, "app", &ScopeSet::parse("openid"))
            .await
            .unwrap();
        let later = Utc::now() + Duration::days(366);
        assert!(consents.current(user_id, "app", later).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_grants_all_land() {
        let consents = manager().await;
        let user_id = Uuid::new_v4();
        let a = consents.clone();
        let b = consents.clone();
        let scopes_a = ScopeSet::parse("openid");
        let scopes_b = ScopeSet::parse("email");
        let (ra, rb) = tokio::join!(
            a.grant(user_id, "app", &scopes_a),
            b.grant(user_id, "app", &scopes_b)
        );
        ra.unwrap();
        rb.unwrap();
        let stored = consents.current(user_id, "app", Utc::now()).await.unwrap().unwrap();
        let stored: ScopeSet = stored.scopes.into_iter().collect();
        assert!(ScopeSet::parse("openid email").is_subset_of(&stored));
    }
}
