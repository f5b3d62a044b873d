// ABOUTME: User consent database operations with optimistic concurrency on a version column
// ABOUTME: Writes report a conflict instead of overwriting a record changed since it was read
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use sso_core::models::UserConsent;
use uuid::Uuid;

use super::{from_timestamp, Database};
use crate::errors::{AppError, AppResult};

/// Outcome of a conditional consent write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentWrite {
    /// Row written
    Applied,
    /// Row was created or changed concurrently; re-read and retry
    Conflict,
}

impl Database {
    pub(super) async fn migrate_consents(&self) -> AppResult<()> {
        self.execute_ddl(
            r"
            CREATE TABLE IF NOT EXISTS user_consents (
                user_id TEXT NOT NULL,
                client_id TEXT NOT NULL,
                scopes TEXT NOT NULL,
                granted_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (user_id, client_id)
            )
            ",
        )
        .await?;
        self.execute_ddl(
            "CREATE INDEX IF NOT EXISTS idx_user_consents_expires_at ON user_consents(expires_at)",
        )
        .await
    }

    /// Stored consent for `(user_id, client_id)`, expired or not
    ///
    /// # Errors
    /// Returns an error if the query fails or the row is corrupt
    pub async fn get_consent(&self, user_id: Uuid, client_id: &str) -> AppResult<Option<UserConsent>> {
        let row = sqlx::query("SELECT * FROM user_consents WHERE user_id = $1 AND client_id = $2")
            .bind(user_id.to_string())
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to query consent: {e}")))?;
        row.as_ref().map(Self::row_to_consent).transpose()
    }

    /// Insert a first consent record unless one already exists
    ///
    /// # Errors
    /// Returns an error if the statement fails
    pub async fn insert_consent(&self, consent: &UserConsent) -> AppResult<ConsentWrite> {
        let result = sqlx::query(
            r"
            INSERT INTO user_consents (user_id, client_id, scopes, granted_at, expires_at, version)
            VALUES ($1, $2, $3, $4, $5, 1)
            ON CONFLICT (user_id, client_id) DO NOTHING
            ",
        )
        .bind(consent.user_id.to_string())
        .bind(&consent.client_id)
        .bind(consent.scopes.join(" "))
        .bind(consent.granted_at.timestamp())
        .bind(consent.expires_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to insert consent: {e}")))?;
        Ok(write_outcome(result.rows_affected()))
    }

    /// Replace scopes and expiry if the stored version still equals `expected_version`
    ///
    /// # Errors
    /// Returns an error if the statement fails
    pub async fn update_consent(
        &self,
        consent: &UserConsent,
        expected_version: i64,
    ) -> AppResult<ConsentWrite> {
        let result = sqlx::query(
            r"
            UPDATE user_consents
            SET scopes = $1, granted_at = $2, expires_at = $3, version = version + 1
            WHERE user_id = $4 AND client_id = $5 AND version = $6
            ",
        )
        .bind(consent.scopes.join(" "))
        .bind(consent.granted_at.timestamp())
        .bind(consent.expires_at.timestamp())
        .bind(consent.user_id.to_string())
        .bind(&consent.client_id)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to update consent: {e}")))?;
        Ok(write_outcome(result.rows_affected()))
    }

    /// Withdraw consent; returns whether a record existed
    ///
    /// # Errors
    /// Returns an error if the statement fails
    pub async fn delete_consent(&self, user_id: Uuid, client_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM user_consents WHERE user_id = $1 AND client_id = $2")
            .bind(user_id.to_string())
            .bind(client_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete consent: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    /// Bulk-delete consents that expired at or before `now`
    ///
    /// # Errors
    /// Returns an error if the statement fails
    pub async fn delete_expired_consents(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM user_consents WHERE expires_at <= $1")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to sweep consents: {e}")))?;
        Ok(result.rows_affected())
    }

    fn row_to_consent(row: &SqliteRow) -> AppResult<UserConsent> {
        let user_id: String = row.get("user_id");
        let scopes: String = row.get("scopes");
        Ok(UserConsent {
            user_id: Uuid::parse_str(&user_id)
                .map_err(|e| AppError::internal(format!("Corrupt user id on consent: {e}")))?,
            client_id: row.get("client_id"),
            scopes: scopes.split_whitespace().map(str::to_owned).collect(),
            granted_at: from_timestamp(row.get("granted_at"))?,
            expires_at: from_timestamp(row.get("expires_at"))?,
            version: row.get("version"),
        })
    }
}

const fn write_outcome(rows_affected: u64) -> ConsentWrite {
    if rows_affected == 1 {
        ConsentWrite::Applied
    } else {
        ConsentWrite::Conflict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn consent(user_id: Uuid, scopes: &[&str]) -> UserConsent {
        let now = Utc::now();
        UserConsent {
            user_id,
            client_id: "client-a".to_owned(),
            scopes: scopes.iter().map(|s| (*s).to_owned()).collect(),
            granted_at: now,
            expires_at: now + Duration::days(365),
            version: 1,
        }
    }

    #[tokio::test]
    async fn test_insert_then_conflicting_insert() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let user_id = Uuid::new_v4();
        assert_eq!(
            db.insert_consent(&consent(user_id, &["openid"])).await.unwrap(),
            ConsentWrite::Applied
        );
        assert_eq!(
            db.insert_consent(&consent(user_id, &["email"])).await.unwrap(),
            ConsentWrite::Conflict
        );
        let stored = db.get_consent(user_id, "client-a").await.unwrap().unwrap();
        assert_eq!(stored.scopes, vec!["openid".to_owned()]);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_update_checks_version() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let user_id = Uuid::new_v4();
        db.insert_consent(&consent(user_id, &["openid"])).await.unwrap();

        let widened = consent(user_id, &["openid", "profile"]);
        assert_eq!(db.update_consent(&widened, 1).await.unwrap(), ConsentWrite::Applied);
        // Stale version loses
        assert_eq!(db.update_consent(&widened, 1).await.unwrap(), ConsentWrite::Conflict);

        let stored = db.get_consent(user_id, "client-a").await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.scopes, vec!["openid".to_owned(), "profile".to_owned()]);
    }

    #[tokio::test]
    async fn test_delete_and_sweep() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let user_id = Uuid::new_v4();
        let mut expired = consent(user_id, &["openid"]);
        expired.expires_at = Utc::now() - Duration::seconds(1);
        db.insert_consent(&expired).await.unwrap();
        assert_eq!(db.delete_expired_consents(Utc::now()).await.unwrap(), 1);

        db.insert_consent(&consent(user_id, &["openid"])).await.unwrap();
        assert!(db.delete_consent(user_id, "client-a").await.unwrap());
        assert!(db.get_consent(user_id, "client-a").await.unwrap().is_none());
    }
}
