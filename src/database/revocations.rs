// ABOUTME: Revoked token blacklist keyed by jti
// ABOUTME: Rows live until the revoked token would have expired anyway, then get swept
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use sso_core::models::RevokedToken;

use super::Database;
use crate::errors::{AppError, AppResult};

impl Database {
    pub(super) async fn migrate_revocations(&self) -> AppResult<()> {
        self.execute_ddl(
            r"
            CREATE TABLE IF NOT EXISTS revoked_tokens (
                jti TEXT PRIMARY KEY,
                token_use TEXT NOT NULL,
                client_id TEXT NOT NULL,
                revoked_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )
            ",
        )
        .await?;
        self.execute_ddl(
            "CREATE INDEX IF NOT EXISTS idx_revoked_tokens_expires_at ON revoked_tokens(expires_at)",
        )
        .await
    }

    /// Blacklist a token; revoking an already revoked `jti` is a no-op.
    /// Returns whether a new row was written.
    ///
    /// # Errors
    /// Returns an error if the insert fails
    pub async fn revoke_token(&self, revoked: &RevokedToken) -> AppResult<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO revoked_tokens (jti, token_use, client_id, revoked_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (jti) DO NOTHING
            ",
        )
        .bind(&revoked.jti)
        .bind(&revoked.token_use)
        .bind(&revoked.client_id)
        .bind(revoked.revoked_at.timestamp())
        .bind(revoked.expires_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to revoke token: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether any of `jtis` is blacklisted
    ///
    /// # Errors
    /// Returns an error if the query fails
    pub async fn is_any_revoked(&self, jtis: &[&str]) -> AppResult<bool> {
        if jtis.is_empty() {
            return Ok(false);
        }
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT EXISTS(SELECT 1 FROM revoked_tokens WHERE jti IN (");
        let mut separated = query.separated(", ");
        for jti in jtis {
            separated.push_bind(*jti);
        }
        separated.push_unseparated("))");

        let revoked = query
            .build_query_scalar::<bool>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to check revocation: {e}")))?;
        Ok(revoked)
    }

    /// Bulk-delete rows for tokens that have expired at or before `now`
    ///
    /// # Errors
    /// Returns an error if the statement fails
    pub async fn delete_expired_revocations(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= $1")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to sweep revoked tokens: {e}")))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn revoked(jti: &str, expires_in: Duration) -> RevokedToken {
        let now = Utc::now();
        RevokedToken {
            jti: jti.to_owned(),
            token_use: "refresh".to_owned(),
            client_id: "client-a".to_owned(),
            revoked_at: now,
            expires_at: now + expires_in,
        }
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        assert!(db.revoke_token(&revoked("j1", Duration::hours(1))).await.unwrap());
        assert!(!db.revoke_token(&revoked("j1", Duration::hours(1))).await.unwrap());
        assert!(db.is_any_revoked(&["x", "j1"]).await.unwrap());
        assert!(!db.is_any_revoked(&["x", "y"]).await.unwrap());
        assert!(!db.is_any_revoked(&[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_revocations_swept() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.revoke_token(&revoked("old", Duration::seconds(-1))).await.unwrap();
        db.revoke_token(&revoked("new", Duration::hours(1))).await.unwrap();
        assert_eq!(db.delete_expired_revocations(Utc::now()).await.unwrap(), 1);
        assert!(db.is_any_revoked(&["new"]).await.unwrap());
    }
}
