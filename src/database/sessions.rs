// ABOUTME: SSO session database operations
// ABOUTME: Sessions are keyed by the cookie value and swept in bulk once expired
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use sso_core::models::SsoSession;
use uuid::Uuid;

use super::{from_timestamp, Database};
use crate::errors::{AppError, AppResult};

impl Database {
    pub(super) async fn migrate_sessions(&self) -> AppResult<()> {
        self.execute_ddl(
            r"
            CREATE TABLE IF NOT EXISTS sso_sessions (
                session_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                authenticated INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                last_activity INTEGER NOT NULL,
                ip_address TEXT,
                user_agent TEXT
            )
            ",
        )
        .await?;
        self.execute_ddl(
            "CREATE INDEX IF NOT EXISTS idx_sso_sessions_expires_at ON sso_sessions(expires_at)",
        )
        .await?;
        self.execute_ddl("CREATE INDEX IF NOT EXISTS idx_sso_sessions_user_id ON sso_sessions(user_id)")
            .await
    }

    /// Insert a session
    ///
    /// # Errors
    /// Returns an error if the insert fails
    pub async fn create_session(&self, session: &SsoSession) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO sso_sessions
                (session_id, user_id, authenticated, created_at, expires_at, last_activity, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(&session.session_id)
        .bind(session.user_id.to_string())
        .bind(session.authenticated)
        .bind(session.created_at.timestamp())
        .bind(session.expires_at.timestamp())
        .bind(session.last_activity.timestamp())
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create SSO session: {e}")))?;
        Ok(())
    }

    /// Look up a session by cookie value, expired or not
    ///
    /// # Errors
    /// Returns an error if the query fails or the row is corrupt
    pub async fn get_session(&self, session_id: &str) -> AppResult<Option<SsoSession>> {
        let row = sqlx::query("SELECT * FROM sso_sessions WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to query SSO session: {e}")))?;
        row.as_ref().map(Self::row_to_session).transpose()
    }

    /// Record activity on a session
    ///
    /// # Errors
    /// Returns an error if the update fails
    pub async fn touch_session(&self, session_id: &str, now: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("UPDATE sso_sessions SET last_activity = $1 WHERE session_id = $2")
            .bind(now.timestamp())
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to update SSO session: {e}")))?;
        Ok(())
    }

    /// Delete a session; returns whether it existed
    ///
    /// # Errors
    /// Returns an error if the statement fails
    pub async fn delete_session(&self, session_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM sso_sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete SSO session: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    /// Bulk-delete sessions that expired at or before `now`
    ///
    /// # Errors
    /// Returns an error if the statement fails
    pub async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM sso_sessions WHERE expires_at <= $1")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to sweep SSO sessions: {e}")))?;
        Ok(result.rows_affected())
    }

    fn row_to_session(row: &SqliteRow) -> AppResult<SsoSession> {
        let user_id: String = row.get("user_id");
        Ok(SsoSession {
            session_id: row.get("session_id"),
            user_id: Uuid::parse_str(&user_id)
                .map_err(|e| AppError::internal(format!("Corrupt user id on session: {e}")))?,
            authenticated: row.get("authenticated"),
            created_at: from_timestamp(row.get("created_at"))?,
            expires_at: from_timestamp(row.get("expires_at"))?,
            last_activity: from_timestamp(row.get("last_activity"))?,
            ip_address: row.get("ip_address"),
            user_agent: row.get("user_agent"),
        })
    }
}
