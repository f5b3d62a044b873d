// ABOUTME: Authorization code database operations
// ABOUTME: Codes are consumed with a single DELETE ... RETURNING so only one exchange can win
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use sso_core::models::AuthorizationCode;
use uuid::Uuid;

use super::{from_timestamp, Database};
use crate::errors::{AppError, AppResult};

impl Database {
    pub(super) async fn migrate_auth_codes(&self) -> AppResult<()> {
        self.execute_ddl(
            r"
            CREATE TABLE IF NOT EXISTS authorization_codes (
                code TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                redirect_uri TEXT NOT NULL,
                scope TEXT NOT NULL,
                nonce TEXT,
                code_challenge TEXT,
                code_challenge_method TEXT,
                auth_time INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )
            ",
        )
        .await?;
        self.execute_ddl(
            "CREATE INDEX IF NOT EXISTS idx_authorization_codes_expires_at ON authorization_codes(expires_at)",
        )
        .await
    }

    /// Store a freshly minted code
    ///
    /// # Errors
    /// Returns an error if the insert fails
    pub async fn store_auth_code(&self, code: &AuthorizationCode) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO authorization_codes
                (code, client_id, user_id, redirect_uri, scope, nonce, code_challenge,
                 code_challenge_method, auth_time, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(&code.code)
        .bind(&code.client_id)
        .bind(code.user_id.to_string())
        .bind(&code.redirect_uri)
        .bind(&code.scope)
        .bind(&code.nonce)
        .bind(&code.code_challenge)
        .bind(&code.code_challenge_method)
        .bind(code.auth_time.timestamp())
        .bind(code.created_at.timestamp())
        .bind(code.expires_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to store authorization code: {e}")))?;
        Ok(())
    }

    /// Atomically remove and return a code.
    ///
    /// The row is deleted whatever the caller does next, so a failed
    /// client or PKCE check still burns the code. Expiry is left to the caller.
    ///
    /// # Errors
    /// Returns an error if the statement fails or the row is corrupt
    pub async fn consume_auth_code(&self, code: &str) -> AppResult<Option<AuthorizationCode>> {
        let row = sqlx::query("DELETE FROM authorization_codes WHERE code = $1 RETURNING *")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to consume authorization code: {e}")))?;
        row.as_ref().map(Self::row_to_auth_code).transpose()
    }

    /// Bulk-delete codes that expired at or before `now`
    ///
    /// # Errors
    /// Returns an error if the statement fails
    pub async fn delete_expired_auth_codes(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM authorization_codes WHERE expires_at <= $1")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to sweep authorization codes: {e}")))?;
        Ok(result.rows_affected())
    }

    fn row_to_auth_code(row: &SqliteRow) -> AppResult<AuthorizationCode> {
        let user_id: String = row.get("user_id");
        Ok(AuthorizationCode {
            code: row.get("code"),
            client_id: row.get("client_id"),
            user_id: Uuid::parse_str(&user_id)
                .map_err(|e| AppError::internal(format!("Corrupt user id on code: {e}")))?,
            redirect_uri: row.get("redirect_uri"),
            scope: row.get("scope"),
            nonce: row.get("nonce"),
            code_challenge: row.get("code_challenge"),
            code_challenge_method: row.get("code_challenge_method"),
            auth_time: from_timestamp(row.get("auth_time"))?,
            created_at: from_timestamp(row.get("created_at"))?,
            expires_at: from_timestamp(row.get("expires_at"))?,
        })
    }
}
