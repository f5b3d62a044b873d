// ABOUTME: SQLite persistence for users, clients, authorization codes, SSO sessions, consents and revocations
// ABOUTME: Repository methods are split per record type across submodules of a single Database handle
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Database Management
//!
//! One [`Database`] wraps a `sqlx` SQLite pool. Each submodule adds the
//! `migrate_*` step and the create/find/update/delete methods for one table.
//! Timestamps are stored as integer Unix seconds so expiry sweeps are plain
//! integer comparisons on indexed columns.

mod auth_codes;
mod clients;
mod consents;
mod revocations;
mod sessions;
mod users;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::errors::{AppError, AppResult};

pub use consents::ConsentWrite;

/// Database handle shared by every component
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to `database_url` and run migrations.
    ///
    /// In-memory URLs get a single pinned connection, otherwise every pooled
    /// connection would see its own empty database.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid, the connection fails or a migration fails
    pub async fn new(database_url: &str) -> AppResult<Self> {
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::config(format!("Invalid DATABASE_URL: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(8)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| AppError::database(format!("Failed to connect to database: {e}")))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Underlying pool
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Round-trip a trivial query
    ///
    /// # Errors
    /// Returns an error if the pool cannot serve the query
    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Database ping failed: {e}")))?;
        Ok(())
    }

    /// Create every table and index if missing
    ///
    /// # Errors
    /// Returns an error if any DDL statement fails
    pub async fn migrate(&self) -> AppResult<()> {
        self.migrate_users().await?;
        self.migrate_clients().await?;
        self.migrate_auth_codes().await?;
        self.migrate_sessions().await?;
        self.migrate_consents().await?;
        self.migrate_revocations().await?;
        Ok(())
    }

    async fn execute_ddl(&self, statement: &str) -> AppResult<()> {
        sqlx::query(statement)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Migration failed: {e}")))?;
        Ok(())
    }
}

/// Convert stored Unix seconds back into a timestamp
fn from_timestamp(secs: i64) -> AppResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| AppError::internal(format!("Invalid timestamp in database: {secs}")))
}

/// Decode a JSON array column
fn from_json_list(raw: &str, column: &str) -> AppResult<Vec<String>> {
    serde_json::from_str(raw)
        .map_err(|e| AppError::internal(format!("Corrupt {column} column: {e}")))
}

/// Encode a JSON array column
fn to_json_list(values: &[String]) -> AppResult<String> {
    serde_json::to_string(values).map_err(AppError::from)
}
