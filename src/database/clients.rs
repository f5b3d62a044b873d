// ABOUTME: OAuth client registration database operations
// ABOUTME: Redirect URIs and grant types are JSON arrays, allowed scopes a space-separated string
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use sso_core::models::OAuthClient;

use super::{from_json_list, from_timestamp, to_json_list, Database};
use crate::errors::{AppError, AppResult};

impl Database {
    pub(super) async fn migrate_clients(&self) -> AppResult<()> {
        self.execute_ddl(
            r"
            CREATE TABLE IF NOT EXISTS oauth_clients (
                client_id TEXT PRIMARY KEY,
                client_secret_hash TEXT NOT NULL,
                client_name TEXT NOT NULL,
                redirect_uris TEXT NOT NULL,
                allowed_scopes TEXT NOT NULL DEFAULT '',
                grant_types TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            ",
        )
        .await
    }

    /// Store a newly registered client
    ///
    /// # Errors
    /// Returns `ResourceAlreadyExists` for a duplicate `client_id`, or a database error
    pub async fn create_client(&self, client: &OAuthClient) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO oauth_clients
                (client_id, client_secret_hash, client_name, redirect_uris, allowed_scopes, grant_types, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(&client.client_id)
        .bind(&client.client_secret_hash)
        .bind(&client.client_name)
        .bind(to_json_list(&client.redirect_uris)?)
        .bind(client.allowed_scopes.join(" "))
        .bind(to_json_list(&client.grant_types)?)
        .bind(client.created_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    /// Look up a client
    ///
    /// # Errors
    /// Returns an error if the query fails or the row is corrupt
    pub async fn get_client(&self, client_id: &str) -> AppResult<Option<OAuthClient>> {
        let row = sqlx::query("SELECT * FROM oauth_clients WHERE client_id = $1")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to query OAuth client: {e}")))?;
        row.as_ref().map(Self::row_to_client).transpose()
    }

    /// Delete a client; returns whether it existed
    ///
    /// # Errors
    /// Returns an error if the statement fails
    pub async fn delete_client(&self, client_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM oauth_clients WHERE client_id = $1")
            .bind(client_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete OAuth client: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    fn row_to_client(row: &SqliteRow) -> AppResult<OAuthClient> {
        let redirect_uris: String = row.get("redirect_uris");
        let grant_types: String = row.get("grant_types");
        let allowed_scopes: String = row.get("allowed_scopes");
        Ok(OAuthClient {
            client_id: row.get("client_id"),
            client_secret_hash: row.get("client_secret_hash"),
            client_name: row.get("client_name"),
            redirect_uris: from_json_list(&redirect_uris, "redirect_uris")?,
            allowed_scopes: allowed_scopes.split_whitespace().map(str::to_owned).collect(),
            grant_types: from_json_list(&grant_types, "grant_types")?,
            created_at: from_timestamp(row.get("created_at"))?,
        })
    }
}
