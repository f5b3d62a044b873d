// ABOUTME: User account database operations
// ABOUTME: Stores login credentials and the OpenID Connect profile as a JSON document
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use sso_core::models::{User, UserProfile};
use uuid::Uuid;

use super::{from_timestamp, Database};
use crate::errors::{AppError, AppResult};

impl Database {
    pub(super) async fn migrate_users(&self) -> AppResult<()> {
        self.execute_ddl(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                profile TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL
            )
            ",
        )
        .await
    }

    /// Insert a new user; the email is stored lowercase
    ///
    /// # Errors
    /// Returns `ResourceAlreadyExists` if the email is taken, or a database error
    pub async fn create_user(&self, user: &User) -> AppResult<()> {
        let profile = serde_json::to_string(&user.profile)?;
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, profile, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user.id.to_string())
        .bind(user.email.to_lowercase())
        .bind(&user.password_hash)
        .bind(profile)
        .bind(user.created_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    /// Look up a user by id
    ///
    /// # Errors
    /// Returns an error if the query fails or the row is corrupt
    pub async fn get_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to query user: {e}")))?;
        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// Look up a user by email, case-insensitively
    ///
    /// # Errors
    /// Returns an error if the query fails or the row is corrupt
    pub async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = $1")
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to query user by email: {e}")))?;
        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// Replace a user's profile claims
    ///
    /// # Errors
    /// Returns `ResourceNotFound` if the user does not exist, or a database error
    pub async fn update_user_profile(&self, user_id: Uuid, profile: &UserProfile) -> AppResult<()> {
        let result = sqlx::query("UPDATE users SET profile = $1 WHERE id = $2")
            .bind(serde_json::to_string(profile)?)
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to update user profile: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("User {user_id}")));
        }
        Ok(())
    }

    /// Number of registered users
    ///
    /// # Errors
    /// Returns an error if the query fails
    pub async fn get_user_count(&self) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to count users: {e}")))
    }

    fn row_to_user(row: &SqliteRow) -> AppResult<User> {
        let id: String = row.get("id");
        let profile: String = row.get("profile");
        Ok(User {
            id: Uuid::parse_str(&id)
                .map_err(|e| AppError::internal(format!("Corrupt user id '{id}': {e}")))?,
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            profile: serde_json::from_str(&profile)
                .map_err(|e| AppError::internal(format!("Corrupt profile for user {id}: {e}")))?,
            created_at: from_timestamp(row.get("created_at"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sso_core::errors::ErrorCode;

    fn user(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.to_owned(),
            password_hash: "$2b$04$hash".to_owned(),
            profile: UserProfile {
                name: Some("Grace Hopper".to_owned()),
                ..UserProfile::default()
            },
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch_user() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let created = user("Grace@Example.com");
        db.create_user(&created).await.unwrap();

        let by_email = db.get_user_by_email("grace@example.COM").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);
        assert_eq!(by_email.email, "grace@example.com");
        assert_eq!(by_email.profile.name.as_deref(), Some("Grace Hopper"));

        let by_id = db.get_user(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, by_email.email);
        assert_eq!(db.get_user_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.create_user(&user("dup@example.com")).await.unwrap();
        let err = db.create_user(&user("dup@example.com")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ResourceAlreadyExists);
    }

    #[tokio::test]
    async fn test_update_profile() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let created = user("p@example.com");
        db.create_user(&created).await.unwrap();
        let profile = UserProfile {
            email: Some("p@example.com".to_owned()),
            email_verified: Some(true),
            ..UserProfile::default()
        };
        db.update_user_profile(created.id, &profile).await.unwrap();
        assert_eq!(db.get_user(created.id).await.unwrap().unwrap().profile, profile);
        assert!(db.update_user_profile(Uuid::new_v4(), &profile).await.is_err());
    }
}
