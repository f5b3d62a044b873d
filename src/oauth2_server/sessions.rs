// ABOUTME: SSO session management: password login, cookie-backed session lookup and logout
// ABOUTME: One session row per browser login; the row id is the opaque cookie value
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sso_core::constants::cookies::SSO_SESSION_COOKIE;
use sso_core::models::{SsoSession, User};
use tokio::task;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::crypto::generate_random_string;
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::logging::AppLogger;

/// Creates, resolves and ends SSO sessions
#[derive(Clone)]
pub struct SessionManager {
    database: Arc<Database>,
    ttl: Duration,
    cookie_secure: bool,
}

impl SessionManager {
    /// Session manager backed by `database`
    #[must_use]
    pub fn new(database: Arc<Database>, config: &SessionConfig) -> Self {
        Self {
            database,
            ttl: Duration::days(config.ttl_days),
            cookie_secure: config.cookie_secure,
        }
    }

    /// Check an email and password, returning the user on success
    ///
    /// # Errors
    /// Returns `AuthInvalid` for an unknown email or wrong password, or a database error
    pub async fn authenticate_user(&self, email: &str, password: &str) -> AppResult<User> {
        let user = self
            .database
            .get_user_by_email(email)
            .await?
            .ok_or_else(|| {
                AppLogger::log_auth_event(email, "login", false, Some("unknown email"));
                AppError::auth_invalid("Invalid email or password")
            })?;

        if !verify_password(password, &user.password_hash).await {
            AppLogger::log_auth_event(&user.id.to_string(), "login", false, Some("wrong password"));
            return Err(AppError::auth_invalid("Invalid email or password"));
        }
        Ok(user)
    }

    /// Open a new session for `user`
    ///
    /// # Errors
    /// Returns an error if random generation or the insert fails
    pub async fn create_session(
        &self,
        user: &User,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> AppResult<SsoSession> {
        let now = Utc::now();
        let session = SsoSession {
            session_id: generate_random_string(32)?,
            user_id: user.id,
            authenticated: true,
            created_at: now,
            expires_at: now + self.ttl,
            last_activity: now,
            ip_address,
            user_agent,
        };
        self.database.create_session(&session).await?;
        AppLogger::log_auth_event(&user.id.to_string(), "session_created", true, None);
        Ok(session)
    }

    /// Active session for a cookie value, if any. Expired rows are left for the sweeper.
    ///
    /// # Errors
    /// Returns an error if the lookup fails
    pub async fn resolve(&self, session_id: &str, now: DateTime<Utc>) -> AppResult<Option<SsoSession>> {
        let Some(session) = self.database.get_session(session_id).await? else {
            debug!("Session cookie does not match any session");
            return Ok(None);
        };
        if !session.is_active(now) {
            debug!(user_id = %session.user_id, "Session expired or not authenticated");
            return Ok(None);
        }
        self.database.touch_session(session_id, now).await?;
        Ok(Some(session))
    }

    /// End a session; consent records are untouched
    ///
    /// # Errors
    /// Returns an error if the delete fails
    pub async fn logout(&self, session_id: &str) -> AppResult<bool> {
        let existed = self.database.delete_session(session_id).await?;
        if existed {
            AppLogger::log_auth_event(session_id, "logout", true, None);
        } else {
            warn!("Logout for unknown session");
        }
        Ok(existed)
    }

    /// `Set-Cookie` value carrying a session id
    #[must_use]
    pub fn session_cookie(&self, session_id: &str) -> String {
        self.cookie(session_id, self.ttl.num_seconds())
    }

    /// `Set-Cookie` value that removes the session cookie
    #[must_use]
    pub fn clear_cookie(&self) -> String {
        self.cookie("", 0)
    }

    fn cookie(&self, value: &str, max_age: i64) -> String {
        let secure = if self.cookie_secure { "; Secure" } else { "" };
        format!("{SSO_SESSION_COOKIE}={value}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax{secure}")
    }
}

/// Session id from a `Cookie` request header
#[must_use]
pub fn session_id_from_cookie_header(cookie_header: &str) -> Option<&str> {
    cookie_header
        .split(';')
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, value)| *name == SSO_SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value)
}

/// Hash a password with bcrypt at `cost` off the async executor
///
/// # Errors
/// Returns an error if hashing fails or the blocking task is cancelled
pub async fn hash_password(password: &str, cost: u32) -> AppResult<String> {
    let password = password.to_owned();
    task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::internal(format!("Password hashing task failed: {e}")))?
        .map_err(|e| AppError::crypto(format!("Password hashing failed: {e}")))
}

/// Verify a password against its bcrypt hash off the async executor
async fn verify_password(password: &str, hash: &str) -> bool {
    let password = password.to_owned();
    let hash = hash.to_owned();

    task::spawn_blocking(move || bcrypt::verify(&password, &hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sso_core::models::UserProfile;
    use uuid::Uuid;

    async fn setup(cookie_secure: bool) -> (SessionManager, User) {
        let database = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let user = User {
            id: Uuid::new_v4(),
            email: "alice@example.com".to_owned(),
            password_hash: bcrypt::hash("correct horse", 4).unwrap(),
            profile: UserProfile::default(),
            created_at: Utc::now(),
        };
        database.create_user(&user).await.unwrap();
        let config = SessionConfig {
            ttl_days: 7,
            sweep_interval_secs: 60,
            cookie_secure,
        };
        (SessionManager::new(database, &config), user)
    }

    #[tokio::test]
    async fn test_login_and_resolve() {
        let (sessions, user) = setup(false).await;
        let authenticated = sessions
            .authenticate_user("alice@example.com", "correct horse")
            .await
            .unwrap();
        assert_eq!(authenticated.id, user.id);
        assert!(sessions.authenticate_user("alice@example.com", "wrong").await.is_err());
        assert!(sessions.authenticate_user("bob@example.com", "x").await.is_err());

        let session = sessions.create_session(&user, None, None).await.unwrap();
        assert_eq!(session.session_id.len(), 43);
        assert_eq!(session.expires_at - session.created_at, Duration::days(7));

        let resolved = sessions.resolve(&session.session_id, Utc::now()).await.unwrap();
        assert_eq!(resolved.unwrap().user_id, user.id);
        let later = Utc::now() + Duration::days(8);
        assert!(sessions.resolve(&session.session_id, later).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_logout_removes_session() {
        let (sessions, user) = setup(false).await;
        let session = sessions.create_session(&user, None, None).await.unwrap();
        assert!(sessions.logout(&session.session_id).await.unwrap());
        assert!(!sessions.logout(&session.session_id).await.unwrap());
        assert!(sessions.resolve(&session.session_id, Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cookie_attributes() {
        let (sessions, _) = setup(true).await;
        assert_eq!(
            sessions.session_cookie("abc"),
            "oauth_sso_session=abc; Path=/; Max-Age=604800; HttpOnly; SameSite=Lax; Secure"
        );
        let (sessions, _) = setup(false).await;
        assert_eq!(
            sessions.clear_cookie(),
            "oauth_sso_session=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax"
        );
    }

    #[tokio::test]
    async fn test_hash_password_verifies() {
        let hash = hash_password("s3cret", 4).await.unwrap();
        assert!(verify_password("s3cret", &hash).await);
        assert!(!verify_password("other", &hash).await);
    }

    #[test]
    fn test_cookie_header_parsing() {
        assert_eq!(
            session_id_from_cookie_header("theme=dark; oauth_sso_session=xyz; other=1"),
            Some("xyz")
        );
        assert_eq!(session_id_from_cookie_header("oauth_sso_session="), None);
        assert_eq!(session_id_from_cookie_header("theme=dark"), None);
    }
}
