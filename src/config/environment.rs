// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Parses environment variables into a strongly typed ServerConfig
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Environment-based configuration management for production deployment

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sso_core::constants::{lifetimes, ports};
use tracing::info;
use url::Url;

use crate::errors::{AppError, AppResult};
use crate::tokens::TokenFormat;

/// Environment type for security and other configurations
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development
    #[default]
    Development,
    /// Production deployment
    Production,
    /// Automated tests
    Testing,
}

impl Environment {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Check if this is a production environment
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// Signing / encryption key source
#[derive(Debug, Clone)]
pub struct KeyStoreConfig {
    /// PKCS#8 PEM file holding the RSA private key; generated in memory when unset
    pub private_key_path: Option<PathBuf>,
    /// `kid` published in the JWKS and stamped on token headers
    pub key_id: String,
    /// Modulus size used when a key has to be generated
    pub generated_key_bits: usize,
}

/// Token issuance settings
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Whether tokens are issued signed (JWT) or encrypted (JWE)
    pub format: TokenFormat,
    /// Access token lifetime
    pub access_ttl_secs: i64,
    /// Refresh token lifetime
    pub refresh_ttl_secs: i64,
    /// ID token lifetime
    pub id_ttl_secs: i64,
}

/// SSO session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session lifetime in days
    pub ttl_days: i64,
    /// Interval between expired-record sweeps
    pub sweep_interval_secs: u64,
    /// Emit the `Secure` cookie attribute
    pub cookie_secure: bool,
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Deployment environment
    pub environment: Environment,
    /// `iss` claim and base URL of every published endpoint
    pub issuer_url: String,
    /// sqlx connection URL
    pub database_url: String,
    /// Key store settings
    pub key_store: KeyStoreConfig,
    /// Token settings
    pub tokens: TokenConfig,
    /// Session settings
    pub sessions: SessionConfig,
    /// Stored consent lifetime in days
    pub consent_ttl_days: i64,
    /// Authorization code lifetime
    pub auth_code_ttl_secs: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: ports::DEFAULT_HTTP_PORT,
            environment: Environment::Development,
            issuer_url: format!("http://localhost:{}", ports::DEFAULT_HTTP_PORT),
            database_url: "sqlite::memory:".to_owned(),
            key_store: KeyStoreConfig {
                private_key_path: None,
                key_id: "sso-signing-key-1".to_owned(),
                generated_key_bits: 2048,
            },
            tokens: TokenConfig {
                format: TokenFormat::Jwt,
                access_ttl_secs: lifetimes::ACCESS_TOKEN_SECS,
                refresh_ttl_secs: lifetimes::REFRESH_TOKEN_SECS,
                id_ttl_secs: lifetimes::ID_TOKEN_SECS,
            },
            sessions: SessionConfig {
                ttl_days: lifetimes::SSO_SESSION_DAYS,
                sweep_interval_secs: lifetimes::SWEEP_INTERVAL_SECS,
                cookie_secure: false,
            },
            consent_ttl_days: lifetimes::CONSENT_DAYS,
            auth_code_ttl_secs: lifetimes::AUTHORIZATION_CODE_SECS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a variable is set to an unparsable value
    /// or the resulting configuration is inconsistent
    pub fn from_env() -> AppResult<Self> {
        info!("Loading configuration from environment variables");

        let environment =
            Environment::from_str_or_default(&env_var_or("ENVIRONMENT", "development"));
        let http_port = env_parse("HTTP_PORT", ports::DEFAULT_HTTP_PORT)?;
        let issuer_url = env_var_or("ISSUER_URL", &format!("http://localhost:{http_port}"));

        let config = Self {
            http_port,
            environment,
            issuer_url: issuer_url.trim_end_matches('/').to_owned(),
            database_url: env_var_or("DATABASE_URL", "sqlite:./data/oauth_sso.db"),
            key_store: KeyStoreConfig {
                private_key_path: env::var("SIGNING_KEY_PATH").ok().map(PathBuf::from),
                key_id: env_var_or("SIGNING_KEY_ID", "sso-signing-key-1"),
                generated_key_bits: env_parse("SIGNING_KEY_BITS", 2048)?,
            },
            tokens: TokenConfig {
                format: env_parse("TOKEN_FORMAT", TokenFormat::Jwt)?,
                access_ttl_secs: env_parse("ACCESS_TOKEN_TTL_SECS", lifetimes::ACCESS_TOKEN_SECS)?,
                refresh_ttl_secs: env_parse(
                    "REFRESH_TOKEN_TTL_SECS",
                    lifetimes::REFRESH_TOKEN_SECS,
                )?,
                id_ttl_secs: env_parse("ID_TOKEN_TTL_SECS", lifetimes::ID_TOKEN_SECS)?,
            },
            sessions: SessionConfig {
                ttl_days: env_parse("SSO_SESSION_TTL_DAYS", lifetimes::SSO_SESSION_DAYS)?,
                sweep_interval_secs: env_parse(
                    "SWEEP_INTERVAL_SECS",
                    lifetimes::SWEEP_INTERVAL_SECS,
                )?,
                cookie_secure: env_parse("SESSION_COOKIE_SECURE", environment.is_production())?,
            },
            consent_ttl_days: env_parse("CONSENT_TTL_DAYS", lifetimes::CONSENT_DAYS)?,
            auth_code_ttl_secs: env_parse(
                "AUTH_CODE_TTL_SECS",
                lifetimes::AUTHORIZATION_CODE_SECS,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first invalid setting
    pub fn validate(&self) -> AppResult<()> {
        Url::parse(&self.issuer_url)
            .map_err(|e| AppError::config(format!("ISSUER_URL is not a valid URL: {e}")))?;

        if self.key_store.generated_key_bits < 2048 {
            return Err(AppError::config(
                "SIGNING_KEY_BITS must be at least 2048",
            ));
        }

        let lifetimes = [
            ("ACCESS_TOKEN_TTL_SECS", self.tokens.access_ttl_secs),
            ("REFRESH_TOKEN_TTL_SECS", self.tokens.refresh_ttl_secs),
            ("ID_TOKEN_TTL_SECS", self.tokens.id_ttl_secs),
            ("SSO_SESSION_TTL_DAYS", self.sessions.ttl_days),
            ("CONSENT_TTL_DAYS", self.consent_ttl_days),
            ("AUTH_CODE_TTL_SECS", self.auth_code_ttl_secs),
        ];
        if let Some((name, _)) = lifetimes.iter().find(|(_, value)| *value <= 0) {
            return Err(AppError::config(format!("{name} must be positive")));
        }

        if self.sessions.sweep_interval_secs == 0 {
            return Err(AppError::config("SWEEP_INTERVAL_SECS must be positive"));
        }

        if self.environment.is_production() && !self.issuer_url.starts_with("https://") {
            return Err(AppError::config(
                "ISSUER_URL must use https in production",
            ));
        }

        Ok(())
    }

    /// Human-readable configuration summary for startup logs
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "OAuth SSO Server Configuration:\n\
             - HTTP Port: {}\n\
             - Environment: {}\n\
             - Issuer: {}\n\
             - Database: {}\n\
             - Signing Key: {} ({})\n\
             - Token Format: {}\n\
             - Access/Refresh/ID TTL: {}s / {}s / {}s\n\
             - Session TTL: {} days (secure cookie: {})\n\
             - Consent TTL: {} days",
            self.http_port,
            self.environment,
            self.issuer_url,
            redact_database_url(&self.database_url),
            self.key_store.key_id,
            self.key_store
                .private_key_path
                .as_ref()
                .map_or_else(|| "ephemeral".to_owned(), |p| p.display().to_string()),
            self.tokens.format,
            self.tokens.access_ttl_secs,
            self.tokens.refresh_ttl_secs,
            self.tokens.id_ttl_secs,
            self.sessions.ttl_days,
            self.sessions.cookie_secure,
            self.consent_ttl_days,
        )
    }
}

/// Get environment variable or default value
fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Parse an environment variable, falling back to `default` when unset
fn env_parse<T>(key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::config(format!("{key} has invalid value '{raw}': {e}"))),
        Err(_) => Ok(default),
    }
}

/// Strip credentials from connection URLs before logging
fn redact_database_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .filter(|parsed| parsed.password().is_some())
        .map_or_else(
            || url.to_owned(),
            |mut parsed| {
                let _ = parsed.set_password(Some("****"));
                parsed.to_string()
            },
        )
}
