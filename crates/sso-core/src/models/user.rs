// ABOUTME: Resource owner account and OpenID Connect standard profile
// ABOUTME: Profile values are looked up by typed Claim when building ID tokens and userinfo
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::claims::Claim;

/// Resource owner able to sign in at the authorization server
#[derive(Debug, Clone)]
pub struct User {
    /// Stable subject identifier
    pub id: Uuid,
    /// Login identifier (unique, stored lowercase)
    pub email: String,
    /// bcrypt password hash
    pub password_hash: String,
    /// Standard claims released according to granted scopes
    pub profile: UserProfile,
    /// When the account was created
    pub created_at: DateTime<Utc>,
}

/// Postal address claim (`OpenID` Connect Core 1.0, section 5.1.1)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Full mailing address, formatted for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
    /// Street address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,
    /// City or locality
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    /// State, province or region
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Zip or postal code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    /// Country name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Standard profile claims held for a user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    /// Full name
    pub name: Option<String>,
    /// Surname
    pub family_name: Option<String>,
    /// Given name
    pub given_name: Option<String>,
    /// Middle name
    pub middle_name: Option<String>,
    /// Casual name
    pub nickname: Option<String>,
    /// Preferred username
    pub preferred_username: Option<String>,
    /// Profile page URL
    pub profile: Option<String>,
    /// Picture URL
    pub picture: Option<String>,
    /// Website URL
    pub website: Option<String>,
    /// Gender
    pub gender: Option<String>,
    /// Birthday
    pub birthdate: Option<String>,
    /// IANA time zone
    pub zoneinfo: Option<String>,
    /// BCP47 locale
    pub locale: Option<String>,
    /// Last update, seconds since epoch
    pub updated_at: Option<i64>,
    /// Email address
    pub email: Option<String>,
    /// Email verified flag
    pub email_verified: Option<bool>,
    /// Phone number
    pub phone_number: Option<String>,
    /// Phone verified flag
    pub phone_number_verified: Option<bool>,
    /// Postal address
    pub address: Option<Address>,
}

impl UserProfile {
    /// JSON value held for `claim`, or `None` when the user has no value.
    ///
    /// `sub` is not part of the profile and always yields `None`.
    #[must_use]
    pub fn claim_value(&self, claim: Claim) -> Option<Value> {
        let text = |value: &Option<String>| value.clone().map(Value::String);
        match claim {
            Claim::Sub => None,
            Claim::Name => text(&self.name),
            Claim::FamilyName => text(&self.family_name),
            Claim::GivenName => text(&self.given_name),
            Claim::MiddleName => text(&self.middle_name),
            Claim::Nickname => text(&self.nickname),
            Claim::PreferredUsername => text(&self.preferred_username),
            Claim::Profile => text(&self.profile),
            Claim::Picture => text(&self.picture),
            Claim::Website => text(&self.website),
            Claim::Gender => text(&self.gender),
            Claim::Birthdate => text(&self.birthdate),
            Claim::Zoneinfo => text(&self.zoneinfo),
            Claim::Locale => text(&self.locale),
            Claim::UpdatedAt => self.updated_at.map(Value::from),
            Claim::Email => text(&self.email),
            Claim::EmailVerified => self.email_verified.map(Value::Bool),
            Claim::PhoneNumber => text(&self.phone_number),
            Claim::PhoneNumberVerified => self.phone_number_verified.map(Value::Bool),
            Claim::Address => self
                .address
                .as_ref()
                .and_then(|address| serde_json::to_value(address).ok()),
        }
    }
}
