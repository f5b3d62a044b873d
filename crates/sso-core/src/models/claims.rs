// ABOUTME: Typed OpenID Connect standard claim identifiers
// ABOUTME: Replaces free-form claim strings so scope tables are checked at compile time
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Standard claims (`OpenID` Connect Core 1.0, section 5.1) the server can release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Claim {
    /// Subject identifier, released for every scope set
    Sub,
    /// Full name
    Name,
    /// Surname
    FamilyName,
    /// Given name
    GivenName,
    /// Middle name
    MiddleName,
    /// Casual name
    Nickname,
    /// Shorthand name the user wishes to be referred to
    PreferredUsername,
    /// Profile page URL
    Profile,
    /// Profile picture URL
    Picture,
    /// Web page or blog URL
    Website,
    /// Gender
    Gender,
    /// Birthday (`YYYY-MM-DD`)
    Birthdate,
    /// Time zone (IANA database name)
    Zoneinfo,
    /// Locale (BCP47)
    Locale,
    /// Last profile update, seconds since epoch
    UpdatedAt,
    /// Email address
    Email,
    /// Whether the email address was verified
    EmailVerified,
    /// Phone number
    PhoneNumber,
    /// Whether the phone number was verified
    PhoneNumberVerified,
    /// Postal address (JSON object)
    Address,
}

impl Claim {
    /// Every claim, in declaration order
    pub const ALL: [Self; 20] = [
        Self::Sub,
        Self::Name,
        Self::FamilyName,
        Self::GivenName,
        Self::MiddleName,
        Self::Nickname,
        Self::PreferredUsername,
        Self::Profile,
        Self::Picture,
        Self::Website,
        Self::Gender,
        Self::Birthdate,
        Self::Zoneinfo,
        Self::Locale,
        Self::UpdatedAt,
        Self::Email,
        Self::EmailVerified,
        Self::PhoneNumber,
        Self::PhoneNumberVerified,
        Self::Address,
    ];

    /// Claims released by the `profile` scope
    pub const PROFILE_SCOPE: [Self; 14] = [
        Self::Name,
        Self::FamilyName,
        Self::GivenName,
        Self::MiddleName,
        Self::Nickname,
        Self::PreferredUsername,
        Self::Profile,
        Self::Picture,
        Self::Website,
        Self::Gender,
        Self::Birthdate,
        Self::Zoneinfo,
        Self::Locale,
        Self::UpdatedAt,
    ];

    /// Claims released by the `email` scope
    pub const EMAIL_SCOPE: [Self; 2] = [Self::Email, Self::EmailVerified];

    /// Claims released by the `phone` scope
    pub const PHONE_SCOPE: [Self; 2] = [Self::PhoneNumber, Self::PhoneNumberVerified];

    /// Claims released by the `address` scope
    pub const ADDRESS_SCOPE: [Self; 1] = [Self::Address];

    /// Wire name of the claim
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sub => "sub",
            Self::Name => "name",
            Self::FamilyName => "family_name",
            Self::GivenName => "given_name",
            Self::MiddleName => "middle_name",
            Self::Nickname => "nickname",
            Self::PreferredUsername => "preferred_username",
            Self::Profile => "profile",
            Self::Picture => "picture",
            Self::Website => "website",
            Self::Gender => "gender",
            Self::Birthdate => "birthdate",
            Self::Zoneinfo => "zoneinfo",
            Self::Locale => "locale",
            Self::UpdatedAt => "updated_at",
            Self::Email => "email",
            Self::EmailVerified => "email_verified",
            Self::PhoneNumber => "phone_number",
            Self::PhoneNumberVerified => "phone_number_verified",
            Self::Address => "address",
        }
    }
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known claim name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown claim: {0}")]
pub struct UnknownClaim(pub String);

impl FromStr for Claim {
    type Err = UnknownClaim;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|claim| claim.as_str() == s)
            .ok_or_else(|| UnknownClaim(s.to_owned()))
    }
}
