// ABOUTME: Authorization decision state machine over session, stored consent and the prompt parameter
// ABOUTME: Pure function from request facts to LoginRequired, ConsentRequired or AutoApproved
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::models::OAuth2Error;
use crate::scopes::ScopeSet;

/// Parsed `prompt` parameter (`OpenID` Connect Core 1.0, section 3.1.2.1)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Prompt {
    /// No UI may be shown
    pub none: bool,
    /// Force re-authentication
    pub login: bool,
    /// Force the consent screen
    pub consent: bool,
}

impl Prompt {
    /// Parse a space-separated prompt value.
    ///
    /// `select_account` is accepted and ignored since there is one account per session.
    ///
    /// # Errors
    /// Returns `invalid_request` for unknown values or `none` combined with anything else
    pub fn parse(raw: Option<&str>) -> Result<Self, OAuth2Error> {
        let mut prompt = Self::default();
        let mut count = 0;
        for value in raw.unwrap_or_default().split_whitespace() {
            count += 1;
            match value {
                "none" => prompt.none = true,
                "login" => prompt.login = true,
                "consent" => prompt.consent = true,
                "select_account" => {}
                other => {
                    return Err(OAuth2Error::invalid_request(&format!(
                        "Unsupported prompt value: {other}"
                    )))
                }
            }
        }
        if prompt.none && count > 1 {
            return Err(OAuth2Error::invalid_request(
                "prompt=none cannot be combined with other values",
            ));
        }
        Ok(prompt)
    }
}

/// What the authorization endpoint must do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationState {
    /// Show the login form
    LoginRequired,
    /// Show the consent screen for `missing`
    ConsentRequired {
        /// Scopes the user has to approve
        missing: ScopeSet,
    },
    /// Issue a code straight away
    AutoApproved,
}

/// Decide the next step.
///
/// `missing_consent` is the part of `requested` not covered by stored consent.
///
/// # Errors
/// With `prompt=none`, returns `login_required` or `consent_required` instead of
/// a state that would need UI
pub fn evaluate(
    has_session: bool,
    requested: &ScopeSet,
    missing_consent: &ScopeSet,
    prompt: Prompt,
) -> Result<AuthorizationState, OAuth2Error> {
    if !has_session || prompt.login {
        return if prompt.none {
            Err(OAuth2Error::login_required())
        } else {
            Ok(AuthorizationState::LoginRequired)
        };
    }

    if prompt.consent {
        return Ok(AuthorizationState::ConsentRequired {
            missing: requested.clone(),
        });
    }

    if missing_consent.is_empty() {
        Ok(AuthorizationState::AutoApproved)
    } else if prompt.none {
        Err(OAuth2Error::consent_required())
    } else {
        Ok(AuthorizationState::ConsentRequired {
            missing: missing_consent.clone(),
        })
    }
}
