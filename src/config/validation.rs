//! Configuration validation logic.

use crate::config::loader::Config;
use crate::error::{Error, Result};
use regex::Regex;

/// Minimum length for the bearer token.
const MIN_TOKEN_LENGTH: usize = 20;

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_cookie(&config.account.cookie)?;
    validate_auth_token(&config.account.auth_token)?;
    validate_targets(config)?;

    if !(0.0..1.0).contains(&config.limits.reserve_fraction) {
        return Err(Error::ConfigValidation {
            field: "reserve_fraction".to_string(),
            message: format!(
                "Reserve fraction must be in [0, 1), got {}",
                config.limits.reserve_fraction
            ),
        });
    }

    Ok(())
}

/// Validate the session cookie.
pub fn validate_cookie(cookie: &str) -> Result<()> {
    if cookie.is_empty() {
        return Err(Error::MissingConfig("cookie".to_string()));
    }

    if !cookie.contains("ct0=") {
        return Err(Error::ConfigValidation {
            field: "cookie".to_string(),
            message: "Cookie must contain the ct0 CSRF token. Copy the full Cookie header from a logged-in browser session.".to_string(),
        });
    }

    Ok(())
}

/// Validate the bearer token.
pub fn validate_auth_token(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(Error::MissingConfig("auth_token".to_string()));
    }

    if token.len() < MIN_TOKEN_LENGTH {
        return Err(Error::ConfigValidation {
            field: "auth_token".to_string(),
            message: format!(
                "Token must be at least {} characters (got {})",
                MIN_TOKEN_LENGTH,
                token.len()
            ),
        });
    }

    // Check for placeholder values
    let token_lower = token.to_lowercase();
    if token_lower.contains("replaceme") || token_lower.contains("your_token") {
        return Err(Error::ConfigValidation {
            field: "auth_token".to_string(),
            message: "Token appears to be a placeholder. Please provide your actual bearer token."
                .to_string(),
        });
    }

    Ok(())
}

/// Validate that at least one target exists and handles are well-formed.
pub fn validate_targets(config: &Config) -> Result<()> {
    if config.targets.is_empty() {
        return Err(Error::MissingConfig(
            "targets (at least one screen name, list id, or following_of entry required)"
                .to_string(),
        ));
    }

    let all_names = config
        .targets
        .screen_names
        .iter()
        .chain(config.targets.following_of.iter());
    validate_screen_names(all_names)
}

/// Validate account handles.
pub fn validate_screen_names<S: AsRef<str>, I: IntoIterator<Item = S>>(names: I) -> Result<()> {
    // Handle pattern: 1-15 chars, alphanumeric and underscores
    let handle_pattern = Regex::new(r"^[a-zA-Z0-9_]{1,15}$").unwrap();

    for name in names {
        let name = name.as_ref();

        // Remove leading @ if present
        let clean = name.trim_start_matches('@');

        if !handle_pattern.is_match(clean) {
            return Err(Error::ConfigValidation {
                field: "screen_names".to_string(),
                message: format!(
                    "Handle '{}' is invalid. Handles are 1-15 characters of letters, digits, and underscores.",
                    name
                ),
            });
        }

        // Check for placeholder values
        let lower = clean.to_lowercase();
        if lower == "replaceme" || lower == "username" {
            return Err(Error::ConfigValidation {
                field: "screen_names".to_string(),
                message: format!(
                    "Handle '{}' appears to be a placeholder. Please provide actual handles.",
                    name
                ),
            });
        }
    }

    Ok(())
}
