//! Keystroke validation for the menu flows.
//!
//! Every function here turns one raw token into a typed value or an
//! [`InputError`] whose `Display` text is shown verbatim to the caller as the
//! inline error line, so messages stay short enough for a handset screen.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Input validation errors with caller-facing messages
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Invalid option.")]
    InvalidChoice,

    #[error("Invalid phone number.")]
    InvalidPhone,

    #[error("Name must be at least {min} characters.")]
    NameTooShort { min: usize },

    #[error("Name is too long (max {max}).")]
    NameTooLong { max: usize },

    #[error("Name may only contain letters and spaces.")]
    InvalidNameCharacters,

    #[error("PIN must be exactly 4 digits.")]
    InvalidPin,

    #[error("Enter a valid amount.")]
    InvalidAmount,

    #[error("Minimum stake is {min}.")]
    BelowMinimum { min: Decimal },

    #[error("Maximum stake is {max}.")]
    AboveMaximum { max: Decimal },
}

/// Name validation rules
#[derive(Debug, Clone)]
pub struct NameRules {
    pub min_length: usize,
    pub max_length: usize,
    pub allow_unicode: bool,
}

impl Default for NameRules {
    fn default() -> Self {
        NameRules {
            min_length: 2,
            max_length: 40,
            allow_unicode: true,
        }
    }
}

pub const PIN_LENGTH: usize = 4;
const PHONE_MIN_DIGITS: usize = 9;
const PHONE_MAX_DIGITS: usize = 15;

/// Validate and normalize a phone number.
///
/// Accepts an optional leading `+` followed by 9 to 15 digits. The returned
/// value has the `+` stripped so lookups are keyed consistently.
pub fn validate_phone(raw: &str) -> Result<String, InputError> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if digits.len() < PHONE_MIN_DIGITS || digits.len() > PHONE_MAX_DIGITS {
        return Err(InputError::InvalidPhone);
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(InputError::InvalidPhone);
    }
    Ok(digits.to_string())
}

/// Validate a display name according to the given rules
pub fn validate_name(raw: &str, rules: &NameRules) -> Result<String, InputError> {
    // Collapse runs of whitespace; handsets sometimes double-space.
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let len = collapsed.chars().count();
    if len < rules.min_length {
        return Err(InputError::NameTooShort {
            min: rules.min_length,
        });
    }
    if len > rules.max_length {
        return Err(InputError::NameTooLong {
            max: rules.max_length,
        });
    }
    let ok = collapsed.chars().all(|c| {
        c == ' '
            || c == '-'
            || c == '\''
            || c.is_ascii_alphabetic()
            || (rules.allow_unicode && c.is_alphabetic())
    });
    if !ok {
        return Err(InputError::InvalidNameCharacters);
    }
    Ok(collapsed)
}

/// Validate a numeric PIN of exactly [`PIN_LENGTH`] digits
pub fn validate_pin(raw: &str) -> Result<String, InputError> {
    let trimmed = raw.trim();
    if trimmed.len() != PIN_LENGTH || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(InputError::InvalidPin);
    }
    Ok(trimmed.to_string())
}

/// Parse a 1-based menu choice against a list of `len` items.
///
/// Returns the 0-based index.
pub fn parse_choice(raw: &str, len: usize) -> Result<usize, InputError> {
    let n: usize = raw.trim().parse().map_err(|_| InputError::InvalidChoice)?;
    if n == 0 || n > len {
        return Err(InputError::InvalidChoice);
    }
    Ok(n - 1)
}

/// Parse a stake amount and check it against the configured limits.
///
/// Balance is checked by the caller against a live wallet figure; this
/// only covers format and static bounds.
pub fn parse_stake(raw: &str, min: Decimal, max: Option<Decimal>) -> Result<Decimal, InputError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') || trimmed.starts_with('+') {
        return Err(InputError::InvalidAmount);
    }
    let amount = Decimal::from_str(trimmed).map_err(|_| InputError::InvalidAmount)?;
    if amount.scale() > 2 || amount <= Decimal::ZERO {
        return Err(InputError::InvalidAmount);
    }
    if amount < min {
        return Err(InputError::BelowMinimum { min });
    }
    if let Some(max) = max {
        if amount > max {
            return Err(InputError::AboveMaximum { max });
        }
    }
    Ok(amount.normalize().round_dp(2))
}

/// Securely parse JSON with size limits (seed files, service payloads)
pub fn secure_json_parse<T>(content: &str, max_bytes: usize) -> Result<T, anyhow::Error>
where
    T: serde::de::DeserializeOwned,
{
    if content.len() > max_bytes {
        anyhow::bail!("document exceeds {} bytes", max_bytes);
    }
    // Valid JSON cannot start with NUL; strip any left by an interrupted write.
    let normalized = content.trim_start_matches('\0');
    Ok(serde_json::from_str(normalized)?)
}
