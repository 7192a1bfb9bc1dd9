use once_cell::sync::Lazy;
use regex::Regex;
use validator::ValidationError;

use crate::error::{IdentityError, Result};

/// Input validation utilities for the auth core

// Compile regex patterns once at startup
static E164_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\+[1-9][0-9]{6,14}$").expect("hardcoded E.164 regex is invalid - fix source code")
});

static COUNTRY_CODE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\+[1-9][0-9]{0,3}$")
        .expect("hardcoded country code regex is invalid - fix source code")
});

/// Validate E.164 phone number format (+, then 7-15 digits)
pub fn is_valid_e164(phone: &str) -> bool {
    E164_REGEX.is_match(phone)
}

/// Validate a dialing prefix such as `+249`
pub fn is_valid_country_code(code: &str) -> bool {
    COUNTRY_CODE_REGEX.is_match(code)
}

/// Normalize user-entered phone numbers to E.164.
///
/// - strips whitespace, dashes, dots and parentheses
/// - `00` international prefix becomes `+`
/// - numbers without a prefix get `default_country_code`, dropping one
///   leading trunk `0` (`0912345678` -> `+249912345678`)
pub fn normalize_phone(raw: &str, default_country_code: &str) -> Result<String> {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    let normalized = if let Some(rest) = compact.strip_prefix("00") {
        format!("+{}", rest)
    } else if compact.starts_with('+') {
        compact
    } else {
        let local = compact.strip_prefix('0').unwrap_or(&compact);
        format!("{}{}", default_country_code, local)
    };

    if is_valid_e164(&normalized) {
        Ok(normalized)
    } else {
        Err(IdentityError::Validation(
            "Phone number must be in E.164 format (e.g., +249912345678)".to_string(),
        ))
    }
}

/// Mask phone number for logging
pub fn mask_phone(phone: &str) -> String {
    let count = phone.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    let visible: String = phone.chars().skip(count - 4).collect();
    format!("****{}", visible)
}

/// validator crate compatible custom validator for OTP codes (4-6 digits)
pub fn validate_otp_code(code: &str) -> std::result::Result<(), ValidationError> {
    if crypto_core::otp::is_valid_code_format(code) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_otp_format"))
    }
}
