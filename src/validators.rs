/// Input validators for identifiers arriving at the public endpoints
/// 1. DoS Protection: Input length limits
/// 2. Phishing Protection: Email validation
/// 3. SQL Injection Prevention: pattern screening

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).expect("email regex is valid");

    static ref SQL_INJECTION_PATTERNS: [Regex; 2] = [
        Regex::new(r"(?i)\s+UNION\s+").expect("union regex is valid"),
        Regex::new(r#"(?i)(\bOR\b|\bAND\b)\s*(['"][0-9]*['"]|[0-9]*)\s*=\s*(['"][0-9]*['"]|[0-9]*)"#)
            .expect("boolean regex is valid"),
    ];
}

/// Validates an email address and returns it trimmed and lowercased
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".into()));
    }

    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".into(), MIN_EMAIL_LENGTH));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".into(), MAX_EMAIL_LENGTH));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email".into()));
    }

    if has_suspicious_email_patterns(trimmed) {
        return Err(ValidationError::SuspiciousContent("email".into()));
    }

    if SQL_INJECTION_PATTERNS.iter().any(|p| p.is_match(trimmed)) {
        return Err(ValidationError::PossibleSQLInjection);
    }

    Ok(trimmed.to_lowercase())
}

fn has_suspicious_email_patterns(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, _)) => local.len() > 64 || email.matches('@').count() != 1 || email.contains('\0'),
        None => true,
    }
}
