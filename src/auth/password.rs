/// Password Hashing and Verification
///
/// Handles password hashing with bcrypt and password strength validation.

use bcrypt::{hash, verify, DEFAULT_COST};
use lazy_static::lazy_static;

use crate::error::{AppError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 72;

lazy_static! {
    // Verified against when the identifier is unknown so both login failures cost the same.
    static ref DUMMY_HASH: String =
        hash("archive-dummy-password-for-timing", DEFAULT_COST).unwrap_or_default();
}

/// Hash a password using bcrypt
///
/// # Errors
/// Returns error if:
/// - Password fails validation (too short, weak, etc.)
/// - Bcrypt hashing fails
pub fn hash_password(password: &str) -> Result<String, AppError> {
    hash_password_with_cost(password, DEFAULT_COST)
}

pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String, AppError> {
    validate_password_strength(password)?;

    hash(password, cost).map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
///
/// # Errors
/// Returns error if the stored hash cannot be parsed
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    verify(password, hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}

/// Burn the same bcrypt work as a real verification. Always false.
pub fn verify_against_dummy(password: &str) -> bool {
    let _ = verify(password, &DUMMY_HASH);
    false
}

/// Validate password strength requirements
///
/// Requirements:
/// - 8 to 72 bytes (bcrypt ignores anything past 72)
/// - At least one digit, one lowercase and one uppercase letter
pub fn validate_password_strength(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort("password".to_string(), MIN_PASSWORD_LENGTH).into());
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong("password".to_string(), MAX_PASSWORD_LENGTH).into());
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(ValidationError::InvalidFormat(
            "password must contain at least one digit, one lowercase letter, and one uppercase letter"
                .to_string(),
        )
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    #[test]
    fn test_hash_password() {
        let password = "ValidPassword123";
        let hash = hash_password_with_cost(password, TEST_COST).expect("Failed to hash password");

        assert_ne!(password, hash);
        assert!(hash.starts_with("$2"));
    }

    #[test]
    fn test_verify_password() {
        let hash = hash_password_with_cost("ValidPassword123", TEST_COST).unwrap();

        assert!(verify_password("ValidPassword123", &hash).unwrap());
        assert!(!verify_password("WrongPassword123", &hash).unwrap());
    }

    #[test]
    fn test_dummy_verification_never_succeeds() {
        assert!(!verify_against_dummy("archive-dummy-password-for-timing"));
    }

    #[test]
    fn test_weak_passwords_are_rejected() {
        let too_long = "a".repeat(MAX_PASSWORD_LENGTH) + "A1";
        for weak in ["Short1", "NoDigitsPassword", "NOLOWERCASE1", "nouppercase1", too_long.as_str()] {
            assert!(
                validate_password_strength(weak).is_err(),
                "accepted weak password {}",
                weak
            );
        }
    }

    #[test]
    fn test_valid_password() {
        assert!(validate_password_strength("ValidPassword123").is_ok());
    }
}
