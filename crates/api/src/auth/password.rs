//! Password hashing with Argon2

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hashing(e.to_string()))
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Validate password strength for new accounts
pub fn validate_password_strength(password: &str) -> Result<(), PasswordValidationError> {
    if password.chars().count() < 8 {
        return Err(PasswordValidationError::TooShort);
    }

    if password.len() > 128 {
        return Err(PasswordValidationError::TooLong);
    }

    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err(PasswordValidationError::MissingLetter);
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PasswordValidationError::MissingDigit);
    }

    const COMMON_PASSWORDS: &[&str] = &[
        "password1",
        "password123",
        "qwerty123",
        "abc12345",
        "letmein1",
        "welcome1",
        "welcome123",
        "admin123",
        "passw0rd",
        "iloveyou1",
        "12345678a",
        "support123",
    ];

    if COMMON_PASSWORDS.contains(&password.to_lowercase().as_str()) {
        return Err(PasswordValidationError::TooCommon);
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Invalid password hash: {0}")]
    InvalidHash(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PasswordValidationError {
    #[error("Password must be at least 8 characters")]
    TooShort,
    #[error("Password must be at most 128 characters")]
    TooLong,
    #[error("Password must contain a letter")]
    MissingLetter,
    #[error("Password must contain a digit")]
    MissingDigit,
    #[error("Password is too common")]
    TooCommon,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse 9").unwrap();
        assert!(verify_password("correct horse 9", &hash).unwrap());
        assert!(!verify_password("wrong horse 9", &hash).unwrap());
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(matches!(
            verify_password("anything", "not-a-hash"),
            Err(PasswordError::InvalidHash(_))
        ));
    }

    #[test]
    fn test_strength_rules() {
        assert_eq!(validate_password_strength("a1"), Err(PasswordValidationError::TooShort));
        assert_eq!(
            validate_password_strength("onlyletters"),
            Err(PasswordValidationError::MissingDigit)
        );
        assert_eq!(
            validate_password_strength("1234567890"),
            Err(PasswordValidationError::MissingLetter)
        );
        assert_eq!(
            validate_password_strength("Password123"),
            Err(PasswordValidationError::TooCommon)
        );
        assert!(validate_password_strength("video-call-7").is_ok());
    }
}
