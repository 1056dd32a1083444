/// Password Hashing and Verification
///
/// Handles password hashing with bcrypt and password strength validation.

use bcrypt::{hash, verify};

use crate::error::{AppError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 8;
/// bcrypt only reads the first 72 bytes of its input
const MAX_PASSWORD_BYTES: usize = 72;

/// Bcrypt hasher with a configured cost.
///
/// The cost is embedded in every digest, so changing it only affects
/// newly hashed passwords.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Hash a password that already passed `validate_password_strength`
    ///
    /// # Errors
    /// - `InvalidInput` when the password exceeds 72 bytes
    /// - Internal error if bcrypt fails
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(too_long().into());
        }
        hash(password, self.cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against its hash.
    /// A mismatch is `Ok(false)`, not an error.
    pub fn verify(&self, password: &str, password_hash: &str) -> Result<bool, AppError> {
        // Never stored, and bcrypt would compare only its 72-byte prefix
        if password.len() > MAX_PASSWORD_BYTES {
            return Ok(false);
        }
        verify(password, password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
    }

    /// `hash` on the blocking pool
    pub async fn hash_blocking(&self, password: String) -> Result<String, AppError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.hash(&password)).await?
    }

    /// `verify` on the blocking pool
    pub async fn verify_blocking(
        &self,
        password: String,
        password_hash: String,
    ) -> Result<bool, AppError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.verify(&password, &password_hash)).await?
    }
}

fn too_long() -> ValidationError {
    ValidationError::TooLong("password".to_string(), MAX_PASSWORD_BYTES)
}

/// Validate password strength requirements
///
/// Requirements:
/// - at least 8 characters and at most 72 bytes
/// - At least one lowercase letter, one uppercase letter, one digit
///   and one special character
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let length = password.chars().count();

    if length < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        ));
    }

    // Bytes, not chars: bcrypt truncates silently past 72 bytes
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(too_long());
    }

    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    let mut missing = Vec::new();
    if !has_lowercase {
        missing.push("a lowercase letter");
    }
    if !has_uppercase {
        missing.push("an uppercase letter");
    }
    if !has_digit {
        missing.push("a digit");
    }
    if !has_special {
        missing.push("a special character");
    }

    if !missing.is_empty() {
        return Err(ValidationError::WeakPassword(format!(
            "must contain {}",
            missing.join(", ")
        )));
    }

    Ok(())
}
