/// User account model
///
/// `UserIdentity` is the stored row, `UserProfile` is what leaves the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AppError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(AppError::Validation(ValidationError::InvalidFormat(
                "role".to_string(),
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailValidationStatus {
    Pending,
    Unconfirmed,
    Confirmed,
}

impl EmailValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailValidationStatus::Pending => "pending",
            EmailValidationStatus::Unconfirmed => "unconfirmed",
            EmailValidationStatus::Confirmed => "confirmed",
        }
    }
}

impl fmt::Display for EmailValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmailValidationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EmailValidationStatus::Pending),
            "unconfirmed" => Ok(EmailValidationStatus::Unconfirmed),
            "confirmed" => Ok(EmailValidationStatus::Confirmed),
            other => Err(AppError::Internal(format!(
                "Unknown email validation status in storage: {}",
                other
            ))),
        }
    }
}

/// Stored user account
#[derive(Clone)]
pub struct UserIdentity {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub email_validation_status: EmailValidationStatus,
    pub token_version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserIdentity")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"[redacted]")
            .field("role", &self.role)
            .field("email_validation_status", &self.email_validation_status)
            .field("token_version", &self.token_version)
            .finish()
    }
}

impl UserIdentity {
    pub fn is_confirmed(&self) -> bool {
        self.email_validation_status == EmailValidationStatus::Confirmed
    }
}

/// Insert payload for a freshly registered account
#[derive(Clone)]
pub struct NewUser {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub verification_token_hash: String,
    pub verification_token_issued_at: DateTime<Utc>,
}

/// Public view of an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub email_validation_status: EmailValidationStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&UserIdentity> for UserProfile {
    fn from(user: &UserIdentity) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            email_validation_status: user.email_validation_status,
            created_at: user.created_at,
        }
    }
}
