/// JWT Claims structures
///
/// Payloads of the four token classes we sign. Standard registered claims
/// follow RFC 7519 naming.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AuthError};
use crate::models::{EmailValidationStatus, Role, UserIdentity};

/// Access token payload: full identity snapshot plus the token version
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AccessClaims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub email_validation_status: EmailValidationStatus,
    pub token_version: i32,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
    pub iss: String,
}

impl AccessClaims {
    pub fn new(user: &UserIdentity, expiry_seconds: i64, issuer: &str) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user.user_id.to_string(),
            user_id: user.user_id.to_string(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            email_validation_status: user.email_validation_status,
            token_version: user.token_version,
            exp: now + expiry_seconds,
            iat: now,
            nbf: now,
            iss: issuer.to_string(),
        }
    }

    /// Extract user ID from claims
    ///
    /// # Errors
    /// Returns `TokenMalformed` if the subject is not a UUID
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AppError::Auth(AuthError::TokenMalformed))
    }
}

/// Refresh token payload: subject and token version only
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RefreshClaims {
    pub sub: String,
    pub token_version: i32,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

impl RefreshClaims {
    pub fn new(user_id: Uuid, token_version: i32, expiry_seconds: i64, issuer: &str) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id.to_string(),
            token_version,
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer.to_string(),
        }
    }

    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AppError::Auth(AuthError::TokenMalformed))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmailTokenPurpose {
    VerifyEmail,
    RecoverPassword,
}

/// Verification / recovery token payload. Subject is the email address.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EmailTokenClaims {
    pub sub: String,
    pub purpose: EmailTokenPurpose,
    /// Random nonce so two tokens issued within the same second differ
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

impl EmailTokenClaims {
    pub fn new(
        email: &str,
        purpose: EmailTokenPurpose,
        nonce: String,
        expiry_seconds: i64,
        issuer: &str,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: email.to_string(),
            purpose,
            jti: nonce,
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn identity() -> UserIdentity {
        UserIdentity {
            user_id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            password_hash: "hash".to_string(),
            role: Role::Admin,
            email_validation_status: EmailValidationStatus::Confirmed,
            token_version: 7,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_access_claims_snapshot_identity() {
        let user = identity();
        let claims = AccessClaims::new(&user, 3600, "test");

        assert_eq!(claims.sub, user.user_id.to_string());
        assert_eq!(claims.user_id, claims.sub);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.token_version, 7);
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims.nbf, claims.iat);
        assert_eq!(claims.user_id().unwrap(), user.user_id);
    }

    #[test]
    fn test_invalid_subject_is_malformed() {
        let mut claims = AccessClaims::new(&identity(), 3600, "test");
        claims.sub = "invalid-uuid".to_string();

        let err = claims.user_id().unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::TokenMalformed)));
    }

    #[test]
    fn test_refresh_claims_are_minimal() {
        let user_id = Uuid::new_v4();
        let claims = RefreshClaims::new(user_id, 3, 60, "test");
        let json = serde_json::to_value(&claims).unwrap();

        assert_eq!(json["sub"], user_id.to_string());
        assert_eq!(json["token_version"], 3);
        assert!(json.get("email").is_none());
        assert!(json.get("role").is_none());
    }

    #[test]
    fn test_email_token_purpose_serialization() {
        let claims = EmailTokenClaims::new(
            "a@x.com",
            EmailTokenPurpose::RecoverPassword,
            "nonce".to_string(),
            60,
            "test",
        );
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["purpose"], "recover_password");
        assert_eq!(json["sub"], "a@x.com");
    }
}
