/// JWT Token Issuance and Decoding
///
/// Every token class is signed with its own HS256 secret.

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::claims::{AccessClaims, EmailTokenClaims, EmailTokenPurpose, RefreshClaims};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};
use crate::models::UserIdentity;

const NONCE_LENGTH: usize = 16;

/// Signs and decodes tokens with per-class secrets
#[derive(Clone)]
pub struct TokenIssuer {
    config: JwtSettings,
    issuer: String,
}

impl TokenIssuer {
    pub fn new(config: JwtSettings, issuer: impl Into<String>) -> Self {
        Self {
            config,
            issuer: issuer.into(),
        }
    }

    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.config.access_token_expiry_seconds()
    }

    /// Sign an access token carrying the identity's current token version
    pub fn issue_access_token(&self, user: &UserIdentity) -> Result<String, AppError> {
        let claims = AccessClaims::new(
            user,
            self.config.access_token_expiry_seconds(),
            &self.issuer,
        );
        sign(&claims, &self.config.access_secret)
    }

    pub fn issue_refresh_token(&self, user_id: Uuid, token_version: i32) -> Result<String, AppError> {
        let claims = RefreshClaims::new(
            user_id,
            token_version,
            self.config.refresh_token_expiry_days * 24 * 3600,
            &self.issuer,
        );
        sign(&claims, &self.config.refresh_secret)
    }

    pub fn issue_verification_token(&self, email: &str) -> Result<String, AppError> {
        let claims = EmailTokenClaims::new(
            email,
            EmailTokenPurpose::VerifyEmail,
            nonce(),
            self.config.email_token_validity_hours * 3600,
            &self.issuer,
        );
        sign(&claims, &self.config.verification_secret)
    }

    pub fn issue_recovery_token(&self, email: &str) -> Result<String, AppError> {
        let claims = EmailTokenClaims::new(
            email,
            EmailTokenPurpose::RecoverPassword,
            nonce(),
            self.config.email_token_validity_hours * 3600,
            &self.issuer,
        );
        sign(&claims, &self.config.recovery_secret)
    }

    /// Signature, algorithm, expiry and issuer checks only.
    /// Revocation is the validator's job.
    pub fn decode_access_token(&self, token: &str) -> Result<AccessClaims, AppError> {
        verify::<AccessClaims>(token, &self.config.access_secret, &self.issuer)
    }

    pub fn decode_refresh_token(&self, token: &str) -> Result<RefreshClaims, AppError> {
        verify::<RefreshClaims>(token, &self.config.refresh_secret, &self.issuer)
    }

    pub fn decode_email_token(
        &self,
        token: &str,
        purpose: EmailTokenPurpose,
    ) -> Result<EmailTokenClaims, AppError> {
        let secret = match purpose {
            EmailTokenPurpose::VerifyEmail => &self.config.verification_secret,
            EmailTokenPurpose::RecoverPassword => &self.config.recovery_secret,
        };

        let claims = verify::<EmailTokenClaims>(token, secret, &self.issuer)?;
        if claims.purpose != purpose {
            tracing::warn!("Email token presented for the wrong purpose");
            return Err(AppError::Auth(AuthError::TokenMalformed));
        }
        Ok(claims)
    }
}

fn nonce() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LENGTH)
        .map(char::from)
        .collect()
}

fn sign<T: Serialize>(claims: &T, secret: &str) -> Result<String, AppError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

fn verify<T: DeserializeOwned>(token: &str, secret: &str, issuer: &str) -> Result<T, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[issuer]);
    validation.validate_nbf = true;
    validation.leeway = 0;

    decode::<T>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            JwtErrorKind::ExpiredSignature => AppError::Auth(AuthError::TokenExpired),
            _ => {
                tracing::warn!("JWT validation error: {}", e);
                AppError::Auth(AuthError::TokenMalformed)
            }
        })
}
