/// Access Token Validation
///
/// Signature and expiry alone do not make a token valid: its embedded
/// `token_version` must equal the stored one, and the embedded email status
/// must be `confirmed`.

use std::sync::Arc;

use crate::auth::claims::AccessClaims;
use crate::auth::jwt::TokenIssuer;
use crate::auth::principal::Principal;
use crate::error::{with_timeout, AppError, AuthError};
use crate::models::EmailValidationStatus;
use crate::store::CredentialStore;

#[derive(Clone)]
pub struct TokenValidator {
    store: Arc<dyn CredentialStore>,
    issuer: TokenIssuer,
    token_version_timeout: u64,
}

impl TokenValidator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        issuer: TokenIssuer,
        token_version_timeout: u64,
    ) -> Self {
        Self {
            store,
            issuer,
            token_version_timeout,
        }
    }

    /// Validate an access token
    ///
    /// # Errors
    /// - `TokenMalformed` on bad signature, algorithm or issuer
    /// - `TokenExpired` once `exp` has passed
    /// - `TokenRevoked` when the stored version moved on (or the user is gone)
    /// - `AccountNotConfirmed` when the claims predate email confirmation
    /// - `Timeout` when the version lookup exceeds its deadline
    pub async fn validate(&self, token: &str) -> Result<AccessClaims, AppError> {
        let claims = self.issuer.decode_access_token(token)?;
        let user_id = claims.user_id()?;

        let current = with_timeout(
            self.token_version_timeout,
            "token_version",
            self.store.token_version(user_id),
        )
        .await?;

        match current {
            Some(version) if version == claims.token_version => {}
            Some(version) => {
                tracing::info!(
                    user_id = %user_id,
                    token_version = claims.token_version,
                    current_version = version,
                    "Rejected revoked access token"
                );
                return Err(AppError::Auth(AuthError::TokenRevoked));
            }
            None => {
                tracing::info!(user_id = %user_id, "Access token for unknown user");
                return Err(AppError::Auth(AuthError::TokenRevoked));
            }
        }

        if claims.email_validation_status != EmailValidationStatus::Confirmed {
            return Err(AppError::Auth(AuthError::AccountNotConfirmed));
        }

        Ok(claims)
    }

    pub async fn authenticate(&self, token: &str) -> Result<Principal, AppError> {
        let claims = self.validate(token).await?;
        Principal::try_from(claims)
    }
}
