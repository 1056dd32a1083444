/// Verification and recovery token redemption
///
/// Only the SHA-256 of an emailed token is stored, next to its generation
/// time. A token is redeemable while:
/// - its signature and signed expiry are valid
/// - its digest is still stored (single use)
/// - `now <= generation time + configured TTL`

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::auth::claims::{EmailTokenClaims, EmailTokenPurpose};
use crate::auth::password::validate_password_strength;
use crate::auth::service::AuthService;
use crate::email_client::recovery_email;
use crate::error::{with_timeout, AppError, AuthError};
use crate::store::hash_token;
use crate::validators::{is_valid_email, require_non_empty};

#[derive(Deserialize)]
pub struct RecoverPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

fn check_ttl(issued_at: Option<DateTime<Utc>>, ttl_minutes: i64) -> Result<(), AppError> {
    match issued_at {
        None => Err(AuthError::TokenRevoked.into()),
        Some(issued_at) if Utc::now() > issued_at + Duration::minutes(ttl_minutes) => {
            Err(AuthError::TokenExpired.into())
        }
        Some(_) => Ok(()),
    }
}

impl AuthService {
    /// Redeem a verification token and mark the address confirmed
    pub async fn verify_email(&self, token: &str) -> Result<(), AppError> {
        with_timeout(
            self.timeouts.verify_email,
            "verify_email",
            self.redeem_verification(token),
        )
        .await
    }

    async fn redeem_verification(&self, token: &str) -> Result<(), AppError> {
        let claims = self.decode_email_token(token, EmailTokenPurpose::VerifyEmail)?;
        let token_hash = hash_token(token);

        let issued_at = self.store.verification_token_issued_at(&token_hash).await?;
        check_ttl(issued_at, self.tokens.verify_email_ttl_minutes)?;

        if !self.store.confirm_email(&token_hash, &claims.sub).await? {
            return Err(AuthError::TokenRevoked.into());
        }

        tracing::info!(email = %claims.sub, "Email address confirmed");
        Ok(())
    }

    /// Start password recovery. Succeeds whether or not the address is known.
    pub async fn recover_password(&self, request: RecoverPasswordRequest) -> Result<(), AppError> {
        with_timeout(
            self.timeouts.recover_password,
            "recover_password",
            self.start_recovery(request),
        )
        .await
    }

    async fn start_recovery(&self, request: RecoverPasswordRequest) -> Result<(), AppError> {
        let email = is_valid_email(&request.email)?;

        if self.find_by_email(&email).await?.is_none() {
            tracing::info!(email = %email, "Password recovery requested for unknown email");
            return Ok(());
        }

        let token = self.issuer.issue_recovery_token(&email)?;
        self.store
            .store_recovery_token(&email, &hash_token(&token), Utc::now())
            .await?;

        tracing::info!(email = %email, "Password recovery token issued");

        let (subject, html) = recovery_email(&self.base_url, &token);
        self.dispatch_email(email, subject, html);
        Ok(())
    }

    /// Check that a recovery link is still redeemable without consuming it
    pub async fn check_recovery_token(&self, token: &str) -> Result<(), AppError> {
        with_timeout(self.timeouts.reset_password, "check_recovery_token", async {
            self.decode_email_token(token, EmailTokenPurpose::RecoverPassword)?;
            let issued_at = self
                .store
                .recovery_token_issued_at(&hash_token(token))
                .await?;
            check_ttl(issued_at, self.tokens.recover_password_ttl_minutes)
        })
        .await
    }

    /// Redeem a recovery token and set a new password. Revokes all sessions.
    pub async fn reset_password(&self, request: ResetPasswordRequest) -> Result<(), AppError> {
        with_timeout(
            self.timeouts.reset_password,
            "reset_password",
            self.redeem_recovery(request),
        )
        .await
    }

    async fn redeem_recovery(&self, request: ResetPasswordRequest) -> Result<(), AppError> {
        let claims = self.decode_email_token(&request.token, EmailTokenPurpose::RecoverPassword)?;
        let token_hash = hash_token(&request.token);

        let issued_at = self.store.recovery_token_issued_at(&token_hash).await?;
        check_ttl(issued_at, self.tokens.recover_password_ttl_minutes)?;

        validate_password_strength(&request.new_password)?;
        let password_hash = self.hasher.hash_blocking(request.new_password).await?;

        let version = self
            .store
            .reset_password(&token_hash, &claims.sub, &password_hash)
            .await?
            .ok_or(AppError::Auth(AuthError::TokenRevoked))?;

        tracing::info!(
            email = %claims.sub,
            token_version = version,
            "Password reset"
        );
        Ok(())
    }

    fn decode_email_token(
        &self,
        token: &str,
        purpose: EmailTokenPurpose,
    ) -> Result<EmailTokenClaims, AppError> {
        require_non_empty("token", token)?;
        self.issuer.decode_email_token(token, purpose)
    }
}
