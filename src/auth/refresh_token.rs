/// Refresh Token Rotation
///
/// Refresh tokens are not persisted. A token is live only while its embedded
/// version equals the stored one, and redeeming it moves the stored version
/// forward with a compare-and-increment, so:
/// - every redemption revokes the redeemed token and all its siblings
/// - of two concurrent redemptions exactly one wins

use crate::auth::service::{AuthService, TokenPair};
use crate::error::{with_timeout, AppError, AuthError, DatabaseError};
use crate::validators::require_non_empty;

impl AuthService {
    /// Exchange a refresh token for a new access + refresh pair
    ///
    /// # Errors
    /// - `TokenMalformed` / `TokenExpired` from signature and expiry checks
    /// - `TokenRevoked` when the token was already superseded or lost a race
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        with_timeout(self.timeouts.refresh, "refresh", self.rotate(refresh_token)).await
    }

    async fn rotate(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        require_non_empty("refresh_token", refresh_token)?;

        let claims = self.issuer.decode_refresh_token(refresh_token)?;
        let user_id = claims.user_id()?;

        let current = with_timeout(
            self.timeouts.token_version,
            "token_version",
            self.store.token_version(user_id),
        )
        .await?;

        if current != Some(claims.token_version) {
            tracing::warn!(
                user_id = %user_id,
                token_version = claims.token_version,
                "Superseded refresh token presented"
            );
            return Err(AuthError::TokenRevoked.into());
        }

        let new_version = with_timeout(
            self.timeouts.token_version,
            "rotate_token_version",
            self.store.rotate_token_version(user_id, claims.token_version),
        )
        .await?
        .ok_or_else(|| {
            tracing::warn!(user_id = %user_id, "Lost refresh rotation race");
            AppError::Auth(AuthError::TokenRevoked)
        })?;

        let mut user = self
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("user {}", user_id)))?;
        user.token_version = new_version;

        tracing::info!(
            user_id = %user_id,
            token_version = new_version,
            "Refresh token rotated"
        );

        self.issue_pair(&user)
    }
}
