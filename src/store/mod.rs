/// Credential storage
///
/// One trait per aggregate, one production implementation backed by
/// Postgres and one in-memory implementation for tests. Components receive
/// an `Arc<dyn CredentialStore>` at construction time.
///
/// Every operation that touches `token_version` is a single atomic
/// read-modify-write at the storage layer, so a concurrent validation
/// always observes either the old or the new value, never a torn one.

mod memory;
mod postgres;

pub use memory::InMemoryCredentialStore;
pub use postgres::PgCredentialStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewUser, Role, UserIdentity};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn email_exists(&self, email: &str) -> Result<bool, AppError>;

    async fn username_exists(&self, username: &str) -> Result<bool, AppError>;

    /// Insert a pending account with `token_version = 1`
    async fn create_user(&self, user: NewUser) -> Result<UserIdentity, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserIdentity>, AppError>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserIdentity>, AppError>;

    /// Current token version, `None` if the account does not exist
    async fn token_version(&self, user_id: Uuid) -> Result<Option<i32>, AppError>;

    /// Unconditional `token_version + 1`, returns the new value
    async fn increment_token_version(&self, user_id: Uuid) -> Result<i32, AppError>;

    /// Increment only if the stored version still equals `expected`.
    /// Returns `None` when another writer got there first.
    async fn rotate_token_version(&self, user_id: Uuid, expected: i32)
        -> Result<Option<i32>, AppError>;

    async fn verification_token_issued_at(
        &self,
        token_hash: &str,
    ) -> Result<Option<DateTime<Utc>>, AppError>;

    /// Mark the email confirmed and clear the verification token.
    /// Returns `false` if no account holds this token for this email.
    async fn confirm_email(&self, token_hash: &str, email: &str) -> Result<bool, AppError>;

    /// Returns `false` if no account has this email
    async fn store_recovery_token(
        &self,
        email: &str,
        token_hash: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    async fn recovery_token_issued_at(
        &self,
        token_hash: &str,
    ) -> Result<Option<DateTime<Utc>>, AppError>;

    /// Replace the password of the account holding this recovery token,
    /// clear the token and bump the token version
    async fn reset_password(
        &self,
        token_hash: &str,
        email: &str,
        new_password_hash: &str,
    ) -> Result<Option<i32>, AppError>;

    /// Replace the password and bump the token version
    async fn update_password(&self, user_id: Uuid, new_password_hash: &str)
        -> Result<i32, AppError>;

    /// Change the role and bump the token version so stale role claims die
    async fn update_role(&self, user_id: Uuid, role: Role) -> Result<i32, AppError>;
}

/// SHA-256 digest of an emailed token.
/// Only the digest is persisted, never the token itself.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
