use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::CredentialStore;
use crate::error::{AppError, DatabaseError};
use crate::models::{EmailValidationStatus, NewUser, Role, UserIdentity};

#[derive(Clone)]
struct StoredAccount {
    identity: UserIdentity,
    verification_token_hash: Option<String>,
    verification_token_issued_at: Option<DateTime<Utc>>,
    recovery_token_hash: Option<String>,
    recovery_token_issued_at: Option<DateTime<Utc>>,
}

/// In-memory credential store for tests and local runs.
///
/// All reads and writes go through one mutex, which makes every
/// compare-and-increment linearizable just like the SQL `UPDATE`s.
#[derive(Clone, Default)]
pub struct InMemoryCredentialStore {
    accounts: Arc<Mutex<HashMap<Uuid, StoredAccount>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn accounts(&self) -> Result<MutexGuard<'_, HashMap<Uuid, StoredAccount>>, AppError> {
        self.accounts
            .lock()
            .map_err(|_| AppError::Internal("credential store lock poisoned".to_string()))
    }

    /// Seed an account directly, bypassing registration
    pub fn insert_user(&self, identity: UserIdentity) -> Result<(), AppError> {
        self.accounts()?.insert(
            identity.user_id,
            StoredAccount {
                identity,
                verification_token_hash: None,
                verification_token_issued_at: None,
                recovery_token_hash: None,
                recovery_token_issued_at: None,
            },
        );
        Ok(())
    }

    /// Move the stored verification token generation time into the past
    pub fn backdate_verification_token(&self, email: &str, minutes: i64) -> Result<(), AppError> {
        let mut accounts = self.accounts()?;
        if let Some(account) = accounts.values_mut().find(|a| a.identity.email == email) {
            account.verification_token_issued_at = account
                .verification_token_issued_at
                .map(|t| t - Duration::minutes(minutes));
        }
        Ok(())
    }

    /// Move the stored recovery token generation time into the past
    pub fn backdate_recovery_token(&self, email: &str, minutes: i64) -> Result<(), AppError> {
        let mut accounts = self.accounts()?;
        if let Some(account) = accounts.values_mut().find(|a| a.identity.email == email) {
            account.recovery_token_issued_at = account
                .recovery_token_issued_at
                .map(|t| t - Duration::minutes(minutes));
        }
        Ok(())
    }
}

fn bump(account: &mut StoredAccount) -> i32 {
    account.identity.token_version += 1;
    account.identity.updated_at = Utc::now();
    account.identity.token_version
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn email_exists(&self, email: &str) -> Result<bool, AppError> {
        Ok(self.accounts()?.values().any(|a| a.identity.email == email))
    }

    async fn username_exists(&self, username: &str) -> Result<bool, AppError> {
        Ok(self
            .accounts()?
            .values()
            .any(|a| a.identity.username == username))
    }

    async fn create_user(&self, user: NewUser) -> Result<UserIdentity, AppError> {
        let mut accounts = self.accounts()?;

        if accounts.values().any(|a| a.identity.email == user.email) {
            return Err(DatabaseError::EmailTaken(user.email).into());
        }
        if accounts.values().any(|a| a.identity.username == user.username) {
            return Err(DatabaseError::UsernameTaken(user.username).into());
        }

        let now = Utc::now();
        let identity = UserIdentity {
            user_id: user.user_id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role: Role::User,
            email_validation_status: EmailValidationStatus::Pending,
            token_version: 1,
            created_at: now,
            updated_at: now,
        };

        accounts.insert(
            identity.user_id,
            StoredAccount {
                identity: identity.clone(),
                verification_token_hash: Some(user.verification_token_hash),
                verification_token_issued_at: Some(user.verification_token_issued_at),
                recovery_token_hash: None,
                recovery_token_issued_at: None,
            },
        );

        Ok(identity)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserIdentity>, AppError> {
        Ok(self
            .accounts()?
            .values()
            .find(|a| a.identity.email == email)
            .map(|a| a.identity.clone()))
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserIdentity>, AppError> {
        Ok(self.accounts()?.get(&user_id).map(|a| a.identity.clone()))
    }

    async fn token_version(&self, user_id: Uuid) -> Result<Option<i32>, AppError> {
        Ok(self
            .accounts()?
            .get(&user_id)
            .map(|a| a.identity.token_version))
    }

    async fn increment_token_version(&self, user_id: Uuid) -> Result<i32, AppError> {
        let mut accounts = self.accounts()?;
        let account = accounts
            .get_mut(&user_id)
            .ok_or_else(|| DatabaseError::NotFound(format!("user {}", user_id)))?;
        Ok(bump(account))
    }

    async fn rotate_token_version(
        &self,
        user_id: Uuid,
        expected: i32,
    ) -> Result<Option<i32>, AppError> {
        let mut accounts = self.accounts()?;
        match accounts.get_mut(&user_id) {
            Some(account) if account.identity.token_version == expected => Ok(Some(bump(account))),
            _ => Ok(None),
        }
    }

    async fn verification_token_issued_at(
        &self,
        token_hash: &str,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(self
            .accounts()?
            .values()
            .find(|a| a.verification_token_hash.as_deref() == Some(token_hash))
            .and_then(|a| a.verification_token_issued_at))
    }

    async fn confirm_email(&self, token_hash: &str, email: &str) -> Result<bool, AppError> {
        let mut accounts = self.accounts()?;
        let account = accounts.values_mut().find(|a| {
            a.verification_token_hash.as_deref() == Some(token_hash) && a.identity.email == email
        });

        match account {
            Some(account) => {
                account.identity.email_validation_status = EmailValidationStatus::Confirmed;
                account.identity.updated_at = Utc::now();
                account.verification_token_hash = None;
                account.verification_token_issued_at = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn store_recovery_token(
        &self,
        email: &str,
        token_hash: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut accounts = self.accounts()?;
        match accounts.values_mut().find(|a| a.identity.email == email) {
            Some(account) => {
                account.recovery_token_hash = Some(token_hash.to_string());
                account.recovery_token_issued_at = Some(issued_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn recovery_token_issued_at(
        &self,
        token_hash: &str,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(self
            .accounts()?
            .values()
            .find(|a| a.recovery_token_hash.as_deref() == Some(token_hash))
            .and_then(|a| a.recovery_token_issued_at))
    }

    async fn reset_password(
        &self,
        token_hash: &str,
        email: &str,
        new_password_hash: &str,
    ) -> Result<Option<i32>, AppError> {
        let mut accounts = self.accounts()?;
        let account = accounts.values_mut().find(|a| {
            a.recovery_token_hash.as_deref() == Some(token_hash) && a.identity.email == email
        });

        match account {
            Some(account) => {
                account.identity.password_hash = new_password_hash.to_string();
                account.recovery_token_hash = None;
                account.recovery_token_issued_at = None;
                Ok(Some(bump(account)))
            }
            None => Ok(None),
        }
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        new_password_hash: &str,
    ) -> Result<i32, AppError> {
        let mut accounts = self.accounts()?;
        let account = accounts
            .get_mut(&user_id)
            .ok_or_else(|| DatabaseError::NotFound(format!("user {}", user_id)))?;
        account.identity.password_hash = new_password_hash.to_string();
        Ok(bump(account))
    }

    async fn update_role(&self, user_id: Uuid, role: Role) -> Result<i32, AppError> {
        let mut accounts = self.accounts()?;
        let account = accounts
            .get_mut(&user_id)
            .ok_or_else(|| DatabaseError::NotFound(format!("user {}", user_id)))?;
        account.identity.role = role;
        Ok(bump(account))
    }
}
