use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::CredentialStore;
use crate::error::{AppError, DatabaseError};
use crate::models::{NewUser, Role, UserIdentity};

type UserRow = (
    Uuid,
    String,
    String,
    String,
    String,
    String,
    i32,
    DateTime<Utc>,
    DateTime<Utc>,
);

const USER_COLUMNS: &str = r#"
    user_id, user_name, email_address, password_hash, user_role,
    email_validation_status, token_version, created_at, updated_at
"#;

fn into_identity(row: UserRow) -> Result<UserIdentity, AppError> {
    let (
        user_id,
        username,
        email,
        password_hash,
        role,
        status,
        token_version,
        created_at,
        updated_at,
    ) = row;

    Ok(UserIdentity {
        user_id,
        username,
        email,
        password_hash,
        role: role
            .parse::<Role>()
            .map_err(|_| AppError::Internal(format!("Unknown role in storage: {}", role)))?,
        email_validation_status: status.parse()?,
        token_version,
        created_at,
        updated_at,
    })
}

/// Postgres-backed credential store
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn email_exists(&self, email: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM user_account WHERE email_address = $1)",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn username_exists(&self, username: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM user_account WHERE user_name = $1)",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn create_user(&self, user: NewUser) -> Result<UserIdentity, AppError> {
        let sql = format!(
            r#"
            INSERT INTO user_account (
                user_id, user_name, email_address, password_hash, hash_algorithm,
                user_role, email_validation_status, token_version,
                verification_token_hash, verification_token_generation_time,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, 'bcrypt', 'user', 'pending', 1, $5, $6, $7, $7)
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user.user_id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.verification_token_hash)
            .bind(user.verification_token_issued_at)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Database(DatabaseError::EmailTaken(_)) => {
                    AppError::Database(DatabaseError::EmailTaken(user.email.clone()))
                }
                AppError::Database(DatabaseError::UsernameTaken(_)) => {
                    AppError::Database(DatabaseError::UsernameTaken(user.username.clone()))
                }
                other => other,
            })?;

        into_identity(row)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserIdentity>, AppError> {
        let sql = format!(
            "SELECT {} FROM user_account WHERE email_address = $1",
            USER_COLUMNS
        );

        sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(into_identity)
            .transpose()
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserIdentity>, AppError> {
        let sql = format!("SELECT {} FROM user_account WHERE user_id = $1", USER_COLUMNS);

        sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .map(into_identity)
            .transpose()
    }

    async fn token_version(&self, user_id: Uuid) -> Result<Option<i32>, AppError> {
        let version = sqlx::query_scalar::<_, i32>(
            "SELECT token_version FROM user_account WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(version)
    }

    async fn increment_token_version(&self, user_id: Uuid) -> Result<i32, AppError> {
        let version = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE user_account
            SET token_version = token_version + 1, updated_at = $2
            WHERE user_id = $1
            RETURNING token_version
            "#,
        )
        .bind(user_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(version)
    }

    async fn rotate_token_version(
        &self,
        user_id: Uuid,
        expected: i32,
    ) -> Result<Option<i32>, AppError> {
        // The row lock taken by UPDATE serialises concurrent rotations;
        // the loser re-evaluates the WHERE clause and matches nothing.
        let version = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE user_account
            SET token_version = token_version + 1, updated_at = $3
            WHERE user_id = $1 AND token_version = $2
            RETURNING token_version
            "#,
        )
        .bind(user_id)
        .bind(expected)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        Ok(version)
    }

    async fn verification_token_issued_at(
        &self,
        token_hash: &str,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        let issued_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            SELECT verification_token_generation_time
            FROM user_account
            WHERE verification_token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(issued_at)
    }

    async fn confirm_email(&self, token_hash: &str, email: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE user_account
            SET email_validation_status = 'confirmed',
                verification_token_hash = NULL,
                verification_token_generation_time = NULL,
                updated_at = $3
            WHERE verification_token_hash = $1 AND email_address = $2
            "#,
        )
        .bind(token_hash)
        .bind(email)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn store_recovery_token(
        &self,
        email: &str,
        token_hash: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE user_account
            SET password_recovery_token_hash = $2,
                password_recovery_token_generation_time = $3
            WHERE email_address = $1
            "#,
        )
        .bind(email)
        .bind(token_hash)
        .bind(issued_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn recovery_token_issued_at(
        &self,
        token_hash: &str,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        let issued_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            SELECT password_recovery_token_generation_time
            FROM user_account
            WHERE password_recovery_token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(issued_at)
    }

    async fn reset_password(
        &self,
        token_hash: &str,
        email: &str,
        new_password_hash: &str,
    ) -> Result<Option<i32>, AppError> {
        let version = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE user_account
            SET password_hash = $3,
                password_recovery_token_hash = NULL,
                password_recovery_token_generation_time = NULL,
                token_version = token_version + 1,
                updated_at = $4
            WHERE password_recovery_token_hash = $1 AND email_address = $2
            RETURNING token_version
            "#,
        )
        .bind(token_hash)
        .bind(email)
        .bind(new_password_hash)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        Ok(version)
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        new_password_hash: &str,
    ) -> Result<i32, AppError> {
        let version = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE user_account
            SET password_hash = $2, token_version = token_version + 1, updated_at = $3
            WHERE user_id = $1
            RETURNING token_version
            "#,
        )
        .bind(user_id)
        .bind(new_password_hash)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(version)
    }

    async fn update_role(&self, user_id: Uuid, role: Role) -> Result<i32, AppError> {
        let version = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE user_account
            SET user_role = $2, token_version = token_version + 1, updated_at = $3
            WHERE user_id = $1
            RETURNING token_version
            "#,
        )
        .bind(user_id)
        .bind(role.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(version)
    }
}
