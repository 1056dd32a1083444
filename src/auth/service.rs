/// Authentication Service
///
/// Orchestrates registration, login, logout, password change and role
/// management. Every flow runs under its own configured deadline; the
/// storage calls inside it carry their finer-grained deadlines too.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::jwt::TokenIssuer;
use crate::auth::password::{validate_password_strength, PasswordHasher};
use crate::auth::principal::Principal;
use crate::configuration::{Settings, TimeoutSettings, TokenSettings};
use crate::email_client::{verification_email, EmailSender};
use crate::error::{with_timeout, AppError, AuthError, DatabaseError, ValidationError};
use crate::models::{EmailValidationStatus, NewUser, Role, UserIdentity, UserProfile};
use crate::store::{hash_token, CredentialStore};
use crate::validators::{is_valid_email, is_valid_username, require_non_empty};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Deserialize)]
pub struct SetRoleRequest {
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    pub user_id: Uuid,
    pub email_validation_status: EmailValidationStatus,
}

/// Access + refresh pair handed out by login and refresh
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user_id: Uuid,
}

#[derive(Clone)]
pub struct AuthService {
    pub(crate) store: Arc<dyn CredentialStore>,
    pub(crate) issuer: TokenIssuer,
    pub(crate) hasher: PasswordHasher,
    pub(crate) email_sender: Arc<dyn EmailSender>,
    pub(crate) timeouts: TimeoutSettings,
    pub(crate) tokens: TokenSettings,
    pub(crate) base_url: String,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        email_sender: Arc<dyn EmailSender>,
        settings: &Settings,
    ) -> Self {
        Self {
            store,
            issuer: TokenIssuer::new(settings.jwt.clone(), settings.application.name.clone()),
            hasher: PasswordHasher::new(settings.application.password_hash_cost),
            email_sender,
            timeouts: settings.timeouts.clone(),
            tokens: settings.tokens.clone(),
            base_url: settings.application.base_url.clone(),
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Register a new account in `pending` state and mail its verification link
    ///
    /// # Errors
    /// - `InvalidInput` for malformed username/email or a weak password
    /// - `EmailAlreadyExists` / `UsernameAlreadyExists`
    /// - `Timeout` when any step exceeds its deadline
    pub async fn register(&self, request: RegisterRequest) -> Result<RegisteredUser, AppError> {
        with_timeout(self.timeouts.register, "register", self.register_account(request)).await
    }

    async fn register_account(&self, request: RegisterRequest) -> Result<RegisteredUser, AppError> {
        let username = is_valid_username(&request.username)?;
        let email = is_valid_email(&request.email)?;

        if self.email_exists(&email).await? {
            return Err(DatabaseError::EmailTaken(email).into());
        }
        if self.username_exists(&username).await? {
            return Err(DatabaseError::UsernameTaken(username).into());
        }

        validate_password_strength(&request.password)?;
        let password_hash = self.hasher.hash_blocking(request.password).await?;

        let verification_token = self.issuer.issue_verification_token(&email)?;
        let new_user = NewUser {
            user_id: Uuid::new_v4(),
            username,
            email: email.clone(),
            password_hash,
            verification_token_hash: hash_token(&verification_token),
            verification_token_issued_at: Utc::now(),
        };

        let user = with_timeout(
            self.timeouts.create_user,
            "create_user",
            self.store.create_user(new_user),
        )
        .await?;

        tracing::info!(
            user_id = %user.user_id,
            username = %user.username,
            "User registered"
        );

        let (subject, html) = verification_email(&self.base_url, &verification_token);
        self.dispatch_email(email, subject, html);

        Ok(RegisteredUser {
            user_id: user.user_id,
            email_validation_status: user.email_validation_status,
        })
    }

    /// Authenticate with email and password
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    /// Success bumps the token version, revoking every earlier token.
    pub async fn login(&self, request: LoginRequest) -> Result<TokenPair, AppError> {
        with_timeout(self.timeouts.login, "login", self.authenticate(request)).await
    }

    async fn authenticate(&self, request: LoginRequest) -> Result<TokenPair, AppError> {
        require_non_empty("email", &request.email)?;
        require_non_empty("password", &request.password)?;
        let email = request.email.trim();

        let mut user = match self.find_by_email(email).await? {
            Some(user) => user,
            None => {
                tracing::warn!(email = %email, "Login attempt for unknown email");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let verified = self
            .hasher
            .verify_blocking(request.password, user.password_hash.clone())
            .await?;
        if !verified {
            tracing::warn!(user_id = %user.user_id, "Login attempt with wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }

        if !user.is_confirmed() {
            tracing::info!(user_id = %user.user_id, "Login refused, email not confirmed");
            return Err(AuthError::AccountNotConfirmed.into());
        }

        user.token_version = with_timeout(
            self.timeouts.token_version,
            "increment_token_version",
            self.store.increment_token_version(user.user_id),
        )
        .await?;

        tracing::info!(
            user_id = %user.user_id,
            token_version = user.token_version,
            "User logged in"
        );

        self.issue_pair(&user)
    }

    /// Revoke every outstanding token of the caller
    pub async fn logout(&self, principal: &Principal) -> Result<(), AppError> {
        let version = with_timeout(
            self.timeouts.token_version,
            "increment_token_version",
            self.store.increment_token_version(principal.user_id),
        )
        .await?;

        tracing::info!(
            user_id = %principal.user_id,
            token_version = version,
            "User logged out"
        );
        Ok(())
    }

    pub async fn change_password(
        &self,
        principal: &Principal,
        request: ChangePasswordRequest,
    ) -> Result<(), AppError> {
        with_timeout(
            self.timeouts.change_password,
            "change_password",
            self.replace_password(principal, request),
        )
        .await
    }

    async fn replace_password(
        &self,
        principal: &Principal,
        request: ChangePasswordRequest,
    ) -> Result<(), AppError> {
        require_non_empty("current_password", &request.current_password)?;
        if request.new_password != request.confirm_password {
            return Err(ValidationError::Mismatch(
                "new password and confirmation do not match".to_string(),
            )
            .into());
        }
        validate_password_strength(&request.new_password)?;

        let user = self
            .find_by_id(principal.user_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("user {}", principal.user_id)))?;

        let verified = self
            .hasher
            .verify_blocking(request.current_password, user.password_hash)
            .await?;
        if !verified {
            tracing::warn!(user_id = %principal.user_id, "Password change with wrong current password");
            return Err(AuthError::InvalidCredentials.into());
        }

        let password_hash = self.hasher.hash_blocking(request.new_password).await?;
        let version = self
            .store
            .update_password(principal.user_id, &password_hash)
            .await?;

        tracing::info!(
            user_id = %principal.user_id,
            token_version = version,
            "Password changed"
        );
        Ok(())
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<UserProfile, AppError> {
        self.find_by_id(user_id)
            .await?
            .map(|user| UserProfile::from(&user))
            .ok_or_else(|| DatabaseError::NotFound(format!("user {}", user_id)).into())
    }

    /// Change a user's role. The version bump kills tokens carrying the old role.
    pub async fn set_role(&self, user_id: Uuid, role: Role) -> Result<UserProfile, AppError> {
        let version = with_timeout(
            self.timeouts.token_version,
            "update_role",
            self.store.update_role(user_id, role),
        )
        .await?;

        tracing::info!(
            user_id = %user_id,
            role = %role,
            token_version = version,
            "Role updated"
        );

        self.profile(user_id).await
    }

    pub(crate) fn issue_pair(&self, user: &UserIdentity) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.issuer.issue_access_token(user)?,
            refresh_token: self
                .issuer
                .issue_refresh_token(user.user_id, user.token_version)?,
            token_type: "Bearer".to_string(),
            expires_in: self.issuer.access_token_expiry_seconds(),
            user_id: user.user_id,
        })
    }

    /// Fire-and-forget delivery. Runs detached with its own deadline so a
    /// slow or failing mail service never affects the caller.
    pub(crate) fn dispatch_email(&self, recipient: String, subject: String, html: String) {
        let sender = Arc::clone(&self.email_sender);
        let timeout = self.timeouts.email_send;

        tokio::spawn(async move {
            let result = with_timeout(
                timeout,
                "email_send",
                sender.send_email(&recipient, &subject, &html),
            )
            .await;

            match result {
                Ok(()) => tracing::info!(recipient = %recipient, "Email sent"),
                Err(e) => tracing::error!(
                    recipient = %recipient,
                    error = %e,
                    "Failed to send email"
                ),
            }
        });
    }

    pub(crate) async fn find_by_email(&self, email: &str) -> Result<Option<UserIdentity>, AppError> {
        with_timeout(self.timeouts.get_user, "get_user", self.store.find_by_email(email)).await
    }

    pub(crate) async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserIdentity>, AppError> {
        with_timeout(self.timeouts.get_user, "get_user", self.store.find_by_id(user_id)).await
    }

    async fn email_exists(&self, email: &str) -> Result<bool, AppError> {
        with_timeout(
            self.timeouts.email_exists,
            "email_exists",
            self.store.email_exists(email),
        )
        .await
    }

    async fn username_exists(&self, username: &str) -> Result<bool, AppError> {
        with_timeout(
            self.timeouts.username_exists,
            "username_exists",
            self.store.username_exists(username),
        )
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::configuration::tests::test_settings;
    use crate::error::{EmailError, ErrorKind};
    use crate::store::InMemoryCredentialStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Captures outgoing mail instead of sending it
    #[derive(Default)]
    pub(crate) struct RecordingSender {
        pub(crate) sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingSender {
        /// Token from the most recent mail sent to `recipient`
        pub(crate) fn last_token(&self, recipient: &str) -> Option<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(to, _)| to == recipient)
                .and_then(|(_, html)| {
                    let start = html.find("token=")? + "token=".len();
                    let end = html[start..].find('"')? + start;
                    Some(html[start..end].to_string())
                })
        }
    }

    #[async_trait]
    impl EmailSender for RecordingSender {
        async fn send_email(
            &self,
            recipient: &str,
            _subject: &str,
            html_content: &str,
        ) -> Result<(), AppError> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), html_content.to_string()));
            Ok(())
        }
    }

    pub(crate) struct Fixture {
        pub(crate) service: AuthService,
        pub(crate) store: InMemoryCredentialStore,
        pub(crate) mail: Arc<RecordingSender>,
    }

    pub(crate) fn fixture() -> Fixture {
        let store = InMemoryCredentialStore::new();
        let mail = Arc::new(RecordingSender::default());
        let service = AuthService::new(Arc::new(store.clone()), mail.clone(), &test_settings());
        Fixture {
            service,
            store,
            mail,
        }
    }

    /// Poll until the detached email task has run
    pub(crate) async fn wait_for_token(mail: &RecordingSender, recipient: &str) -> String {
        for _ in 0..100 {
            if let Some(token) = mail.last_token(recipient) {
                return token;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("no email sent to {}", recipient);
    }

    pub(crate) fn alice() -> RegisterRequest {
        RegisterRequest {
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            password: "Str0ng!Pass".to_string(),
        }
    }

    pub(crate) fn login_request(password: &str) -> LoginRequest {
        LoginRequest {
            email: "a@x.com".to_string(),
            password: password.to_string(),
        }
    }

    /// Registered and confirmed alice, version 1
    pub(crate) async fn confirmed_alice(fx: &Fixture) -> Uuid {
        let registered = fx.service.register(alice()).await.unwrap();
        let token = wait_for_token(&fx.mail, "a@x.com").await;
        fx.service.verify_email(&token).await.unwrap();
        registered.user_id
    }

    fn principal_for(user: &UserIdentity) -> Principal {
        Principal {
            user_id: user.user_id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            email_validation_status: user.email_validation_status,
        }
    }

    #[tokio::test]
    async fn test_register_creates_pending_user_and_sends_mail() {
        let fx = fixture();

        let registered = fx.service.register(alice()).await.unwrap();
        assert_eq!(registered.email_validation_status, EmailValidationStatus::Pending);

        let user = fx.store.find_by_id(registered.user_id).await.unwrap().unwrap();
        assert_eq!(user.token_version, 1);
        assert!(user.password_hash.starts_with("$2b$"));

        wait_for_token(&fx.mail, "a@x.com").await;
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let fx = fixture();
        fx.service.register(alice()).await.unwrap();

        let err = fx.service.register(alice()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmailAlreadyExists);

        let mut other_email = alice();
        other_email.email = "b@x.com".to_string();
        let err = fx.service.register(other_email).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UsernameAlreadyExists);
    }

    #[tokio::test]
    async fn test_register_rejects_weak_password() {
        let fx = fixture();
        let mut request = alice();
        request.password = "weakpass".to_string();

        let err = fx.service.register(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(!fx.store.email_exists("a@x.com").await.unwrap());
    }

    struct DownSender;

    #[async_trait]
    impl EmailSender for DownSender {
        async fn send_email(&self, _: &str, _: &str, _: &str) -> Result<(), AppError> {
            Err(EmailError::ServiceUnavailable("connection refused".to_string()).into())
        }
    }

    struct StalledSender;

    #[async_trait]
    impl EmailSender for StalledSender {
        async fn send_email(&self, _: &str, _: &str, _: &str) -> Result<(), AppError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    async fn register_with_sender(sender: Arc<dyn EmailSender>) {
        let store = InMemoryCredentialStore::new();
        let service = AuthService::new(Arc::new(store.clone()), sender, &test_settings());

        let registered = tokio::time::timeout(Duration::from_secs(2), service.register(alice()))
            .await
            .expect("register waited on the mail service")
            .unwrap();

        let user = store.find_by_id(registered.user_id).await.unwrap().unwrap();
        assert_eq!(user.email_validation_status, EmailValidationStatus::Pending);
    }

    #[tokio::test]
    async fn test_register_succeeds_when_mail_service_fails() {
        register_with_sender(Arc::new(DownSender)).await;
    }

    #[tokio::test]
    async fn test_register_does_not_wait_for_stalled_mail_service() {
        register_with_sender(Arc::new(StalledSender)).await;
    }

    #[tokio::test]
    async fn test_login_requires_confirmation() {
        let fx = fixture();
        fx.service.register(alice()).await.unwrap();

        let err = fx.service.login(login_request("Str0ng!Pass")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccountNotConfirmed);

        // Wrong password wins over the confirmation check
        let err = fx.service.login(login_request("Wr0ng!Pass")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_login_bumps_version_and_wrong_password_does_not() {
        let fx = fixture();
        let user_id = confirmed_alice(&fx).await;

        let pair = fx.service.login(login_request("Str0ng!Pass")).await.unwrap();
        assert_eq!(pair.user_id, user_id);
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(fx.store.token_version(user_id).await.unwrap(), Some(2));

        let err = fx.service.login(login_request("Wr0ng!Pass")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
        assert_eq!(fx.store.token_version(user_id).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_login_unknown_email_is_invalid_credentials() {
        let fx = fixture();

        let mut request = login_request("Str0ng!Pass");
        request.email = "nobody@x.com".to_string();
        let err = fx.service.login(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_change_password_revokes_tokens() {
        let fx = fixture();
        let user_id = confirmed_alice(&fx).await;
        fx.service.login(login_request("Str0ng!Pass")).await.unwrap();

        let user = fx.store.find_by_id(user_id).await.unwrap().unwrap();
        fx.service
            .change_password(
                &principal_for(&user),
                ChangePasswordRequest {
                    current_password: "Str0ng!Pass".to_string(),
                    new_password: "N3w!Passw0rd".to_string(),
                    confirm_password: "N3w!Passw0rd".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(fx.store.token_version(user_id).await.unwrap(), Some(3));
        assert!(fx.service.login(login_request("N3w!Passw0rd")).await.is_ok());
        let err = fx.service.login(login_request("Str0ng!Pass")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_change_password_checks_confirmation_and_current() {
        let fx = fixture();
        let user_id = confirmed_alice(&fx).await;
        let user = fx.store.find_by_id(user_id).await.unwrap().unwrap();

        let err = fx
            .service
            .change_password(
                &principal_for(&user),
                ChangePasswordRequest {
                    current_password: "Str0ng!Pass".to_string(),
                    new_password: "N3w!Passw0rd".to_string(),
                    confirm_password: "N3w!Passw0rX".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = fx
            .service
            .change_password(
                &principal_for(&user),
                ChangePasswordRequest {
                    current_password: "Wr0ng!Pass".to_string(),
                    new_password: "N3w!Passw0rd".to_string(),
                    confirm_password: "N3w!Passw0rd".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
        assert_eq!(fx.store.token_version(user_id).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_set_role_bumps_version() {
        let fx = fixture();
        let user_id = confirmed_alice(&fx).await;

        let profile = fx.service.set_role(user_id, Role::Admin).await.unwrap();
        assert_eq!(profile.role, Role::Admin);
        assert_eq!(fx.store.token_version(user_id).await.unwrap(), Some(2));

        let err = fx.service.set_role(Uuid::new_v4(), Role::Admin).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UserNotFound);
    }

    #[tokio::test]
    async fn test_logout_bumps_version() {
        let fx = fixture();
        let user_id = confirmed_alice(&fx).await;
        let user = fx.store.find_by_id(user_id).await.unwrap().unwrap();

        fx.service.logout(&principal_for(&user)).await.unwrap();
        assert_eq!(fx.store.token_version(user_id).await.unwrap(), Some(2));
    }
}
