#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use todo_auth::configuration::{get_configuration, Settings};
use todo_auth::email_client::EmailSender;
use todo_auth::error::{AppError, EmailError};
use todo_auth::models::{NewUser, Role, UserIdentity};
use todo_auth::startup::run;
use todo_auth::store::{CredentialStore, InMemoryCredentialStore};
use uuid::Uuid;

pub const PASSWORD: &str = "Str0ng!Pass";

/// Email sender that keeps every message in memory
#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingEmailSender {
    /// Tokens from the links mailed to `recipient`, oldest first
    pub fn tokens_for(&self, recipient: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == recipient)
            .filter_map(|(_, html)| {
                let start = html.find("token=")? + "token=".len();
                let end = html[start..].find('"')? + start;
                Some(html[start..end].to_string())
            })
            .collect()
    }

    /// Path and query of the newest link mailed to `recipient`
    pub fn last_link_path(&self, recipient: &str) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let (_, html) = sent.iter().rev().find(|(to, _)| to == recipient)?;
        let start = html.find("href=\"")? + "href=\"".len();
        let end = html[start..].find('"')? + start;
        let link = &html[start..end];
        let path = link.find("/auth/")?;
        Some(link[path..].to_string())
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
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

/// Email sender whose service is down
pub struct FailingEmailSender;

#[async_trait]
impl EmailSender for FailingEmailSender {
    async fn send_email(&self, _: &str, _: &str, _: &str) -> Result<(), AppError> {
        Err(EmailError::ServiceUnavailable("connection refused".to_string()).into())
    }
}

/// Email sender that never answers within any sane deadline
pub struct HangingEmailSender;

#[async_trait]
impl EmailSender for HangingEmailSender {
    async fn send_email(&self, _: &str, _: &str, _: &str) -> Result<(), AppError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

/// In-memory store whose `token_version` lookup takes `delay`
#[derive(Clone)]
pub struct SlowTokenVersionStore {
    pub inner: InMemoryCredentialStore,
    pub delay: Duration,
}

#[async_trait]
impl CredentialStore for SlowTokenVersionStore {
    async fn email_exists(&self, email: &str) -> Result<bool, AppError> {
        self.inner.email_exists(email).await
    }

    async fn username_exists(&self, username: &str) -> Result<bool, AppError> {
        self.inner.username_exists(username).await
    }

    async fn create_user(&self, user: NewUser) -> Result<UserIdentity, AppError> {
        self.inner.create_user(user).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserIdentity>, AppError> {
        self.inner.find_by_email(email).await
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserIdentity>, AppError> {
        self.inner.find_by_id(user_id).await
    }

    async fn token_version(&self, user_id: Uuid) -> Result<Option<i32>, AppError> {
        tokio::time::sleep(self.delay).await;
        self.inner.token_version(user_id).await
    }

    async fn increment_token_version(&self, user_id: Uuid) -> Result<i32, AppError> {
        self.inner.increment_token_version(user_id).await
    }

    async fn rotate_token_version(
        &self,
        user_id: Uuid,
        expected: i32,
    ) -> Result<Option<i32>, AppError> {
        self.inner.rotate_token_version(user_id, expected).await
    }

    async fn verification_token_issued_at(
        &self,
        token_hash: &str,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        self.inner.verification_token_issued_at(token_hash).await
    }

    async fn confirm_email(&self, token_hash: &str, email: &str) -> Result<bool, AppError> {
        self.inner.confirm_email(token_hash, email).await
    }

    async fn store_recovery_token(
        &self,
        email: &str,
        token_hash: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        self.inner
            .store_recovery_token(email, token_hash, issued_at)
            .await
    }

    async fn recovery_token_issued_at(
        &self,
        token_hash: &str,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        self.inner.recovery_token_issued_at(token_hash).await
    }

    async fn reset_password(
        &self,
        token_hash: &str,
        email: &str,
        new_password_hash: &str,
    ) -> Result<Option<i32>, AppError> {
        self.inner
            .reset_password(token_hash, email, new_password_hash)
            .await
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        new_password_hash: &str,
    ) -> Result<i32, AppError> {
        self.inner.update_password(user_id, new_password_hash).await
    }

    async fn update_role(&self, user_id: Uuid, role: Role) -> Result<i32, AppError> {
        self.inner.update_role(user_id, role).await
    }
}

pub struct TestApp {
    pub address: String,
    pub store: InMemoryCredentialStore,
    pub email_sender: Arc<RecordingEmailSender>,
    pub client: reqwest::Client,
}

/// Configuration from `configuration.yaml` with a cheap bcrypt cost
pub fn test_configuration() -> Settings {
    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.application.password_hash_cost = 4;
    configuration
}

/// Start the server on a random port, returning its base URL
pub fn spawn_server(
    store: Arc<dyn CredentialStore>,
    email_sender: Arc<dyn EmailSender>,
    configuration: Settings,
) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let server = run(listener, store, email_sender, configuration).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    format!("http://127.0.0.1:{}", port)
}

pub fn spawn_app() -> TestApp {
    let store = InMemoryCredentialStore::new();
    spawn_app_with(store.clone(), Arc::new(store), test_configuration())
}

/// Serve `served` while keeping `store` for direct inspection. `served`
/// usually wraps `store`.
pub fn spawn_app_with(
    store: InMemoryCredentialStore,
    served: Arc<dyn CredentialStore>,
    configuration: Settings,
) -> TestApp {
    let email_sender = Arc::new(RecordingEmailSender::default());
    let address = spawn_server(served, email_sender.clone(), configuration);

    TestApp {
        address,
        store,
        email_sender,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get_authed(&self, path: &str, access_token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(access_token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn register(&self, username: &str, email: &str) -> reqwest::Response {
        self.post_json(
            "/auth/register",
            &json!({"username": username, "email": email, "password": PASSWORD}),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.post_json("/auth/login", &json!({"email": email, "password": password}))
            .await
    }

    /// Wait until `count` mails have reached `recipient`, return the newest token
    pub async fn wait_for_token(&self, recipient: &str, count: usize) -> String {
        for _ in 0..100 {
            let tokens = self.email_sender.tokens_for(recipient);
            if tokens.len() >= count {
                return tokens[count - 1].clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} email(s) for {}", count, recipient);
    }

    pub async fn verify_email(&self, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(&format!(
                "/auth/verify-email?token={}",
                urlencoding::encode(token)
            )))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Register, confirm and log in; returns the login `data` object
    pub async fn signed_in(&self, username: &str, email: &str) -> Value {
        assert_eq!(self.register(username, email).await.status().as_u16(), 201);
        let token = self.wait_for_token(email, 1).await;
        assert_eq!(self.verify_email(&token).await.status().as_u16(), 200);

        let response = self.login(email, PASSWORD).await;
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        body["data"].clone()
    }
}

pub fn token(data: &Value, name: &str) -> String {
    data[name].as_str().expect("token missing").to_string()
}
