use async_trait::async_trait;
use serde::Serialize;

use crate::error::{AppError, EmailError};
use crate::validators::is_valid_email;

/// Outbound mail seam. Production posts to the mail API; tests record.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        html_content: &str,
    ) -> Result<(), AppError>;
}

#[derive(Clone, Debug)]
pub struct SenderEmail(String);

impl SenderEmail {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        let email = is_valid_email(s)?;
        Ok(Self(email))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    #[serde(rename = "Subject")]
    subject: &'a str,
    #[serde(rename = "Html")]
    html: &'a str,
}

#[derive(Clone)]
pub struct EmailClient {
    http_client: reqwest::Client,
    base_url: String,
    sender: SenderEmail,
}

impl EmailClient {
    pub fn new(base_url: String, sender: SenderEmail, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            base_url,
            sender,
        }
    }
}

#[async_trait]
impl EmailSender for EmailClient {
    async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        html_content: &str,
    ) -> Result<(), AppError> {
        let recipient = is_valid_email(recipient)
            .map_err(|_| EmailError::InvalidRecipient(recipient.to_string()))?;

        let url = format!("{}/email", self.base_url);
        let request = SendEmailRequest {
            from: self.sender.as_str(),
            to: &recipient,
            subject,
            html: html_content,
        };

        self.http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send email: {}", e);
                EmailError::ServiceUnavailable(e.to_string())
            })?
            .error_for_status()
            .map_err(|e| {
                tracing::error!("Email service returned error: {}", e);
                EmailError::SendFailed(e.to_string())
            })?;

        Ok(())
    }
}

pub fn verification_email(base_url: &str, token: &str) -> (String, String) {
    let link = format!("{}/auth/verify-email?token={}", base_url, token);
    (
        "Confirm your email address".to_string(),
        format!(
            "<p>Welcome!</p><p>Click <a href=\"{}\">here</a> to confirm your email address.</p>",
            link
        ),
    )
}

pub fn recovery_email(base_url: &str, token: &str) -> (String, String) {
    let link = format!("{}/auth/reset-password?token={}", base_url, token);
    (
        "Reset your password".to_string(),
        format!(
            "<p>A password reset was requested for your account.</p>\
             <p>Click <a href=\"{}\">here</a> to choose a new password. \
             If you did not ask for this, ignore this email.</p>",
            link
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_email_parse_valid_email() {
        let sender = SenderEmail::parse("noreply@example.com");
        assert!(sender.is_ok());
    }

    #[test]
    fn test_sender_email_parse_invalid_email() {
        assert!(SenderEmail::parse("invalid-email").is_err());
    }

    #[test]
    fn test_links_carry_token() {
        let (_, html) = verification_email("http://localhost:8000", "abc");
        assert!(html.contains("http://localhost:8000/auth/verify-email?token=abc"));

        let (subject, html) = recovery_email("http://localhost:8000", "xyz");
        assert_eq!(subject, "Reset your password");
        assert!(html.contains("/auth/reset-password?token=xyz"));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_email_error() {
        let client = EmailClient::new(
            "http://127.0.0.1:1".to_string(),
            SenderEmail::parse("noreply@example.com").unwrap(),
            reqwest::Client::new(),
        );

        let err = client
            .send_email("a@x.com", "subject", "<p>body</p>")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Email(_)));
    }
}
