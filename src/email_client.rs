use async_trait::async_trait;
use serde::Serialize;

use crate::error::{AppError, EmailError};
use crate::validators::is_valid_email;

/// Outbound email collaborator.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        html_content: &str,
        text_content: &str,
    ) -> Result<(), AppError>;
}

#[derive(Clone, Debug)]
pub struct SenderEmail(String);

impl SenderEmail {
    pub fn parse(s: String) -> Result<Self, AppError> {
        let email = is_valid_email(&s).map_err(|e| EmailError::InvalidRecipient(e.to_string()))?;
        Ok(Self(email))
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

/// HTTP client for the transactional email API.
#[derive(Clone)]
pub struct EmailClient {
    http_client: reqwest::Client,
    base_url: String,
    sender: SenderEmail,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html_body: &'a str,
    text_body: &'a str,
}

impl EmailClient {
    pub fn new(base_url: String, sender: SenderEmail, timeout: std::time::Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            base_url,
            sender,
        }
    }
}

#[async_trait]
impl Mailer for EmailClient {
    async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        html_content: &str,
        text_content: &str,
    ) -> Result<(), AppError> {
        let url = format!("{}/email", self.base_url);
        let request = SendEmailRequest {
            from: self.sender.inner(),
            to: recipient,
            subject,
            html_body: html_content,
            text_body: text_content,
        };

        self.http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to reach email service");
                AppError::from(e)
            })?
            .error_for_status()
            .map_err(|e| {
                tracing::error!(error = %e, "Email service returned error");
                AppError::from(e)
            })?;

        Ok(())
    }
}

/// Subject, HTML and plain-text bodies of the password recovery message.
pub fn password_reset_message(reset_url: &str, token: &str, ttl_minutes: i64) -> (String, String, String) {
    let link = format!("{}?token={}", reset_url, token);
    let subject = "Password recovery".to_string();
    let html = format!(
        "<p>A password reset was requested for your archive account.</p>\
         <p><a href=\"{link}\">Choose a new password</a>. The link expires in {ttl_minutes} minutes.</p>\
         <p>If you did not request this, you can ignore this message.</p>"
    );
    let text = format!(
        "A password reset was requested for your archive account.\n\
         Choose a new password: {link}\n\
         The link expires in {ttl_minutes} minutes. If you did not request this, ignore this message."
    );
    (subject, html, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: String) -> EmailClient {
        EmailClient::new(
            base_url,
            SenderEmail::parse("archive@municipality.example".to_string()).unwrap(),
            std::time::Duration::from_millis(200),
        )
    }

    #[test]
    fn test_sender_parse_rejects_invalid_email() {
        assert!(SenderEmail::parse("invalid-email".to_string()).is_err());
        assert!(SenderEmail::parse("archive@municipality.example".to_string()).is_ok());
    }

    #[test]
    fn test_reset_message_contains_link() {
        let (_, html, text) = password_reset_message("https://archive.example/reset", "abc", 60);

        assert!(html.contains("https://archive.example/reset?token=abc"));
        assert!(text.contains("https://archive.example/reset?token=abc"));
        assert!(text.contains("60 minutes"));
    }

    #[tokio::test]
    async fn test_send_email_posts_to_email_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/email"))
            .and(header("Content-Type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(server.uri())
            .send_email("clerk@archive.example", "subject", "<p>x</p>", "x")
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_send_email_fails_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = client(server.uri())
            .send_email("clerk@archive.example", "subject", "<p>x</p>", "x")
            .await;

        assert!(matches!(result, Err(AppError::Email(_))));
    }
}
