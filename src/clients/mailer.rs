use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum MailerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("mail service returned status {0}")]
    Status(u16),
}

/// Transactional email delivery. The trait is structured per message kind
/// so templates stay inside the implementation.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_otp(&self, to: &str, otp: &str) -> Result<(), MailerError>;

    async fn send_welcome(&self, to: &str, name: &str) -> Result<(), MailerError>;

    async fn send_password_reset(&self, to: &str, reset_token: &str) -> Result<(), MailerError>;
}

#[derive(Debug, Serialize)]
struct ResendEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: String,
}

/// Email delivery through the Resend HTTP API.
#[derive(Debug, Clone)]
pub struct ResendMailer {
    http: reqwest::Client,
    api_key: String,
    from: String,
}

impl ResendMailer {
    const ENDPOINT: &'static str = "https://api.resend.com/emails";

    pub fn new(api_key: impl Into<String>, from: impl Into<String>) -> Result<Self, MailerError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| MailerError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            from: from.into(),
        })
    }

    async fn send(&self, to: &str, subject: &str, html: String) -> Result<(), MailerError> {
        let payload = ResendEmail {
            from: &self.from,
            to: [to],
            subject,
            html,
        };

        let response = self
            .http
            .post(Self::ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| MailerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MailerError::Status(status.as_u16()));
        }

        debug!(to, subject, "Email dispatched");
        Ok(())
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send_otp(&self, to: &str, otp: &str) -> Result<(), MailerError> {
        let html = format!(
            "<p>Your MarkME verification code is <strong>{otp}</strong>. \
             It expires in 10 minutes.</p>"
        );
        self.send(to, "Your MarkME verification code", html).await
    }

    async fn send_welcome(&self, to: &str, name: &str) -> Result<(), MailerError> {
        let html = format!("<p>Welcome to MarkME, {name}! Your school is ready to go.</p>");
        self.send(to, "Welcome to MarkME", html).await
    }

    async fn send_password_reset(&self, to: &str, reset_token: &str) -> Result<(), MailerError> {
        let html = format!(
            "<p>Use this token to reset your MarkME password: \
             <strong>{reset_token}</strong>. It expires in 30 minutes.</p>"
        );
        self.send(to, "Reset your MarkME password", html).await
    }
}

/// Captures outgoing mail for integration tests instead of sending it.
#[cfg(test)]
#[derive(Default)]
pub struct MockMailer {
    sent: std::sync::Mutex<Vec<SentEmail>>,
}

#[cfg(test)]
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub kind: &'static str,
    /// OTP or reset token carried by the message, when applicable.
    pub token: Option<String>,
}

#[cfg(test)]
impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }

    /// The most recent OTP delivered to `to`, if any.
    pub fn last_otp_for(&self, to: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|mail| mail.kind == "otp" && mail.to == to)
            .and_then(|mail| mail.token.clone())
    }

    /// The most recent reset token delivered to `to`, if any.
    pub fn last_reset_token_for(&self, to: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|mail| mail.kind == "reset" && mail.to == to)
            .and_then(|mail| mail.token.clone())
    }
}

#[cfg(test)]
#[async_trait]
impl Mailer for MockMailer {
    async fn send_otp(&self, to: &str, otp: &str) -> Result<(), MailerError> {
        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            kind: "otp",
            token: Some(otp.to_string()),
        });
        Ok(())
    }

    async fn send_welcome(&self, to: &str, _name: &str) -> Result<(), MailerError> {
        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            kind: "welcome",
            token: None,
        });
        Ok(())
    }

    async fn send_password_reset(&self, to: &str, reset_token: &str) -> Result<(), MailerError> {
        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            kind: "reset",
            token: Some(reset_token.to_string()),
        });
        Ok(())
    }
}
