use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::MailConfig;
use crate::errors::{AppError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<()>;
}

/// Delivers mail through a transactional email HTTP API.
pub struct HttpMailer {
    config: MailConfig,
    client: Client,
}

impl HttpMailer {
    pub fn new(config: MailConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "from": self.config.from,
                "to": email.to,
                "subject": email.subject,
                "text": email.text,
                "html": email.html,
            }))
            .send()
            .await
            .map_err(|e| AppError::external_api(format!("Mail API error: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::external_api(format!(
                "Mail sending failed with status: {}",
                response.status()
            )))
        }
    }
}

/// Used when no mail provider is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        tracing::info!(to = %email.to, subject = %email.subject, "email (log only)");
        Ok(())
    }
}

/// Post-commit notification queue. Enqueueing never fails the caller;
/// a background task drains the queue and only logs delivery errors.
#[derive(Clone)]
pub struct Outbox {
    sender: mpsc::UnboundedSender<Email>,
}

impl Outbox {
    pub fn start(mailer: Arc<dyn Mailer>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Email>();

        tokio::spawn(async move {
            while let Some(email) = receiver.recv().await {
                if let Err(e) = mailer.send(&email).await {
                    tracing::error!(to = %email.to, subject = %email.subject, error = %e, "failed to send email");
                }
            }
        });

        Outbox { sender }
    }

    pub fn enqueue(&self, email: Email) {
        if let Err(e) = self.sender.send(email) {
            tracing::error!(to = %e.0.to, "notification outbox is closed; email dropped");
        }
    }
}
