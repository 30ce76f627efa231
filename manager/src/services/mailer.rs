//! Mail delivery for queued email jobs.
//!
//! Rendering and SMTP live outside the manager: messages are posted as JSON
//! to a relay webhook that does the actual delivery.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::database::EmailJob;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// A disabled sender leaves email jobs queued
    fn is_enabled(&self) -> bool;

    async fn send(&self, email: &EmailJob) -> Result<()>;
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailPayload {
    pub timestamp: DateTime<Utc>,
    pub recipients: Vec<String>,
    pub subject: String,
    pub message: String,
    pub created_by: String,
}

impl EmailPayload {
    pub fn from_job(email: &EmailJob) -> Self {
        Self {
            timestamp: Utc::now(),
            recipients: email
                .recipients
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect(),
            subject: email.subject.clone(),
            message: email.message.clone(),
            created_by: email.created_by.clone(),
        }
    }
}

#[derive(Clone)]
pub struct WebhookEmailSender {
    webhook_url: String,
    client: Client,
}

impl WebhookEmailSender {
    pub fn new(webhook_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .context("Failed to create HTTP client for the mail webhook")?;
        Ok(Self {
            webhook_url,
            client,
        })
    }
}

#[async_trait]
impl EmailSender for WebhookEmailSender {
    fn is_enabled(&self) -> bool {
        !self.webhook_url.is_empty()
    }

    async fn send(&self, email: &EmailJob) -> Result<()> {
        if !self.is_enabled() {
            return Err(anyhow!("No mail webhook configured"));
        }

        let payload = EmailPayload::from_job(email);
        if payload.recipients.is_empty() {
            return Err(anyhow!("Email job {} has no recipients", email.id));
        }

        let response = timeout(
            WEBHOOK_TIMEOUT,
            self.client.post(&self.webhook_url).json(&payload).send(),
        )
        .await
        .map_err(|_| anyhow!("Mail webhook timeout for email job {}", email.id))?
        .with_context(|| format!("Failed to post email job {}", email.id))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Mail webhook returned status {} for email job {}",
                response.status(),
                email.id
            ));
        }

        info!("Email job {} handed to the mail relay", email.id);
        debug!("Subject: {}", payload.subject);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::JobStatus;

    #[test]
    fn payload_splits_recipients() {
        let job = EmailJob {
            id: 1,
            recipients: "a@example.com, b@example.com,".to_string(),
            subject: "s".to_string(),
            message: "m".to_string(),
            status: JobStatus::Submitted,
            status_time: Utc::now(),
            created_by: "admin".to_string(),
        };
        let payload = EmailPayload::from_job(&job);
        assert_eq!(payload.recipients, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn empty_url_disables_delivery() {
        let sender = WebhookEmailSender::new(String::new()).unwrap();
        assert!(!sender.is_enabled());
    }
}
