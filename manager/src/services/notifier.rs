//! Queues an email job when an install job reaches a terminal state.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::database::{Database, InstallJobHistory};

#[derive(Clone)]
pub struct Notifier {
    db: Arc<Database>,
}

impl Notifier {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Returns the queued email job id, or `None` when notifications are off
    /// or the creator has no address on file.
    #[instrument(skip(self, history), fields(job = history.install_job_id))]
    pub async fn install_job_finished(&self, history: &InstallJobHistory) -> Result<Option<i64>> {
        let options = self.db.get_system_option().await?;
        if !options.enable_email_notify {
            return Ok(None);
        }

        let recipient = match self.db.get_user(&history.created_by).await? {
            Some(user) => user.email.filter(|e| !e.is_empty()),
            None => None,
        };
        let Some(recipient) = recipient else {
            debug!("No email address for {}", history.created_by);
            return Ok(None);
        };

        let hostname = self
            .db
            .get_host(history.host_id)
            .await?
            .map(|h| h.hostname)
            .unwrap_or_else(|| format!("host {}", history.host_id));

        let subject = format!(
            "Install job {} on {}: {}",
            history.install_action, hostname, history.status
        );
        let message = render_message(history, &hostname, &options.base_url);

        let id = self
            .db
            .create_email_job(&recipient, &subject, &message, &history.created_by)
            .await?;
        Ok(Some(id))
    }
}

pub fn render_message(history: &InstallJobHistory, hostname: &str, base_url: &str) -> String {
    let start = history
        .start_time
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());
    let session_log = match &history.session_log {
        Some(path) => format!("{}/session_log/{}", base_url.trim_end_matches('/'), path),
        None => "-".to_string(),
    };

    let mut message = format!(
        "Host: {}\nStatus: {}\nScheduled time: {}\nStart time: {}\nInstall action: {}\nSession log: {}\n",
        hostname,
        history.status,
        history.scheduled_time.to_rfc3339(),
        start,
        history.install_action,
        session_log,
    );
    if let Some(trace) = &history.trace {
        message.push_str(&format!("Reason: {}\n", trace));
    }
    if !history.packages.is_empty() {
        message.push_str("\nSoftware packages:\n");
        for package in &history.packages {
            message.push_str(&format!("  {}\n", package));
        }
    }
    message
}
