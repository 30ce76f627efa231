use async_trait::async_trait;
use tracing::{debug, error, instrument, warn};

use super::UnitContext;
use crate::database::JobStatus;
use crate::executor::WorkUnit;

/// Delivers one queued email job
pub struct EmailWorkUnit {
    email_job_id: i64,
    ctx: UnitContext,
}

impl EmailWorkUnit {
    pub fn new(email_job_id: i64, ctx: UnitContext) -> Self {
        Self { email_job_id, ctx }
    }

    async fn start(&self) -> anyhow::Result<()> {
        let db = &self.ctx.db;
        let Some(email) = db.get_email_job(self.email_job_id).await? else {
            debug!("Email job {} already handled", self.email_job_id);
            return Ok(());
        };
        if email.status != JobStatus::Submitted {
            return Ok(());
        }

        match self.ctx.mailer.send(&email).await {
            Ok(()) => db.delete_email_job(email.id).await?,
            Err(e) => {
                warn!("Email job {} failed: {:#}", email.id, e);
                db.mark_email_job_failed(email.id).await?;
                self.ctx
                    .record_error(
                        &format!("Email job {} failed", email.id),
                        Some(&format!("{:#}", e)),
                    )
                    .await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl WorkUnit for EmailWorkUnit {
    fn unique_key(&self) -> String {
        format!("email_job_{}", self.email_job_id)
    }

    fn identity(&self) -> String {
        self.unique_key()
    }

    #[instrument(skip(self), fields(job = self.email_job_id))]
    async fn run(&self) {
        if let Err(e) = self.start().await {
            error!("Email job {} crashed: {:#}", self.email_job_id, e);
        }
    }
}
