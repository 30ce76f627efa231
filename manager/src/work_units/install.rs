use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, instrument, warn};

use super::{install_log_path, UnitContext};
use crate::database::{InstallJob, JobStatus};
use crate::executor::WorkUnit;
use crate::handlers::{failure_reason, run_action, InstallContext};
use crate::transport::SessionLog;

/// Runs one install job. Keyed by host so a host never runs two at once.
pub struct InstallWorkUnit {
    host_id: i64,
    job_id: i64,
    ctx: UnitContext,
}

impl InstallWorkUnit {
    pub fn new(host_id: i64, job_id: i64, ctx: UnitContext) -> Self {
        Self {
            host_id,
            job_id,
            ctx,
        }
    }

    /// Archives a job that never reached the device and notifies its creator
    async fn fail_early(&self, job: &InstallJob, reason: &str) {
        warn!("Install job {} failed before start: {}", job.id, reason);
        match self
            .ctx
            .db
            .archive_install_job(job.id, JobStatus::Failed, -1, Some(reason))
            .await
        {
            Ok(history) => {
                if let Err(e) = self.ctx.notifier.install_job_finished(&history).await {
                    warn!("Notification for install job {} failed: {:#}", job.id, e);
                }
            }
            Err(e) => {
                self.ctx
                    .record_error(
                        &format!("Could not archive install job {}", job.id),
                        Some(&format!("{:#}", e)),
                    )
                    .await
            }
        }
    }

    async fn start(&self) -> anyhow::Result<()> {
        let db = &self.ctx.db;

        let Some(job) = db.get_install_job(self.job_id).await? else {
            info!("Install job {} no longer exists", self.job_id);
            return Ok(());
        };
        if job.status != JobStatus::Submitted {
            info!("Install job {} is {}, not starting it", job.id, job.status);
            return Ok(());
        }
        // The kill switch is read again here: a job queued before it was
        // flipped stays Submitted
        if !db.get_system_option().await?.can_install {
            info!("Installs are disabled, install job {} stays submitted", job.id);
            return Ok(());
        }

        let Some(host) = db.get_host(job.host_id).await? else {
            self.fail_early(&job, "StoreError: host not found").await;
            return Ok(());
        };

        let relative = install_log_path(&host.hostname, job.install_action, job.id);
        let session_log = match SessionLog::create(&self.ctx.env.session_log_root, &relative).await {
            Ok(log) => log,
            Err(e) => {
                self.fail_early(&job, &format!("StoreError: {:#}", e)).await;
                return Ok(());
            }
        };

        db.mark_install_job_processing(job.id, Utc::now(), &relative)
            .await?;
        let operation_id = db.linked_operation_id(&job).await?;
        let action = job.install_action;
        info!(
            "Starting {} on {} (install job {}, operation id {})",
            action, host.hostname, job.id, operation_id
        );

        let platform = self.ctx.platforms.get(&host.platform);
        let mut ctx = InstallContext::new(host, Some(job), db.clone(), session_log);
        ctx.operation_id = operation_id;

        let result = run_action(platform.as_ref(), &self.ctx.env, &mut ctx, action).await;

        let (status, trace) = match &result {
            Ok(()) if ctx.success => (JobStatus::Completed, None),
            Ok(()) => (JobStatus::Failed, Some("DeviceOperationFailed: unknown".to_string())),
            Err(e) => (JobStatus::Failed, Some(failure_reason(e))),
        };

        let history = db
            .archive_install_job(self.job_id, status, ctx.operation_id, trace.as_deref())
            .await?;

        if let Some(trace) = &trace {
            self.ctx
                .record_error(
                    &format!("{} on {} failed", action, ctx.host.hostname),
                    Some(trace),
                )
                .await;
        }

        if let Err(e) = self.ctx.notifier.install_job_finished(&history).await {
            warn!("Notification for install job {} failed: {:#}", self.job_id, e);
        }
        Ok(())
    }
}

#[async_trait]
impl WorkUnit for InstallWorkUnit {
    fn unique_key(&self) -> String {
        self.host_id.to_string()
    }

    fn identity(&self) -> String {
        format!("install_job_{}", self.job_id)
    }

    #[instrument(skip(self), fields(job = self.job_id, host = self.host_id))]
    async fn run(&self) {
        if let Err(e) = self.start().await {
            error!("Install job {} crashed: {:#}", self.job_id, e);
            let trace = format!("StoreError: {:#}", e);
            self.ctx
                .record_error(&format!("Install job {} crashed", self.job_id), Some(&trace))
                .await;
            // Leave a history row behind if the job row is still there
            if let Ok(Some(job)) = self.ctx.db.get_install_job(self.job_id).await {
                if !job.status.is_terminal() {
                    if let Err(e) = self
                        .ctx
                        .db
                        .archive_install_job(self.job_id, JobStatus::Failed, -1, Some(&trace))
                        .await
                    {
                        error!("Could not archive crashed install job {}: {:#}", self.job_id, e);
                    }
                }
            }
        }
    }
}
