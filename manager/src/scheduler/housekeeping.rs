//! Daily retention pass over the system log and the history tables.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, instrument, warn};

use crate::database::{Database, PruneReport};

#[derive(Clone)]
pub struct Housekeeper {
    db: Arc<Database>,
    session_log_root: PathBuf,
}

impl Housekeeper {
    pub fn new(db: Arc<Database>, session_log_root: PathBuf) -> Self {
        Self {
            db,
            session_log_root,
        }
    }

    /// Trims the system log, prunes history beyond the per-host limits and
    /// removes the session log directories of the pruned rows.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<PruneReport> {
        let options = self.db.get_system_option().await?;

        let system_logs_deleted = self.db.trim_system_logs(options.total_system_logs).await?;
        let mut report = self
            .db
            .prune_history(
                options.inventory_history_per_host,
                options.install_history_per_host,
            )
            .await?;
        report.system_logs_deleted = system_logs_deleted;

        for relative in &report.session_logs {
            remove_session_log(&self.session_log_root, relative).await;
        }

        info!(
            "Housekeeping: {} system logs, {} inventory and {} install history rows removed",
            report.system_logs_deleted, report.inventory_history_deleted, report.install_history_deleted
        );
        Ok(report)
    }
}

async fn remove_session_log(root: &Path, relative: &str) {
    if relative.contains("..") {
        warn!("Refusing to remove session log outside the root: {}", relative);
        return;
    }
    let dir = root.join(relative);
    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => debug!("Removed session log {:?}", dir),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove session log {:?}: {}", dir, e),
    }
}

/// Cron wrapper running the housekeeper on a 6-field schedule
pub struct HousekeepingScheduler {
    scheduler: JobScheduler,
    housekeeper: Housekeeper,
}

impl HousekeepingScheduler {
    pub async fn new(housekeeper: Housekeeper) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("Failed to create JobScheduler: {}", e))?;
        Ok(Self {
            scheduler,
            housekeeper,
        })
    }

    pub async fn start(&self, schedule: &str) -> Result<()> {
        validate_6_field_cron(schedule)?;
        let housekeeper = self.housekeeper.clone();

        let job = Job::new_async(schedule, move |_uuid, _scheduler| {
            let housekeeper = housekeeper.clone();
            Box::pin(async move {
                if let Err(e) = housekeeper.run().await {
                    error!("Scheduled housekeeping failed: {:#}", e);
                }
            })
        })
        .map_err(|e| anyhow!("Failed to create housekeeping job for '{}': {}", schedule, e))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| anyhow!("Failed to add housekeeping job: {}", e))?;
        self.scheduler
            .start()
            .await
            .map_err(|e| anyhow!("Failed to start housekeeping scheduler: {}", e))?;
        info!("Housekeeping scheduled at '{}'", schedule);
        Ok(())
    }
}

/// tokio-cron-scheduler wants `sec min hour day month dow`
pub fn validate_6_field_cron(schedule: &str) -> Result<()> {
    let parts: Vec<&str> = schedule.split_whitespace().collect();
    if parts.len() != 6 {
        return Err(anyhow!(
            "Cron schedule needs 6 fields (second minute hour day month dayofweek), got {}: '{}'",
            parts.len(),
            schedule
        ));
    }
    Ok(())
}
