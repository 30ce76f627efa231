use async_trait::async_trait;
use tracing::{error, info, instrument, warn};

use super::{inventory_log_path, UnitContext};
use crate::database::JobStatus;
use crate::executor::WorkUnit;
use crate::handlers::{failure_reason, run_inventory, InstallContext};
use crate::transport::SessionLog;

/// Refreshes the package set of one host
pub struct InventoryWorkUnit {
    host_id: i64,
    ctx: UnitContext,
}

impl InventoryWorkUnit {
    pub fn new(host_id: i64, ctx: UnitContext) -> Self {
        Self { host_id, ctx }
    }

    async fn start(&self) -> anyhow::Result<()> {
        let db = &self.ctx.db;
        let Some(host) = db.get_host(self.host_id).await? else {
            info!("Host {} was deleted before its inventory ran", self.host_id);
            return Ok(());
        };

        let relative = inventory_log_path(&host.hostname);
        let session_log = match SessionLog::create(&self.ctx.env.session_log_root, &relative).await {
            Ok(log) => log,
            Err(e) => {
                let trace = format!("StoreError: {:#}", e);
                db.archive_inventory_job(self.host_id, JobStatus::Failed, Some(&trace))
                    .await?;
                return Ok(());
            }
        };
        db.set_inventory_processing(self.host_id, &relative).await?;

        let platform = self.ctx.platforms.get(&host.platform);
        let hostname = host.hostname.clone();
        let mut ctx = InstallContext::new(host, None, db.clone(), session_log);

        match run_inventory(platform.as_ref(), &self.ctx.env, &mut ctx).await {
            Ok(()) => {
                db.archive_inventory_job(self.host_id, JobStatus::Completed, None)
                    .await?;
                info!("Inventory of {} completed", hostname);
            }
            Err(e) => {
                let trace = failure_reason(&e);
                warn!("Inventory of {} failed: {}", hostname, trace);
                db.archive_inventory_job(self.host_id, JobStatus::Failed, Some(&trace))
                    .await?;
                self.ctx
                    .record_error(&format!("Inventory of {} failed", hostname), Some(&trace))
                    .await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl WorkUnit for InventoryWorkUnit {
    fn unique_key(&self) -> String {
        self.host_id.to_string()
    }

    fn identity(&self) -> String {
        format!("inventory_{}", self.host_id)
    }

    #[instrument(skip(self), fields(host = self.host_id))]
    async fn run(&self) {
        if let Err(e) = self.start().await {
            error!("Inventory of host {} crashed: {:#}", self.host_id, e);
            let trace = format!("StoreError: {:#}", e);
            self.ctx
                .record_error(
                    &format!("Inventory of host {} crashed", self.host_id),
                    Some(&trace),
                )
                .await;
            // Clears pending_submit so the host is picked up again later
            if let Err(e) = self
                .ctx
                .db
                .archive_inventory_job(self.host_id, JobStatus::Failed, Some(&trace))
                .await
            {
                error!("Could not archive inventory of host {}: {:#}", self.host_id, e);
            }
        }
    }
}
