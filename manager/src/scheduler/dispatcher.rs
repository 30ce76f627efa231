//! Dispatcher: turns due rows of the job store into work units.
//!
//! Each tick reads the system options afresh, then runs the install,
//! inventory and email passes. A failing pass is logged and retried on the
//! next tick.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};

use super::{Housekeeper, Pools};
use crate::database::{Database, SystemOption};
use crate::work_units::{EmailWorkUnit, InstallWorkUnit, InventoryWorkUnit, UnitContext};

/// Counts of work units handed to the pools in one tick
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub install_submitted: usize,
    pub inventory_submitted: usize,
    pub email_submitted: usize,
}

pub struct Dispatcher {
    db: Arc<Database>,
    pools: Arc<Pools>,
    units: UnitContext,
    housekeeper: Housekeeper,
    timezone: Tz,
    interval: Duration,
    last_inventory_mark: Mutex<Option<NaiveDate>>,
}

impl Dispatcher {
    pub fn new(
        units: UnitContext,
        pools: Arc<Pools>,
        housekeeper: Housekeeper,
        timezone: Tz,
        interval: Duration,
    ) -> Self {
        Self {
            db: units.db.clone(),
            pools,
            units,
            housekeeper,
            timezone,
            interval,
            last_inventory_mark: Mutex::new(None),
        }
    }

    pub fn pools(&self) -> &Arc<Pools> {
        &self.pools
    }

    /// Submits every due, unblocked install job, earliest scheduled first
    pub async fn install_tick(&self, options: &SystemOption, now: DateTime<Utc>) -> Result<usize> {
        if !options.can_install {
            debug!("Installs disabled, not dispatching install jobs");
            return Ok(0);
        }

        let mut submitted = 0;
        for job in self.db.due_install_jobs(now).await? {
            if let Some(dependency) = job.dependency.filter(|d| *d != 0) {
                if !self.db.dependency_completed(dependency).await? {
                    debug!("Install job {} waits for install job {}", job.id, dependency);
                    continue;
                }
            }
            if self.db.host_has_processing_job(job.host_id).await? {
                debug!("Host {} busy, install job {} waits", job.host_id, job.id);
                continue;
            }

            let unit = InstallWorkUnit::new(job.host_id, job.id, self.units.clone());
            if self.pools.install.submit(Arc::new(unit)).await {
                info!(
                    "Dispatched install job {} ({}) for host {}",
                    job.id, job.install_action, job.host_id
                );
                submitted += 1;
            }
        }
        Ok(submitted)
    }

    /// Marks the daily inventory once the local clock reaches the
    /// configured hour. A day whose hour was missed is skipped.
    async fn mark_daily_inventory(&self, options: &SystemOption, now: DateTime<Utc>) -> Result<bool> {
        if !options.enable_inventory {
            return Ok(false);
        }
        let local = now.with_timezone(&self.timezone);
        if i64::from(local.hour()) != options.inventory_hour {
            return Ok(false);
        }

        let today = local.date_naive();
        let mut last = self.last_inventory_mark.lock().await;
        if *last == Some(today) {
            return Ok(false);
        }

        let cutoff = now - chrono::Duration::hours(1);
        let marked = self.db.mark_inventory_pending(cutoff).await?;
        *last = Some(today);
        info!("Daily inventory for {}: {} hosts marked", today, marked);
        Ok(true)
    }

    pub async fn inventory_tick(&self, options: &SystemOption, now: DateTime<Utc>) -> Result<usize> {
        if self.mark_daily_inventory(options, now).await? {
            if let Err(e) = self.housekeeper.run().await {
                warn!("Housekeeping after the inventory mark failed: {:#}", e);
            }
        }

        let mut submitted = 0;
        for inventory in self.db.pending_inventory_jobs().await? {
            let unit = InventoryWorkUnit::new(inventory.host_id, self.units.clone());
            if self.pools.inventory.submit(Arc::new(unit)).await {
                submitted += 1;
            }
        }
        if submitted > 0 {
            info!("Dispatched {} inventory runs", submitted);
        }
        Ok(submitted)
    }

    /// Without a working sender the jobs stay Submitted
    pub async fn email_tick(&self) -> Result<usize> {
        if !self.units.mailer.is_enabled() {
            return Ok(0);
        }
        let mut submitted = 0;
        for email in self.db.submitted_email_jobs().await? {
            let unit = EmailWorkUnit::new(email.id, self.units.clone());
            if self.pools.email.submit(Arc::new(unit)).await {
                submitted += 1;
            }
        }
        Ok(submitted)
    }

    #[instrument(skip(self))]
    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        let options = match self.db.get_system_option().await {
            Ok(options) => options,
            Err(e) => {
                warn!("Could not read system options, skipping tick: {:#}", e);
                return report;
            }
        };

        match self.install_tick(&options, now).await {
            Ok(count) => report.install_submitted = count,
            Err(e) => warn!("Install dispatch failed: {:#}", e),
        }
        match self.inventory_tick(&options, now).await {
            Ok(count) => report.inventory_submitted = count,
            Err(e) => warn!("Inventory dispatch failed: {:#}", e),
        }
        match self.email_tick().await {
            Ok(count) => report.email_submitted = count,
            Err(e) => warn!("Email dispatch failed: {:#}", e),
        }
        report
    }

    /// Ticks until `shutdown` flips to true
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("Dispatcher running every {}s", self.interval.as_secs());
        let mut interval = tokio::time::interval(self.interval);
        let mut tick_count = 0u64;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    tick_count += 1;
                    let report = self.tick(Utc::now()).await;
                    if tick_count.is_multiple_of(60) {
                        debug!("Dispatcher tick #{}: {:?}", tick_count, report);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Dispatcher stopping");
                        return;
                    }
                }
            }
        }
    }
}
