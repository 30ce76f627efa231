//! Inventory jobs, inventory history and the per-host package set.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, info};

use super::records::{InventoryJob, InventoryJobHistory, JobStatus, Package};
use super::Database;

fn inventory_job_from_row(row: &SqliteRow) -> Result<InventoryJob> {
    let status: Option<String> = row.try_get("status")?;
    Ok(InventoryJob {
        id: row.try_get("id")?,
        host_id: row.try_get("host_id")?,
        pending_submit: row.try_get("pending_submit")?,
        status: status.map(|s| s.parse()).transpose()?,
        status_time: row.try_get("status_time")?,
        last_successful_time: row.try_get("last_successful_time")?,
        session_log: row.try_get("session_log")?,
    })
}

impl Database {
    pub async fn get_inventory_job(&self, host_id: i64) -> Result<Option<InventoryJob>> {
        let row = sqlx::query(
            r#"
            SELECT id, host_id, pending_submit, status, status_time, last_successful_time, session_log
            FROM inventory_jobs WHERE host_id = ?
            "#,
        )
        .bind(host_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(inventory_job_from_row).transpose()
    }

    pub async fn pending_inventory_jobs(&self) -> Result<Vec<InventoryJob>> {
        let rows = sqlx::query(
            r#"
            SELECT id, host_id, pending_submit, status, status_time, last_successful_time, session_log
            FROM inventory_jobs WHERE pending_submit = 1 ORDER BY host_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(inventory_job_from_row).collect()
    }

    /// Flags every idle inventory job whose last success predates `cutoff`
    pub async fn mark_inventory_pending(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_jobs SET pending_submit = 1
            WHERE pending_submit = 0
              AND (last_successful_time IS NULL OR last_successful_time < ?)
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        info!("Marked {} inventory jobs pending", result.rows_affected());
        Ok(result.rows_affected())
    }

    pub async fn set_inventory_processing(&self, host_id: i64, session_log: &str) -> Result<()> {
        sqlx::query(
            "UPDATE inventory_jobs SET status = ?, status_time = ?, session_log = ? WHERE host_id = ?",
        )
        .bind(JobStatus::Processing.as_str())
        .bind(Utc::now())
        .bind(session_log)
        .bind(host_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records the terminal state of an inventory run and clears the pending flag
    pub async fn archive_inventory_job(
        &self,
        host_id: i64,
        status: JobStatus,
        trace: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let session_log: Option<String> =
            sqlx::query_scalar("SELECT session_log FROM inventory_jobs WHERE host_id = ?")
                .bind(host_id)
                .fetch_optional(&mut *tx)
                .await?
                .flatten();

        sqlx::query(
            r#"
            INSERT INTO inventory_job_history (host_id, status, status_time, session_log, trace)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(host_id)
        .bind(status.as_str())
        .bind(now)
        .bind(&session_log)
        .bind(trace)
        .execute(&mut *tx)
        .await?;

        if status == JobStatus::Completed {
            sqlx::query(
                r#"
                UPDATE inventory_jobs
                SET status = ?, status_time = ?, last_successful_time = ?, pending_submit = 0
                WHERE host_id = ?
                "#,
            )
            .bind(status.as_str())
            .bind(now)
            .bind(now)
            .bind(host_id)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                "UPDATE inventory_jobs SET status = ?, status_time = ?, pending_submit = 0 WHERE host_id = ?",
            )
            .bind(status.as_str())
            .bind(now)
            .bind(host_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE hosts SET inventory_retrieval_status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(host_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("Inventory for host {} archived as {}", host_id, status);
        Ok(())
    }

    pub async fn list_inventory_history(&self, host_id: i64) -> Result<Vec<InventoryJobHistory>> {
        let rows = sqlx::query(
            r#"
            SELECT id, host_id, status, status_time, session_log, trace
            FROM inventory_job_history WHERE host_id = ?
            ORDER BY status_time DESC, id DESC
            "#,
        )
        .bind(host_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let status: String = row.try_get("status")?;
                Ok(InventoryJobHistory {
                    id: row.try_get("id")?,
                    host_id: row.try_get("host_id")?,
                    status: status.parse()?,
                    status_time: row.try_get("status_time")?,
                    session_log: row.try_get("session_log")?,
                    trace: row.try_get("trace")?,
                })
            })
            .collect()
    }

    /// Swaps the host's package set and software fields in one transaction
    pub async fn replace_packages(
        &self,
        host_id: i64,
        packages: &[Package],
        software_platform: Option<&str>,
        software_version: Option<&str>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE hosts
            SET software_platform = COALESCE(?, software_platform),
                software_version = COALESCE(?, software_version)
            WHERE id = ?
            "#,
        )
        .bind(software_platform)
        .bind(software_version)
        .bind(host_id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(anyhow!("Host {} not found while saving inventory", host_id));
        }

        sqlx::query("DELETE FROM packages WHERE host_id = ?")
            .bind(host_id)
            .execute(&mut *tx)
            .await?;

        for package in packages {
            sqlx::query("INSERT INTO packages (host_id, location, name, state) VALUES (?, ?, ?, ?)")
                .bind(host_id)
                .bind(&package.location)
                .bind(&package.name)
                .bind(package.state.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!("Stored {} packages for host {}", packages.len(), host_id);
        Ok(())
    }

    pub async fn get_packages(&self, host_id: i64) -> Result<Vec<Package>> {
        let rows = sqlx::query(
            "SELECT location, name, state FROM packages WHERE host_id = ? ORDER BY location, name",
        )
        .bind(host_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let state: String = row.try_get("state")?;
                Ok(Package {
                    location: row.try_get("location")?,
                    name: row.try_get("name")?,
                    state: state.parse()?,
                })
            })
            .collect()
    }
}
