//! Install job lifecycle: creation, dispatch queries, archive and operation-id linkage.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, error, info, warn};

use super::records::{
    join_list, split_list, InstallAction, InstallJob, InstallJobHistory, JobStatus, NewInstallJob,
};
use super::Database;
use crate::errors::SchedulingError;

const JOB_COLUMNS: &str = "id, host_id, install_action, scheduled_time, packages, server_id, \
    server_directory, custom_command_profile_ids, dependency, status, status_time, start_time, \
    session_log, created_by, created_time, trace";

const HISTORY_COLUMNS: &str = "id, install_job_id, host_id, install_action, scheduled_time, \
    packages, server_id, server_directory, dependency, status, status_time, start_time, \
    operation_id, session_log, created_by, trace";

fn install_job_from_row(row: &SqliteRow) -> Result<InstallJob> {
    let action: String = row.try_get("install_action")?;
    let status: String = row.try_get("status")?;
    let packages: String = row.try_get("packages")?;
    let profiles: String = row.try_get("custom_command_profile_ids")?;

    Ok(InstallJob {
        id: row.try_get("id")?,
        host_id: row.try_get("host_id")?,
        install_action: action.parse()?,
        scheduled_time: row.try_get("scheduled_time")?,
        packages: split_list(&packages),
        server_id: row.try_get("server_id")?,
        server_directory: row.try_get("server_directory")?,
        custom_command_profile_ids: split_list(&profiles)
            .iter()
            .filter_map(|id| id.parse().ok())
            .collect(),
        dependency: row.try_get("dependency")?,
        status: status.parse()?,
        status_time: row.try_get("status_time")?,
        start_time: row.try_get("start_time")?,
        session_log: row.try_get("session_log")?,
        created_by: row.try_get("created_by")?,
        created_time: row.try_get("created_time")?,
        trace: row.try_get("trace")?,
    })
}

fn history_from_row(row: &SqliteRow) -> Result<InstallJobHistory> {
    let action: String = row.try_get("install_action")?;
    let status: String = row.try_get("status")?;
    let packages: String = row.try_get("packages")?;

    Ok(InstallJobHistory {
        id: row.try_get("id")?,
        install_job_id: row.try_get("install_job_id")?,
        host_id: row.try_get("host_id")?,
        install_action: action.parse()?,
        scheduled_time: row.try_get("scheduled_time")?,
        packages: split_list(&packages),
        server_id: row.try_get("server_id")?,
        server_directory: row.try_get("server_directory")?,
        dependency: row.try_get("dependency")?,
        status: status.parse()?,
        status_time: row.try_get("status_time")?,
        start_time: row.try_get("start_time")?,
        operation_id: row.try_get("operation_id")?,
        session_log: row.try_get("session_log")?,
        created_by: row.try_get("created_by")?,
        trace: row.try_get("trace")?,
    })
}

impl Database {
    pub async fn create_install_job(&self, job: &NewInstallJob) -> Result<i64> {
        let host_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM hosts WHERE id = ?")
            .bind(job.host_id)
            .fetch_optional(&self.pool)
            .await?;
        if host_exists.is_none() {
            return Err(SchedulingError::HostNotFound {
                host: job.host_id.to_string(),
            }
            .into());
        }

        // 0 is how older clients spell "no dependency"
        let dependency = job.dependency.filter(|id| *id > 0);
        if let Some(dependency_id) = dependency {
            let known: i64 = sqlx::query_scalar(
                r#"
                SELECT (SELECT COUNT(*) FROM install_jobs WHERE id = ?1)
                     + (SELECT COUNT(*) FROM install_job_history WHERE install_job_id = ?1)
                "#,
            )
            .bind(dependency_id)
            .fetch_one(&self.pool)
            .await?;
            if known == 0 {
                return Err(SchedulingError::UnknownDependency {
                    job_id: dependency_id,
                }
                .into());
            }
        }

        let profile_ids: Vec<String> = job
            .custom_command_profile_ids
            .iter()
            .map(|id| id.to_string())
            .collect();
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO install_jobs (
                host_id, install_action, scheduled_time, packages, server_id, server_directory,
                custom_command_profile_ids, dependency, status, status_time, created_by, created_time
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.host_id)
        .bind(job.install_action.as_str())
        .bind(job.scheduled_time)
        .bind(join_list(&job.packages))
        .bind(job.server_id)
        .bind(&job.server_directory)
        .bind(join_list(&profile_ids))
        .bind(dependency)
        .bind(JobStatus::Submitted.as_str())
        .bind(now)
        .bind(&job.created_by)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        info!(
            "Created install job {} ({} on host {}, scheduled {})",
            id, job.install_action, job.host_id, job.scheduled_time
        );
        Ok(id)
    }

    pub async fn get_install_job(&self, job_id: i64) -> Result<Option<InstallJob>> {
        let sql = format!("SELECT {} FROM install_jobs WHERE id = ?", JOB_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(install_job_from_row).transpose()
    }

    pub async fn list_install_jobs(&self) -> Result<Vec<InstallJob>> {
        let sql = format!(
            "SELECT {} FROM install_jobs ORDER BY scheduled_time, id",
            JOB_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(install_job_from_row).collect()
    }

    /// Submitted jobs whose scheduled time has passed, earliest first
    pub async fn due_install_jobs(&self, now: DateTime<Utc>) -> Result<Vec<InstallJob>> {
        let sql = format!("SELECT {} FROM install_jobs WHERE status = ?", JOB_COLUMNS);
        let rows = sqlx::query(&sql)
            .bind(JobStatus::Submitted.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut jobs = rows
            .iter()
            .map(install_job_from_row)
            .collect::<Result<Vec<_>>>()?;
        jobs.retain(|job| job.scheduled_time <= now);
        jobs.sort_by(|a, b| {
            a.scheduled_time
                .cmp(&b.scheduled_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(jobs)
    }

    pub async fn host_has_processing_job(&self, host_id: i64) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM install_jobs WHERE host_id = ? AND status = ?",
        )
        .bind(host_id)
        .bind(JobStatus::Processing.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Ready iff the dependency's most recent history row is Completed
    pub async fn dependency_completed(&self, dependency_id: i64) -> Result<bool> {
        let status: Option<String> = sqlx::query_scalar(
            r#"
            SELECT status FROM install_job_history
            WHERE install_job_id = ?
            ORDER BY status_time DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(dependency_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(status.as_deref() == Some(JobStatus::Completed.as_str()))
    }

    pub async fn mark_install_job_processing(
        &self,
        job_id: i64,
        start_time: DateTime<Utc>,
        session_log: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE install_jobs
            SET status = ?, status_time = ?, start_time = ?, session_log = ?, trace = NULL
            WHERE id = ?
            "#,
        )
        .bind(JobStatus::Processing.as_str())
        .bind(start_time)
        .bind(start_time)
        .bind(session_log)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("Install job {} vanished before processing", job_id));
        }
        debug!("Install job {} is processing", job_id);
        Ok(())
    }

    /// Writes the history row and removes (Completed) or updates (Failed) the
    /// job row in one transaction.
    pub async fn archive_install_job(
        &self,
        job_id: i64,
        status: JobStatus,
        operation_id: i64,
        trace: Option<&str>,
    ) -> Result<InstallJobHistory> {
        if !status.is_terminal() {
            return Err(anyhow!("Cannot archive install job {} as {}", job_id, status));
        }

        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {} FROM install_jobs WHERE id = ?", JOB_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| anyhow!("Install job {} not found for archiving", job_id))?;
        let job = install_job_from_row(&row)?;

        // status_time never precedes start_time, even with clock skew
        let now = Utc::now();
        let status_time = match job.start_time {
            Some(start) if start > now => start,
            _ => now,
        };

        let history_id = sqlx::query(
            r#"
            INSERT INTO install_job_history (
                install_job_id, host_id, install_action, scheduled_time, packages, server_id,
                server_directory, dependency, status, status_time, start_time, operation_id,
                session_log, created_by, trace
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id)
        .bind(job.host_id)
        .bind(job.install_action.as_str())
        .bind(job.scheduled_time)
        .bind(join_list(&job.packages))
        .bind(job.server_id)
        .bind(&job.server_directory)
        .bind(job.dependency)
        .bind(status.as_str())
        .bind(status_time)
        .bind(job.start_time)
        .bind(operation_id)
        .bind(&job.session_log)
        .bind(&job.created_by)
        .bind(trace)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        match status {
            JobStatus::Completed => {
                sqlx::query("DELETE FROM install_jobs WHERE id = ?")
                    .bind(job_id)
                    .execute(&mut *tx)
                    .await?;
            }
            _ => {
                sqlx::query(
                    "UPDATE install_jobs SET status = ?, status_time = ?, trace = ? WHERE id = ?",
                )
                .bind(status.as_str())
                .bind(status_time)
                .bind(trace)
                .bind(job_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        if let Err(e) = tx.commit().await {
            error!("Failed to archive install job {}: {}", job_id, e);
            return Err(e.into());
        }

        info!(
            "Archived install job {} ({}) as {} with operation id {}",
            job_id, job.install_action, status, operation_id
        );

        Ok(InstallJobHistory {
            id: history_id,
            install_job_id: job.id,
            host_id: job.host_id,
            install_action: job.install_action,
            scheduled_time: job.scheduled_time,
            packages: job.packages,
            server_id: job.server_id,
            server_directory: job.server_directory,
            dependency: job.dependency,
            status,
            status_time,
            start_time: job.start_time,
            operation_id,
            session_log: job.session_log,
            created_by: job.created_by,
            trace: trace.map(str::to_string),
        })
    }

    pub async fn list_install_history(
        &self,
        host_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<InstallJobHistory>> {
        let sql = format!(
            "SELECT {} FROM install_job_history WHERE (?1 IS NULL OR host_id = ?1) \
             ORDER BY status_time DESC, id DESC LIMIT ?2",
            HISTORY_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(host_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(history_from_row).collect()
    }

    /// Most recent history row of an action on a host, any terminal status
    pub async fn latest_history_for_action(
        &self,
        host_id: i64,
        action: InstallAction,
    ) -> Result<Option<InstallJobHistory>> {
        let sql = format!(
            "SELECT {} FROM install_job_history WHERE host_id = ? AND install_action = ? \
             ORDER BY status_time DESC, id DESC LIMIT 1",
            HISTORY_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(host_id)
            .bind(action.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(history_from_row).transpose()
    }

    /// Operation id an Activate job should reuse: the preceding InstallAdd's
    /// id when it completed with the same ordered package list, else -1.
    pub async fn linked_operation_id(&self, job: &InstallJob) -> Result<i64> {
        if job.install_action != InstallAction::Activate {
            return Ok(-1);
        }

        let last_add = self
            .latest_history_for_action(job.host_id, InstallAction::InstallAdd)
            .await?;

        Ok(match last_add {
            Some(add) if add.status == JobStatus::Completed && add.packages == job.packages => {
                debug!(
                    "Activate job {} reuses operation {} of install job {}",
                    job.id, add.operation_id, add.install_job_id
                );
                add.operation_id
            }
            _ => -1,
        })
    }

    /// Jobs left Processing by a previous run are failed and archived
    pub async fn fail_interrupted_install_jobs(&self) -> Result<usize> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM install_jobs WHERE status = ?")
            .bind(JobStatus::Processing.as_str())
            .fetch_all(&self.pool)
            .await?;

        for id in &ids {
            warn!("Install job {} was processing when the manager stopped", id);
            self.archive_install_job(
                *id,
                JobStatus::Failed,
                -1,
                Some("Interrupted by manager restart"),
            )
            .await?;
        }
        Ok(ids.len())
    }
}
