//! Retention pruning for the system log and the per-host history tables.

use anyhow::Result;
use sqlx::Row;
use tracing::{debug, info};

use super::Database;
use crate::constants::scheduling::SYSTEM_LOG_TRIM_FACTOR;

#[derive(Debug, Default, Clone)]
pub struct PruneReport {
    pub system_logs_deleted: u64,
    pub inventory_history_deleted: u64,
    pub install_history_deleted: u64,
    /// Session log paths of the deleted history rows, to be removed from disk
    pub session_logs: Vec<String>,
}

impl Database {
    /// Trims back to `total` once the table grew past `total * 1.1`
    pub async fn trim_system_logs(&self, total: i64) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM system_logs")
            .fetch_one(&self.pool)
            .await?;

        let threshold = (total as f64 * SYSTEM_LOG_TRIM_FACTOR) as i64;
        if count <= threshold {
            debug!("{} system logs, threshold {}, nothing to trim", count, threshold);
            return Ok(0);
        }

        let result = sqlx::query(
            "DELETE FROM system_logs WHERE id IN (SELECT id FROM system_logs ORDER BY id ASC LIMIT ?)",
        )
        .bind(count - total)
        .execute(&self.pool)
        .await?;
        info!("Trimmed {} system logs", result.rows_affected());
        Ok(result.rows_affected())
    }

    /// Keeps the newest `per_host` rows of `table` for every host
    async fn prune_history_table(
        &self,
        table: &str,
        per_host: i64,
    ) -> Result<(u64, Vec<String>)> {
        let sql = format!(
            r#"
            SELECT id, session_log FROM (
                SELECT id, session_log,
                       ROW_NUMBER() OVER (PARTITION BY host_id ORDER BY status_time DESC, id DESC) AS rn
                FROM {}
            ) WHERE rn > ?
            "#,
            table
        );
        let rows = sqlx::query(&sql)
            .bind(per_host.max(0))
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            return Ok((0, Vec::new()));
        }

        let mut session_logs = Vec::new();
        let mut tx = self.pool.begin().await?;
        let delete_sql = format!("DELETE FROM {} WHERE id = ?", table);
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let session_log: Option<String> = row.try_get("session_log")?;
            sqlx::query(&delete_sql).bind(id).execute(&mut *tx).await?;
            if let Some(path) = session_log.filter(|p| !p.is_empty()) {
                session_logs.push(path);
            }
        }
        tx.commit().await?;

        info!("Pruned {} rows from {}", rows.len(), table);
        Ok((rows.len() as u64, session_logs))
    }

    pub async fn prune_history(
        &self,
        inventory_per_host: i64,
        install_per_host: i64,
    ) -> Result<PruneReport> {
        let (inventory_deleted, mut session_logs) = self
            .prune_history_table("inventory_job_history", inventory_per_host)
            .await?;
        let (install_deleted, install_logs) = self
            .prune_history_table("install_job_history", install_per_host)
            .await?;
        session_logs.extend(install_logs);

        // A failed job row still points at its log after the history row is gone
        let still_referenced: Vec<String> = sqlx::query_scalar(
            "SELECT session_log FROM install_jobs WHERE session_log IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        session_logs.retain(|path| !still_referenced.contains(path));

        Ok(PruneReport {
            system_logs_deleted: 0,
            inventory_history_deleted: inventory_deleted,
            install_history_deleted: install_deleted,
            session_logs,
        })
    }
}
