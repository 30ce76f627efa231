//! The singleton system options row and the system log table.

use anyhow::{anyhow, Result};
use chrono::Utc;
use sqlx::Row;
use tracing::{debug, info};

use super::records::{SystemLog, SystemOption};
use super::Database;

impl Database {
    pub(super) async fn ensure_system_option(&self) -> Result<()> {
        let defaults = SystemOption::default();
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO system_options (
                id, inventory_threads, install_threads, download_threads, can_schedule,
                can_install, enable_email_notify, enable_inventory, inventory_hour,
                inventory_history_per_host, install_history_per_host, total_system_logs, base_url
            ) VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(defaults.inventory_threads)
        .bind(defaults.install_threads)
        .bind(defaults.download_threads)
        .bind(defaults.can_schedule)
        .bind(defaults.can_install)
        .bind(defaults.enable_email_notify)
        .bind(defaults.enable_inventory)
        .bind(defaults.inventory_hour)
        .bind(defaults.inventory_history_per_host)
        .bind(defaults.install_history_per_host)
        .bind(defaults.total_system_logs)
        .bind(&defaults.base_url)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!("Created system options with defaults");
        }
        Ok(())
    }

    /// Always read fresh; callers must not cache the result across ticks
    pub async fn get_system_option(&self) -> Result<SystemOption> {
        let row = sqlx::query("SELECT * FROM system_options WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| anyhow!("System options row is missing"))?;

        Ok(SystemOption {
            inventory_threads: row.try_get("inventory_threads")?,
            install_threads: row.try_get("install_threads")?,
            download_threads: row.try_get("download_threads")?,
            can_schedule: row.try_get("can_schedule")?,
            can_install: row.try_get("can_install")?,
            enable_email_notify: row.try_get("enable_email_notify")?,
            enable_inventory: row.try_get("enable_inventory")?,
            inventory_hour: row.try_get("inventory_hour")?,
            inventory_history_per_host: row.try_get("inventory_history_per_host")?,
            install_history_per_host: row.try_get("install_history_per_host")?,
            total_system_logs: row.try_get("total_system_logs")?,
            base_url: row.try_get("base_url")?,
        })
    }

    pub async fn update_system_option(&self, option: &SystemOption) -> Result<()> {
        if !(0..24).contains(&option.inventory_hour) {
            return Err(anyhow!(
                "inventory_hour must be within 0..=23, got {}",
                option.inventory_hour
            ));
        }

        sqlx::query(
            r#"
            UPDATE system_options SET
                inventory_threads = ?, install_threads = ?, download_threads = ?, can_schedule = ?,
                can_install = ?, enable_email_notify = ?, enable_inventory = ?, inventory_hour = ?,
                inventory_history_per_host = ?, install_history_per_host = ?, total_system_logs = ?,
                base_url = ?
            WHERE id = 1
            "#,
        )
        .bind(option.inventory_threads)
        .bind(option.install_threads)
        .bind(option.download_threads)
        .bind(option.can_schedule)
        .bind(option.can_install)
        .bind(option.enable_email_notify)
        .bind(option.enable_inventory)
        .bind(option.inventory_hour)
        .bind(option.inventory_history_per_host)
        .bind(option.install_history_per_host)
        .bind(option.total_system_logs)
        .bind(&option.base_url)
        .execute(&self.pool)
        .await?;
        debug!("System options updated");
        Ok(())
    }

    pub async fn set_can_install(&self, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE system_options SET can_install = ? WHERE id = 1")
            .bind(enabled)
            .execute(&self.pool)
            .await?;
        info!("can_install set to {}", enabled);
        Ok(())
    }

    pub async fn set_can_schedule(&self, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE system_options SET can_schedule = ? WHERE id = 1")
            .bind(enabled)
            .execute(&self.pool)
            .await?;
        info!("can_schedule set to {}", enabled);
        Ok(())
    }

    pub async fn add_system_log(&self, level: &str, msg: &str, trace: Option<&str>) -> Result<()> {
        sqlx::query("INSERT INTO system_logs (level, msg, trace, created_time) VALUES (?, ?, ?, ?)")
            .bind(level)
            .bind(msg)
            .bind(trace)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_system_logs(&self, limit: i64) -> Result<Vec<SystemLog>> {
        let rows = sqlx::query(
            "SELECT id, level, msg, trace, created_time FROM system_logs ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SystemLog {
                    id: row.try_get("id")?,
                    level: row.try_get("level")?,
                    msg: row.try_get("msg")?,
                    trace: row.try_get("trace")?,
                    created_time: row.try_get("created_time")?,
                })
            })
            .collect()
    }
}
