//! Email job queue drained by the email pool.

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use super::records::{EmailJob, JobStatus};
use super::Database;

fn email_job_from_row(row: &SqliteRow) -> Result<EmailJob> {
    let status: String = row.try_get("status")?;
    Ok(EmailJob {
        id: row.try_get("id")?,
        recipients: row.try_get("recipients")?,
        subject: row.try_get("subject")?,
        message: row.try_get("message")?,
        status: status.parse()?,
        status_time: row.try_get("status_time")?,
        created_by: row.try_get("created_by")?,
    })
}

impl Database {
    pub async fn create_email_job(
        &self,
        recipients: &str,
        subject: &str,
        message: &str,
        created_by: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO email_jobs (recipients, subject, message, status, status_time, created_by)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(recipients)
        .bind(subject)
        .bind(message)
        .bind(JobStatus::Submitted.as_str())
        .bind(Utc::now())
        .bind(created_by)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("Queued email job {} for {}", id, recipients);
        Ok(id)
    }

    pub async fn submitted_email_jobs(&self) -> Result<Vec<EmailJob>> {
        let rows = sqlx::query(
            r#"
            SELECT id, recipients, subject, message, status, status_time, created_by
            FROM email_jobs WHERE status = ? ORDER BY id
            "#,
        )
        .bind(JobStatus::Submitted.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(email_job_from_row).collect()
    }

    pub async fn get_email_job(&self, id: i64) -> Result<Option<EmailJob>> {
        let row = sqlx::query(
            r#"
            SELECT id, recipients, subject, message, status, status_time, created_by
            FROM email_jobs WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(email_job_from_row).transpose()
    }

    pub async fn delete_email_job(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM email_jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_email_job_failed(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE email_jobs SET status = ?, status_time = ? WHERE id = ?")
            .bind(JobStatus::Failed.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
