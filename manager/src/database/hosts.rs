//! Hosts, connection params, jump hosts, regions and users.

use anyhow::{anyhow, Result};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, info};

use super::records::{ConnectionType, Host, JumpHost, NewHost, NewJumpHost, User};
use super::{ConnectionParam, Database};
use crate::errors::SchedulingError;

const HOST_SELECT: &str = r#"
    SELECT h.id, h.hostname, h.platform, h.region_id, h.roles, h.software_platform,
           h.software_version, h.inventory_retrieval_status, h.created_time,
           c.host_or_ip, c.username, c.password, c.connection_type, c.port_number,
           c.jump_host_id
    FROM hosts h
    JOIN connection_params c ON c.host_id = h.id
"#;

impl Database {
    pub async fn create_region(&self, name: &str) -> Result<i64> {
        sqlx::query("INSERT OR IGNORE INTO regions (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        let id: i64 = sqlx::query_scalar("SELECT id FROM regions WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn create_user(&self, username: &str, email: Option<&str>) -> Result<i64> {
        let result = sqlx::query("INSERT INTO users (username, email) VALUES (?, ?)")
            .bind(username)
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_user(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, username, email FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(User {
                id: row.try_get("id")?,
                username: row.try_get("username")?,
                email: row.try_get("email")?,
            })
        })
        .transpose()
    }

    pub async fn create_jump_host(&self, jump: &NewJumpHost) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO jump_hosts (hostname, host_or_ip, port_number, connection_type, username, password)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&jump.hostname)
        .bind(&jump.host_or_ip)
        .bind(jump.port_number.map(i64::from))
        .bind(jump.connection_type.as_str())
        .bind(&jump.username)
        .bind(self.cipher.encrypt(&jump.password))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_jump_host(&self, id: i64) -> Result<Option<JumpHost>> {
        let row = sqlx::query(
            "SELECT id, hostname, host_or_ip, port_number, connection_type, username, password FROM jump_hosts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let port: Option<i64> = row.try_get("port_number")?;
                let connection_type: String = row.try_get("connection_type")?;
                let stored: String = row.try_get("password")?;
                Ok(Some(JumpHost {
                    id: row.try_get("id")?,
                    hostname: row.try_get("hostname")?,
                    host_or_ip: row.try_get("host_or_ip")?,
                    port_number: port.and_then(|p| u16::try_from(p).ok()),
                    connection_type: connection_type.parse()?,
                    username: row.try_get("username")?,
                    password: self.cipher.decrypt(&stored)?,
                }))
            }
            None => Ok(None),
        }
    }

    pub async fn get_jump_host_by_name(&self, hostname: &str) -> Result<Option<JumpHost>> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM jump_hosts WHERE hostname = ?")
            .bind(hostname)
            .fetch_optional(&self.pool)
            .await?;
        match id {
            Some(id) => self.get_jump_host(id).await,
            None => Ok(None),
        }
    }

    /// Creates the host, its connection params and its inventory job together
    pub async fn create_host(&self, host: &NewHost) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let host_id = sqlx::query(
            r#"
            INSERT INTO hosts (hostname, platform, region_id, roles, created_time)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&host.hostname)
        .bind(&host.platform)
        .bind(host.region_id)
        .bind(&host.roles)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query(
            r#"
            INSERT INTO connection_params (host_id, host_or_ip, username, password, connection_type, port_number, jump_host_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(host_id)
        .bind(&host.host_or_ip)
        .bind(&host.username)
        .bind(self.cipher.encrypt(&host.password))
        .bind(host.connection_type.as_str())
        .bind(&host.port_number)
        .bind(host.jump_host_id)
        .execute(&mut *tx)
        .await?;

        // New hosts get their first inventory on the next dispatcher tick
        sqlx::query("INSERT INTO inventory_jobs (host_id, pending_submit) VALUES (?, 1)")
            .bind(host_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("Created host {} (id {})", host.hostname, host_id);
        Ok(host_id)
    }

    /// Credentials and reachability may change, the host identity may not
    pub async fn update_host_connection(&self, host_id: i64, host: &NewHost) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE hosts SET platform = ?, region_id = ?, roles = ? WHERE id = ?")
            .bind(&host.platform)
            .bind(host.region_id)
            .bind(&host.roles)
            .bind(host_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            UPDATE connection_params
            SET host_or_ip = ?, username = ?, password = ?, connection_type = ?, port_number = ?, jump_host_id = ?
            WHERE host_id = ?
            "#,
        )
        .bind(&host.host_or_ip)
        .bind(&host.username)
        .bind(self.cipher.encrypt(&host.password))
        .bind(host.connection_type.as_str())
        .bind(&host.port_number)
        .bind(host.jump_host_id)
        .bind(host_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Updated connection params of host {}", host_id);
        Ok(())
    }

    pub async fn get_host(&self, host_id: i64) -> Result<Option<Host>> {
        let sql = format!("{} WHERE h.id = ?", HOST_SELECT);
        let row = sqlx::query(&sql)
            .bind(host_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.host_from_row(&row).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_host_by_name(&self, hostname: &str) -> Result<Option<Host>> {
        let sql = format!("{} WHERE h.hostname = ?", HOST_SELECT);
        let row = sqlx::query(&sql)
            .bind(hostname)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.host_from_row(&row).await?)),
            None => Ok(None),
        }
    }

    pub async fn list_hosts(&self) -> Result<Vec<Host>> {
        let sql = format!("{} ORDER BY h.hostname", HOST_SELECT);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut hosts = Vec::with_capacity(rows.len());
        for row in rows {
            hosts.push(self.host_from_row(&row).await?);
        }
        Ok(hosts)
    }

    async fn host_from_row(&self, row: &SqliteRow) -> Result<Host> {
        let host_id: i64 = row.try_get("id")?;
        let connection_type: String = row.try_get("connection_type")?;
        let stored_password: String = row.try_get("password")?;
        let jump_host_id: Option<i64> = row.try_get("jump_host_id")?;

        let jump_host = match jump_host_id {
            Some(id) => Some(
                self.get_jump_host(id)
                    .await?
                    .ok_or_else(|| anyhow!("Host {} references missing jump host {}", host_id, id))?,
            ),
            None => None,
        };

        Ok(Host {
            id: host_id,
            hostname: row.try_get("hostname")?,
            platform: row.try_get("platform")?,
            region_id: row.try_get("region_id")?,
            roles: row.try_get("roles")?,
            software_platform: row.try_get("software_platform")?,
            software_version: row.try_get("software_version")?,
            inventory_retrieval_status: row.try_get("inventory_retrieval_status")?,
            created_time: row.try_get("created_time")?,
            connection: ConnectionParam {
                host_id,
                host_or_ip: row.try_get("host_or_ip")?,
                username: row.try_get("username")?,
                password: self.cipher.decrypt(&stored_password)?,
                connection_type: connection_type.parse::<ConnectionType>()?,
                port_number: row.try_get("port_number")?,
                jump_host_id,
            },
            jump_host,
        })
    }

    /// Removes a host that nothing references any more
    pub async fn delete_host(&self, host_id: i64) -> Result<()> {
        let hostname: Option<String> = sqlx::query_scalar("SELECT hostname FROM hosts WHERE id = ?")
            .bind(host_id)
            .fetch_optional(&self.pool)
            .await?;
        let hostname = hostname.ok_or_else(|| SchedulingError::HostNotFound {
            host: host_id.to_string(),
        })?;

        let references: i64 = sqlx::query_scalar(
            r#"
            SELECT (SELECT COUNT(*) FROM install_jobs WHERE host_id = ?1)
                 + (SELECT COUNT(*) FROM install_job_history WHERE host_id = ?1)
                 + (SELECT COUNT(*) FROM inventory_job_history WHERE host_id = ?1)
            "#,
        )
        .bind(host_id)
        .fetch_one(&self.pool)
        .await?;

        if references > 0 {
            return Err(SchedulingError::HostInUse {
                host: hostname,
                references,
            }
            .into());
        }

        let mut tx = self.pool.begin().await?;
        for sql in [
            "DELETE FROM packages WHERE host_id = ?",
            "DELETE FROM inventory_jobs WHERE host_id = ?",
            "DELETE FROM connection_params WHERE host_id = ?",
            "DELETE FROM hosts WHERE id = ?",
        ] {
            sqlx::query(sql).bind(host_id).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        info!("Deleted host {} (id {})", hostname, host_id);
        Ok(())
    }
}
