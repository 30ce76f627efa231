//! Server repositories, custom command profiles and software profiles.

use anyhow::Result;
use sqlx::Row;

use super::records::{
    join_list, split_list, CustomCommandProfile, NewServerRepository, ServerRepository,
    SoftwareProfile,
};
use super::Database;

impl Database {
    pub async fn create_server_repository(&self, repo: &NewServerRepository) -> Result<i64> {
        let password = repo.password.as_deref().map(|p| self.cipher.encrypt(p));
        let result = sqlx::query(
            r#"
            INSERT INTO server_repositories (hostname, server_type, server_url, username, password, server_directory, vrf)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&repo.hostname)
        .bind(repo.server_type.as_str())
        .bind(&repo.server_url)
        .bind(&repo.username)
        .bind(password)
        .bind(&repo.server_directory)
        .bind(&repo.vrf)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_server_repository(&self, id: i64) -> Result<Option<ServerRepository>> {
        let row = sqlx::query(
            r#"
            SELECT id, hostname, server_type, server_url, username, password, server_directory, vrf
            FROM server_repositories WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let server_type: String = row.try_get("server_type")?;
                let stored: Option<String> = row.try_get("password")?;
                Ok(Some(ServerRepository {
                    id: row.try_get("id")?,
                    hostname: row.try_get("hostname")?,
                    server_type: server_type.parse()?,
                    server_url: row.try_get("server_url")?,
                    username: row.try_get("username")?,
                    password: stored.map(|p| self.cipher.decrypt(&p)).transpose()?,
                    server_directory: row.try_get("server_directory")?,
                    vrf: row.try_get("vrf")?,
                }))
            }
            None => Ok(None),
        }
    }

    pub async fn create_custom_command_profile(
        &self,
        profile_name: &str,
        commands: &[String],
    ) -> Result<i64> {
        // Commands may contain commas, so they are stored one per line
        let result = sqlx::query(
            "INSERT INTO custom_command_profiles (profile_name, command_list) VALUES (?, ?)",
        )
        .bind(profile_name)
        .bind(commands.join("\n"))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_custom_command_profiles(
        &self,
        ids: &[i64],
    ) -> Result<Vec<CustomCommandProfile>> {
        let mut profiles = Vec::with_capacity(ids.len());
        for id in ids {
            let row = sqlx::query(
                "SELECT id, profile_name, command_list FROM custom_command_profiles WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(row) = row {
                let commands: String = row.try_get("command_list")?;
                profiles.push(CustomCommandProfile {
                    id: row.try_get("id")?,
                    profile_name: row.try_get("profile_name")?,
                    command_list: commands
                        .lines()
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_string)
                        .collect(),
                });
            }
        }
        Ok(profiles)
    }

    pub async fn create_software_profile(
        &self,
        name: &str,
        packages: &[String],
        created_by: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO software_profiles (name, packages, created_by) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(join_list(packages))
        .bind(created_by)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_software_profile(&self, name: &str) -> Result<Option<SoftwareProfile>> {
        let row =
            sqlx::query("SELECT id, name, packages, created_by FROM software_profiles WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => {
                let packages: String = row.try_get("packages")?;
                Ok(Some(SoftwareProfile {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    packages: split_list(&packages),
                    created_by: row.try_get("created_by")?,
                }))
            }
            None => Ok(None),
        }
    }
}
