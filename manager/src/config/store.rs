//! Seeds the job store with the hosts declared in the config directory.
//!
//! Import runs in merge mode: hosts already in the store get their
//! connection params refreshed, new ones are created, and hosts that only
//! exist in the store are left alone.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, HostSeed, JumpHostSeed};
use crate::database::{join_list, ConnectionType, Database, NewHost, NewJumpHost};

pub struct ConfigStore {
    db: Arc<Database>,
}

/// Result of an import operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportResult {
    pub hosts_created: usize,
    pub hosts_updated: usize,
    pub hosts_skipped: usize,
    pub jump_hosts_created: usize,
}

impl ConfigStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    async fn resolve_jump_host(
        &self,
        seed: &JumpHostSeed,
        result: &mut ImportResult,
    ) -> Result<i64> {
        if let Some(existing) = self.db.get_jump_host_by_name(&seed.hostname).await? {
            return Ok(existing.id);
        }
        let connection_type: ConnectionType = seed.connection_type.parse()?;
        let id = self
            .db
            .create_jump_host(&NewJumpHost {
                hostname: seed.hostname.clone(),
                host_or_ip: seed.host_or_ip.clone(),
                port_number: seed.port_number,
                connection_type,
                username: seed.username.clone(),
                password: seed.password.clone().unwrap_or_default(),
            })
            .await?;
        result.jump_hosts_created += 1;
        debug!("Created jump host {}", seed.hostname);
        Ok(id)
    }

    async fn new_host(&self, seed: &HostSeed, result: &mut ImportResult) -> Result<NewHost> {
        let connection_type: ConnectionType = seed.connection_type.parse()?;
        let region_id = match seed.region.as_deref().filter(|r| !r.is_empty()) {
            Some(region) => Some(self.db.create_region(region).await?),
            None => None,
        };
        let jump_host_id = match &seed.jump_host {
            Some(jump) => Some(self.resolve_jump_host(jump, result).await?),
            None => None,
        };

        Ok(NewHost {
            hostname: seed.name.clone(),
            platform: seed.platform.clone(),
            region_id,
            roles: join_list(&seed.roles),
            host_or_ip: seed.host_or_ip.clone(),
            username: seed.username.clone().unwrap_or_default(),
            password: seed.password.clone().unwrap_or_default(),
            connection_type,
            port_number: seed.port_number.clone().unwrap_or_default(),
            jump_host_id,
        })
    }

    /// Upserts every seeded host. A malformed entry is skipped, a store
    /// failure aborts the import.
    pub async fn import_hosts(&self, config: &Config) -> Result<ImportResult> {
        let mut result = ImportResult::default();

        let mut names: Vec<&String> = config.hosts.keys().collect();
        names.sort();

        for name in names {
            let seed = &config.hosts[name];
            let host = match self.new_host(seed, &mut result).await {
                Ok(host) => host,
                Err(e) => {
                    warn!("Skipping host {}: {:#}", name, e);
                    result.hosts_skipped += 1;
                    continue;
                }
            };

            match self.db.get_host_by_name(name).await? {
                Some(existing) => {
                    self.db
                        .update_host_connection(existing.id, &host)
                        .await
                        .with_context(|| format!("Failed to update host {}", name))?;
                    result.hosts_updated += 1;
                }
                None => {
                    self.db
                        .create_host(&host)
                        .await
                        .with_context(|| format!("Failed to create host {}", name))?;
                    result.hosts_created += 1;
                }
            }
        }

        info!(
            "Host import completed: {} new, {} updated, {} skipped, {} jump hosts created",
            result.hosts_created, result.hosts_updated, result.hosts_skipped, result.jump_hosts_created
        );
        Ok(result)
    }
}
