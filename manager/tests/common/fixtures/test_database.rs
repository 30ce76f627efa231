//! In-memory job store seeded with hosts, plus the work unit context around it

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use std::path::Path;
use std::sync::Arc;

use upgrade_manager::database::{
    ConnectionType, Database, InstallAction, NewHost, NewInstallJob, NewServerRepository,
    ServerType,
};
use upgrade_manager::handlers::{HandlerEnv, PlatformRegistry};
use upgrade_manager::services::{EmailSender, Notifier, WebhookEmailSender};
use upgrade_manager::transport::Dialer;
use upgrade_manager::work_units::UnitContext;

use super::test_data::{fast_timeouts, login, CREDENTIAL_KEY};

/// Test job store wrapper for in-memory SQLite
pub struct TestDatabase {
    db: Arc<Database>,
}

impl TestDatabase {
    pub async fn new() -> Result<Self> {
        Ok(Self {
            db: Arc::new(Database::in_memory(CREDENTIAL_KEY).await?),
        })
    }

    pub fn db(&self) -> Arc<Database> {
        self.db.clone()
    }

    /// Telnet host reachable at `address` with the fake router login
    pub async fn add_host(&self, hostname: &str, platform: &str, address: &str) -> Result<i64> {
        self.db
            .create_host(&NewHost {
                hostname: hostname.to_string(),
                platform: platform.to_string(),
                region_id: None,
                roles: "PE".to_string(),
                host_or_ip: address.to_string(),
                username: login::USERNAME.to_string(),
                password: login::PASSWORD.to_string(),
                connection_type: ConnectionType::Telnet,
                port_number: String::new(),
                jump_host_id: None,
            })
            .await
    }

    pub async fn add_tftp_repository(&self) -> Result<i64> {
        self.db
            .create_server_repository(&NewServerRepository {
                hostname: "tftp-lab".to_string(),
                server_type: ServerType::Tftp,
                server_url: "tftp://10.1.1.1/images".to_string(),
                username: None,
                password: None,
                server_directory: String::new(),
                vrf: None,
            })
            .await
    }

    /// Job due a minute ago, created by `admin`
    pub async fn schedule(
        &self,
        host_id: i64,
        action: InstallAction,
        packages: &[&str],
        server_id: Option<i64>,
        dependency: Option<i64>,
    ) -> Result<i64> {
        self.db
            .create_install_job(&NewInstallJob {
                host_id,
                install_action: action,
                scheduled_time: Utc::now() - ChronoDuration::minutes(1),
                packages: packages.iter().map(|p| p.to_string()).collect(),
                server_id,
                server_directory: String::new(),
                custom_command_profile_ids: Vec::new(),
                dependency,
                created_by: "admin".to_string(),
            })
            .await
    }

    /// Context whose devices are reached through `dialer`, with session logs
    /// under `session_log_root` and mail delivery to `mail_webhook_url`
    pub fn unit_context(
        &self,
        dialer: Arc<dyn Dialer>,
        session_log_root: &Path,
        mail_webhook_url: &str,
    ) -> Result<UnitContext> {
        let mailer: Arc<dyn EmailSender> =
            Arc::new(WebhookEmailSender::new(mail_webhook_url.to_string())?);
        Ok(UnitContext {
            db: self.db.clone(),
            env: HandlerEnv {
                dialer,
                timeouts: fast_timeouts(),
                default_username: String::new(),
                default_password: String::new(),
                session_log_root: session_log_root.to_path_buf(),
            },
            platforms: Arc::new(PlatformRegistry::new()?),
            notifier: Notifier::new(self.db.clone()),
            mailer,
        })
    }
}
