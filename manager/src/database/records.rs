//! Database record types (entities).
//!
//! This module contains all the record structs used by the job store, plus the
//! small enums stored as TEXT columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Enumerations stored as text
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstallAction {
    PreUpgrade,
    InstallAdd,
    Activate,
    PostUpgrade,
    Commit,
    Remove,
    Deactivate,
    PreMigrate,
    Migrate,
    PostMigrate,
    MigrationAudit,
    AllForMigrate,
}

impl InstallAction {
    pub const ALL: [InstallAction; 12] = [
        InstallAction::PreUpgrade,
        InstallAction::InstallAdd,
        InstallAction::Activate,
        InstallAction::PostUpgrade,
        InstallAction::Commit,
        InstallAction::Remove,
        InstallAction::Deactivate,
        InstallAction::PreMigrate,
        InstallAction::Migrate,
        InstallAction::PostMigrate,
        InstallAction::MigrationAudit,
        InstallAction::AllForMigrate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstallAction::PreUpgrade => "Pre-Upgrade",
            InstallAction::InstallAdd => "Install Add",
            InstallAction::Activate => "Activate",
            InstallAction::PostUpgrade => "Post-Upgrade",
            InstallAction::Commit => "Install Commit",
            InstallAction::Remove => "Remove",
            InstallAction::Deactivate => "Deactivate",
            InstallAction::PreMigrate => "Pre-Migrate",
            InstallAction::Migrate => "Migrate",
            InstallAction::PostMigrate => "Post-Migrate",
            InstallAction::MigrationAudit => "Migration-Audit",
            InstallAction::AllForMigrate => "All-For-Migrate",
        }
    }
}

impl fmt::Display for InstallAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InstallAction::ALL
            .iter()
            .copied()
            .find(|action| action.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("Unknown install action '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Submitted,
    Processing,
    Failed,
    Completed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Submitted => "submitted",
            JobStatus::Processing => "processing",
            JobStatus::Failed => "failed",
            JobStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Completed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(JobStatus::Submitted),
            "processing" => Ok(JobStatus::Processing),
            "failed" => Ok(JobStatus::Failed),
            "completed" => Ok(JobStatus::Completed),
            other => Err(anyhow::anyhow!("Unknown job status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageState {
    Inactive,
    InactiveCommitted,
    Active,
    ActiveCommitted,
}

impl PackageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageState::Inactive => "inactive",
            PackageState::InactiveCommitted => "inactive-committed",
            PackageState::Active => "active",
            PackageState::ActiveCommitted => "active-committed",
        }
    }

    /// State after the package was also found in the committed list
    pub fn committed(self) -> Self {
        match self {
            PackageState::Active | PackageState::ActiveCommitted => PackageState::ActiveCommitted,
            PackageState::Inactive | PackageState::InactiveCommitted => {
                PackageState::InactiveCommitted
            }
        }
    }
}

impl fmt::Display for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inactive" => Ok(PackageState::Inactive),
            "inactive-committed" => Ok(PackageState::InactiveCommitted),
            "active" => Ok(PackageState::Active),
            "active-committed" => Ok(PackageState::ActiveCommitted),
            other => Err(anyhow::anyhow!("Unknown package state '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionType {
    Telnet,
    Ssh,
}

impl ConnectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::Telnet => "telnet",
            ConnectionType::Ssh => "ssh",
        }
    }
}

impl FromStr for ConnectionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "telnet" => Ok(ConnectionType::Telnet),
            "ssh" => Ok(ConnectionType::Ssh),
            other => Err(anyhow::anyhow!("Unknown connection type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerType {
    Tftp,
    Ftp,
    Sftp,
    Local,
}

impl ServerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerType::Tftp => "TFTP",
            ServerType::Ftp => "FTP",
            ServerType::Sftp => "SFTP",
            ServerType::Local => "LOCAL",
        }
    }
}

impl FromStr for ServerType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TFTP" => Ok(ServerType::Tftp),
            "FTP" => Ok(ServerType::Ftp),
            "SFTP" => Ok(ServerType::Sftp),
            "LOCAL" => Ok(ServerType::Local),
            other => Err(anyhow::anyhow!("Unknown server type '{}'", other)),
        }
    }
}

// ============================================================================
// Comma separated list columns
// ============================================================================

pub fn join_list(items: &[String]) -> String {
    items.join(",")
}

pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Hosts and how to reach them
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JumpHost {
    pub id: i64,
    pub hostname: String,
    pub host_or_ip: String,
    pub port_number: Option<u16>,
    pub connection_type: ConnectionType,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

/// Decrypted connection parameters of a host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionParam {
    pub host_id: i64,
    /// Comma separated, each entry is a console server or management address
    pub host_or_ip: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub connection_type: ConnectionType,
    /// Comma separated ports, paired with every address
    pub port_number: String,
    pub jump_host_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: i64,
    pub hostname: String,
    pub platform: String,
    pub region_id: Option<i64>,
    pub roles: String,
    pub software_platform: Option<String>,
    pub software_version: Option<String>,
    pub inventory_retrieval_status: Option<String>,
    pub created_time: DateTime<Utc>,
    pub connection: ConnectionParam,
    pub jump_host: Option<JumpHost>,
}

#[derive(Debug, Clone)]
pub struct NewHost {
    pub hostname: String,
    pub platform: String,
    pub region_id: Option<i64>,
    pub roles: String,
    pub host_or_ip: String,
    pub username: String,
    pub password: String,
    pub connection_type: ConnectionType,
    pub port_number: String,
    pub jump_host_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewJumpHost {
    pub hostname: String,
    pub host_or_ip: String,
    pub port_number: Option<u16>,
    pub connection_type: ConnectionType,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
}

// ============================================================================
// Install jobs
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallJob {
    pub id: i64,
    pub host_id: i64,
    pub install_action: InstallAction,
    pub scheduled_time: DateTime<Utc>,
    pub packages: Vec<String>,
    pub server_id: Option<i64>,
    pub server_directory: String,
    pub custom_command_profile_ids: Vec<i64>,
    pub dependency: Option<i64>,
    pub status: JobStatus,
    pub status_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub session_log: Option<String>,
    pub created_by: String,
    pub created_time: DateTime<Utc>,
    pub trace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInstallJob {
    pub host_id: i64,
    pub install_action: InstallAction,
    pub scheduled_time: DateTime<Utc>,
    pub packages: Vec<String>,
    pub server_id: Option<i64>,
    #[serde(default)]
    pub server_directory: String,
    #[serde(default)]
    pub custom_command_profile_ids: Vec<i64>,
    pub dependency: Option<i64>,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallJobHistory {
    pub id: i64,
    pub install_job_id: i64,
    pub host_id: i64,
    pub install_action: InstallAction,
    pub scheduled_time: DateTime<Utc>,
    pub packages: Vec<String>,
    pub server_id: Option<i64>,
    pub server_directory: String,
    pub dependency: Option<i64>,
    pub status: JobStatus,
    pub status_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub operation_id: i64,
    pub session_log: Option<String>,
    pub created_by: String,
    pub trace: Option<String>,
}

// ============================================================================
// Inventory
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryJob {
    pub id: i64,
    pub host_id: i64,
    pub pending_submit: bool,
    pub status: Option<JobStatus>,
    pub status_time: Option<DateTime<Utc>>,
    pub last_successful_time: Option<DateTime<Utc>>,
    pub session_log: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryJobHistory {
    pub id: i64,
    pub host_id: i64,
    pub status: JobStatus,
    pub status_time: DateTime<Utc>,
    pub session_log: Option<String>,
    pub trace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Package {
    pub location: String,
    pub name: String,
    pub state: PackageState,
}

// ============================================================================
// Singleton options and auxiliary tables
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemOption {
    pub inventory_threads: i64,
    pub install_threads: i64,
    pub download_threads: i64,
    pub can_schedule: bool,
    pub can_install: bool,
    pub enable_email_notify: bool,
    pub enable_inventory: bool,
    pub inventory_hour: i64,
    pub inventory_history_per_host: i64,
    pub install_history_per_host: i64,
    pub total_system_logs: i64,
    pub base_url: String,
}

impl Default for SystemOption {
    fn default() -> Self {
        Self {
            inventory_threads: 5,
            install_threads: 10,
            download_threads: 5,
            can_schedule: true,
            can_install: true,
            enable_email_notify: false,
            enable_inventory: true,
            inventory_hour: 0,
            inventory_history_per_host: 10,
            install_history_per_host: 1000,
            total_system_logs: 10000,
            base_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRepository {
    pub id: i64,
    pub hostname: String,
    pub server_type: ServerType,
    pub server_url: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub server_directory: String,
    pub vrf: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewServerRepository {
    pub hostname: String,
    pub server_type: ServerType,
    pub server_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub server_directory: String,
    pub vrf: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomCommandProfile {
    pub id: i64,
    pub profile_name: String,
    pub command_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftwareProfile {
    pub id: i64,
    pub name: String,
    pub packages: Vec<String>,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailJob {
    pub id: i64,
    pub recipients: String,
    pub subject: String,
    pub message: String,
    pub status: JobStatus,
    pub status_time: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemLog {
    pub id: i64,
    pub level: String,
    pub msg: String,
    pub trace: Option<String>,
    pub created_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_columns_ignore_blank_entries() {
        assert_eq!(
            split_list("a.pie, b.pie,,"),
            vec!["a.pie".to_string(), "b.pie".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn install_action_parses_its_display_name() {
        for action in InstallAction::ALL {
            assert_eq!(action.as_str().parse::<InstallAction>().unwrap(), action);
        }
        assert!("Reload".parse::<InstallAction>().is_err());
    }

    #[test]
    fn committed_state_keeps_activity() {
        assert_eq!(PackageState::Active.committed(), PackageState::ActiveCommitted);
        assert_eq!(PackageState::Inactive.committed(), PackageState::InactiveCommitted);
    }
}
