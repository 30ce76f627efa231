pub mod manager;
pub mod secrets;
pub mod store;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use manager::ConfigManager;
pub use secrets::SecretsLoader;
pub use store::ConfigStore;

use crate::constants::{device, scheduling};
use crate::errors::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_session_log_dir")]
    pub session_log_dir: String,
    #[serde(default = "default_dispatch_interval")]
    pub dispatch_interval_seconds: u64,
    /// IANA zone name used to evaluate the inventory hour
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_poll_interval")]
    pub install_poll_interval_seconds: u64,
    #[serde(default = "default_operation_timeout")]
    pub install_operation_timeout_seconds: u64,
    #[serde(default)]
    pub mail_webhook_url: String,
    #[serde(default = "default_repository_root")]
    pub repository_root: String,
    // Populated from the host seed files next to main.toml
    #[serde(skip)]
    pub hosts: HashMap<String, HostSeed>,
}

fn default_database_path() -> String {
    "data/upgrade.db".to_string()
}

fn default_session_log_dir() -> String {
    "data/session_logs".to_string()
}

fn default_dispatch_interval() -> u64 {
    scheduling::DEFAULT_DISPATCH_INTERVAL.as_secs()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_command_timeout() -> u64 {
    device::COMMAND_TIMEOUT.as_secs()
}

fn default_connect_timeout() -> u64 {
    device::CONNECT_TIMEOUT.as_secs()
}

fn default_poll_interval() -> u64 {
    device::INSTALL_POLL_INTERVAL.as_secs()
}

fn default_operation_timeout() -> u64 {
    device::INSTALL_OPERATION_TIMEOUT.as_secs()
}

fn default_repository_root() -> String {
    "data/repository".to_string()
}

impl Config {
    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch_interval_seconds.max(1))
    }

    pub fn timezone(&self) -> Result<chrono_tz::Tz, ConfigError> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "timezone".to_string(),
                reason: format!("'{}': {}", self.timezone, e),
            })
    }
}

/// One `[[hosts]]` entry of a seed file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSeed {
    pub name: String,
    pub platform: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Comma separated list, each entry dialed with every port
    pub host_or_ip: String,
    #[serde(default)]
    pub port_number: Option<String>,
    #[serde(default = "default_connection_type")]
    pub connection_type: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub jump_host: Option<JumpHostSeed>,
}

fn default_connection_type() -> String {
    "telnet".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JumpHostSeed {
    pub hostname: String,
    pub host_or_ip: String,
    #[serde(default)]
    pub port_number: Option<u16>,
    #[serde(default = "default_connection_type")]
    pub connection_type: String,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// A seed file groups hosts, usually one file per region
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSeedFile {
    #[serde(default)]
    pub hosts: Vec<HostSeed>,
}
