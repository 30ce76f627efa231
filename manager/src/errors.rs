//! Error types for the upgrade manager
//!
//! `DeviceError` carries the failure kinds of the device path (transport, session,
//! handlers, parser). `ManagerError` wraps everything surfaced through the admin API.

use std::fmt;
use std::time::Duration;

/// Failure kinds raised while talking to a device
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeviceError {
    /// DNS, TCP or hop-level failure before a session exists
    #[error("connection to {target} failed: {reason}")]
    ConnectFailed { target: String, reason: String },

    /// Credentials rejected by a hop or by the device
    #[error("authentication failed on {target}")]
    AuthFailed { target: String },

    /// No expected pattern arrived in time; the terminal is desynchronized
    #[error("timed out after {}s waiting for {waiting_for}", .after.as_secs())]
    Timeout { waiting_for: String, after: Duration },

    /// The device rejected the command text itself
    #[error("command '{command}' rejected by device: {marker}")]
    CommandSyntaxError { command: String, marker: String },

    /// The device accepted the command but reported the operation failed
    #[error("device operation failed: {reason}")]
    DeviceOperationFailed { reason: String },

    /// Inventory output did not have the expected shape
    #[error("unable to parse {what}")]
    ParserError { what: String },

    /// Remote side closed the stream
    #[error("session closed by remote end")]
    Disconnected,

    /// A previous read timed out and the prompt was not recovered yet
    #[error("terminal is desynchronized, resync or disconnect first")]
    Desynchronized,
}

impl DeviceError {
    /// Short kind name recorded in traces and session logs
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceError::ConnectFailed { .. } => "ConnectFailed",
            DeviceError::AuthFailed { .. } => "AuthFailed",
            DeviceError::Timeout { .. } => "Timeout",
            DeviceError::CommandSyntaxError { .. } => "CommandSyntaxError",
            DeviceError::DeviceOperationFailed { .. } => "DeviceOperationFailed",
            DeviceError::ParserError { .. } => "ParserError",
            DeviceError::Disconnected => "Disconnected",
            DeviceError::Desynchronized => "Desynchronized",
        }
    }

    /// Errors after which one reconnect is allowed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DeviceError::Timeout { .. } | DeviceError::Disconnected | DeviceError::Desynchronized
        )
    }

    pub fn operation_failed(reason: impl Into<String>) -> Self {
        DeviceError::DeviceOperationFailed {
            reason: reason.into(),
        }
    }

    pub fn parser(what: impl Into<String>) -> Self {
        DeviceError::ParserError { what: what.into() }
    }
}

/// Main error type for the admin surface
#[derive(Debug)]
pub enum ManagerError {
    /// Configuration-related errors
    Config(ConfigError),

    /// Job store failures
    Store(String),

    /// Device path failures
    Device(DeviceError),

    /// Scheduling refused (toggles, busy keys, missing references)
    Scheduling(SchedulingError),

    /// Other errors with context
    Other(String),
}

/// Configuration error variants
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to load configuration file
    LoadFailed { path: String, reason: String },

    /// Invalid configuration value
    InvalidValue { field: String, reason: String },

    /// Configuration parsing error
    ParseError { reason: String },
}

/// Scheduling error variants
#[derive(Debug)]
pub enum SchedulingError {
    /// `can_schedule` is off
    SchedulingDisabled,

    /// Host referenced by a job does not exist
    HostNotFound { host: String },

    /// Dependency id does not name an install job or history row
    UnknownDependency { job_id: i64 },

    /// Host still referenced by install jobs or history rows
    HostInUse { host: String, references: i64 },
}

impl fmt::Display for ManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerError::Config(e) => write!(f, "Configuration error: {}", e),
            ManagerError::Store(msg) => write!(f, "Store error: {}", msg),
            ManagerError::Device(e) => write!(f, "Device error: {}", e),
            ManagerError::Scheduling(e) => write!(f, "Scheduling error: {}", e),
            ManagerError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::LoadFailed { path, reason } => {
                write!(f, "Failed to load config from '{}': {}", path, reason)
            }
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
            ConfigError::ParseError { reason } => {
                write!(f, "Failed to parse config: {}", reason)
            }
        }
    }
}

impl fmt::Display for SchedulingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingError::SchedulingDisabled => {
                write!(f, "Scheduling is disabled by the administrator")
            }
            SchedulingError::HostNotFound { host } => write!(f, "Host '{}' not found", host),
            SchedulingError::UnknownDependency { job_id } => {
                write!(f, "Dependency job {} does not exist", job_id)
            }
            SchedulingError::HostInUse { host, references } => write!(
                f,
                "Host '{}' is still referenced by {} job or history record(s)",
                host, references
            ),
        }
    }
}

impl std::error::Error for ManagerError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for SchedulingError {}

/// Recovers the typed error behind an `anyhow` chain; anything else keeps
/// its full context as text
impl From<anyhow::Error> for ManagerError {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<SchedulingError>() {
            Ok(e) => return ManagerError::Scheduling(e),
            Err(err) => err,
        };
        let err = match err.downcast::<DeviceError>() {
            Ok(e) => return ManagerError::Device(e),
            Err(err) => err,
        };
        let err = match err.downcast::<ConfigError>() {
            Ok(e) => return ManagerError::Config(e),
            Err(err) => err,
        };
        if err.downcast_ref::<sqlx::Error>().is_some() {
            return ManagerError::Store(format!("{:#}", err));
        }
        ManagerError::Other(format!("{:#}", err))
    }
}

impl From<sqlx::Error> for ManagerError {
    fn from(err: sqlx::Error) -> Self {
        ManagerError::Store(err.to_string())
    }
}

impl From<ConfigError> for ManagerError {
    fn from(err: ConfigError) -> Self {
        ManagerError::Config(err)
    }
}

impl From<DeviceError> for ManagerError {
    fn from(err: DeviceError) -> Self {
        ManagerError::Device(err)
    }
}

impl From<SchedulingError> for ManagerError {
    fn from(err: SchedulingError) -> Self {
        ManagerError::Scheduling(err)
    }
}
