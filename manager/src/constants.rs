//! Central repository for the magic numbers of the scheduler and the device layer.
//!
//! Constants are grouped by the component that owns them so the transport,
//! session and handler code never carries inline literals.

use std::time::Duration;

/// Dispatcher and housekeeping cadence
pub mod scheduling {
    use super::Duration;

    /// Default tick of the install and inventory loops
    pub const DEFAULT_DISPATCH_INTERVAL: Duration = Duration::from_secs(10);

    /// Housekeeping cron (sec min hour day month dow), daily at 00:30
    pub const HOUSEKEEPING_SCHEDULE: &str = "0 30 0 * * *";

    /// System logs are trimmed once they exceed the limit by this factor
    pub const SYSTEM_LOG_TRIM_FACTOR: f64 = 1.1;
}

/// Worker pool bounds
pub mod pools {
    use super::Duration;

    pub const MIN_WORKERS: usize = 2;
    pub const MAX_WORKERS: usize = 50;

    /// Email pool size, not configurable through SystemOption
    pub const EMAIL_WORKERS: usize = 2;

    /// Upper bound on how long an idle worker waits before re-scanning a
    /// queue whose items are all blocked on busy keys
    pub const BLOCKED_RESCAN: Duration = Duration::from_millis(200);
}

/// Terminal transport and session timeouts
pub mod device {
    use super::Duration;

    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
    pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

    /// Interval between `show install request` polls
    pub const INSTALL_POLL_INTERVAL: Duration = Duration::from_secs(30);

    /// Longest a single device install operation may run
    pub const INSTALL_OPERATION_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

    /// Password prompts tolerated before the login is declared failed
    pub const MAX_PASSWORD_ATTEMPTS: usize = 3;

    /// `send("")` attempts made to get back to the exec prompt after a timeout
    pub const RESYNC_ATTEMPTS: usize = 2;

    pub const DEFAULT_TELNET_PORT: u16 = 23;
    pub const DEFAULT_SSH_PORT: u16 = 22;
}

/// IOS-XR command strings and the output markers the handlers key on
pub mod commands {
    pub const SHOW_INSTALL_ACTIVE: &str = "show install active summary";
    pub const SHOW_INSTALL_INACTIVE: &str = "show install inactive summary";
    pub const SHOW_INSTALL_COMMITTED: &str = "show install committed summary";
    pub const SHOW_INSTALL_REQUEST: &str = "show install request";
    pub const INSTALL_COMMIT: &str = "install commit";

    pub const NO_INSTALL_REQUESTS: &str = "There are no install requests in operation";
    pub const CONTINUES_ASYNC: &str = "The install operation will continue asynchronously";
    pub const ADD_ERROR_MARKER: &str = "Error:  ";
    pub const COMPLETED_SUCCESSFULLY: &str = "completed successfully";
    pub const COMPLETED_WITH_FAILURE: &str = "completed with failure";
    pub const COMMIT_FAILED: &str = "% Failed to commit";

    pub const CLEAR_CONFIG_INCONSISTENCY: &str = "clear configuration inconsistency";
    pub const INCONSISTENCY_CLEARED: &str = "...OK";
    pub const SHOW_PLATFORM: &str = "show platform";

    /// Package file extensions accepted by `install add`
    pub const INSTALLABLE_EXTENSIONS: &[&str] = &[".pie", ".tar", ".rpm", ".smu"];
}

/// Session log file names
pub mod session_log {
    pub const TRANSCRIPT_FILE: &str = "session.log";
    pub const DIFF_SUFFIX: &str = ".diff";
    pub const MASK: &str = "******";
}
