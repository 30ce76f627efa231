//! Work units queued on the executor pools.

pub mod email;
pub mod install;
pub mod inventory;

pub use email::EmailWorkUnit;
pub use install::InstallWorkUnit;
pub use inventory::InventoryWorkUnit;

use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

use crate::database::{Database, InstallAction};
use crate::handlers::{HandlerEnv, PlatformRegistry};
use crate::services::{EmailSender, Notifier};
use crate::transport::session_log::sanitize_file_name;

/// What every work unit needs besides its own id
#[derive(Clone)]
pub struct UnitContext {
    pub db: Arc<Database>,
    pub env: HandlerEnv,
    pub platforms: Arc<PlatformRegistry>,
    pub notifier: Notifier,
    pub mailer: Arc<dyn EmailSender>,
}

impl UnitContext {
    /// Store failures outside a job row still leave a trace in the system log
    pub(crate) async fn record_error(&self, msg: &str, trace: Option<&str>) {
        if let Err(e) = self.db.add_system_log("ERROR", msg, trace).await {
            warn!("Could not write system log '{}': {}", msg, e);
        }
    }
}

/// `<hostname>/<action>-<job id>-<timestamp>` relative to the session log root
pub fn install_log_path(hostname: &str, action: InstallAction, job_id: i64) -> String {
    format!(
        "{}/{}-{}-{}",
        sanitize_file_name(hostname),
        sanitize_file_name(action.as_str()),
        job_id,
        Utc::now().format("%Y_%m_%d_%H_%M_%S")
    )
}

pub fn inventory_log_path(hostname: &str) -> String {
    format!(
        "{}/inventory-{}",
        sanitize_file_name(hostname),
        Utc::now().format("%Y_%m_%d_%H_%M_%S")
    )
}
