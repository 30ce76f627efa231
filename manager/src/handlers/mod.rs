//! Action handlers: drive a device session through one install action or an
//! inventory run, and leave a transcript plus a final status line behind.

pub mod capture;
pub mod install;
pub mod migrate;
pub mod platform;
pub mod repository;

pub use platform::{open_session, ClassicXr, Exr, Platform, PlatformRegistry};
pub use repository::{masked_repository_url, repository_url};

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::constants::device::{
    COMMAND_TIMEOUT, CONNECT_TIMEOUT, INSTALL_OPERATION_TIMEOUT, INSTALL_POLL_INTERVAL,
};
use crate::database::{Database, Host, InstallAction, InstallJob};
use crate::device::DeviceSession;
use crate::errors::DeviceError;
use crate::transport::{Dialer, SessionLog};

/// Everything a handler may touch while it runs
pub struct InstallContext {
    pub host: Host,
    /// `None` for inventory runs
    pub install_job: Option<InstallJob>,
    pub job_store: Arc<Database>,
    pub session_log: SessionLog,
    pub inactive_cli: Option<String>,
    pub active_cli: Option<String>,
    pub committed_cli: Option<String>,
    pub operation_id: i64,
    pub success: bool,
}

impl InstallContext {
    pub fn new(
        host: Host,
        install_job: Option<InstallJob>,
        job_store: Arc<Database>,
        session_log: SessionLog,
    ) -> Self {
        Self {
            host,
            install_job,
            job_store,
            session_log,
            inactive_cli: None,
            active_cli: None,
            committed_cli: None,
            operation_id: -1,
            success: false,
        }
    }

    pub fn job(&self) -> Result<&InstallJob, DeviceError> {
        self.install_job
            .as_ref()
            .ok_or_else(|| DeviceError::operation_failed("no install job in context"))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DeviceTimeouts {
    pub connect: Duration,
    pub command: Duration,
    /// Pause between `show install request` polls
    pub poll_interval: Duration,
    /// Longest a device install operation may take
    pub operation: Duration,
}

impl Default for DeviceTimeouts {
    fn default() -> Self {
        Self {
            connect: CONNECT_TIMEOUT,
            command: COMMAND_TIMEOUT,
            poll_interval: INSTALL_POLL_INTERVAL,
            operation: INSTALL_OPERATION_TIMEOUT,
        }
    }
}

impl DeviceTimeouts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect: Duration::from_secs(config.connect_timeout_seconds),
            command: Duration::from_secs(config.command_timeout_seconds),
            poll_interval: Duration::from_secs(config.install_poll_interval_seconds),
            operation: Duration::from_secs(config.install_operation_timeout_seconds),
        }
    }
}

/// Process-wide handler dependencies, shared by every work unit
#[derive(Clone)]
pub struct HandlerEnv {
    pub dialer: Arc<dyn Dialer>,
    pub timeouts: DeviceTimeouts,
    pub default_username: String,
    pub default_password: String,
    pub session_log_root: PathBuf,
}

/// `Kind: message` for traces and the final status line
pub fn failure_reason(err: &anyhow::Error) -> String {
    match err.downcast_ref::<DeviceError>() {
        Some(device) => format!("{}: {}", device.kind(), device),
        None => format!("StoreError: {:#}", err),
    }
}

fn is_transient(err: &anyhow::Error) -> bool {
    err.downcast_ref::<DeviceError>()
        .map(DeviceError::is_transient)
        .unwrap_or(false)
}

/// Connects, allowing one more attempt after a transient failure
async fn connect_with_retry(
    platform: &dyn Platform,
    env: &HandlerEnv,
    ctx: &InstallContext,
) -> Result<DeviceSession> {
    match platform.connect(env, ctx).await {
        Ok(session) => Ok(session),
        Err(e) if e.is_transient() => {
            warn!("Connect to {} failed ({}), retrying once", ctx.host.hostname, e);
            ctx.session_log
                .note(&format!("RETRY after {}", e.kind()))
                .await;
            Ok(platform.connect(env, ctx).await?)
        }
        Err(e) => Err(e.into()),
    }
}

async fn finish(ctx: &mut InstallContext, session: Option<&mut DeviceSession>, result: &Result<()>) {
    if let Some(session) = session {
        session.disconnect().await;
    }
    match result {
        Ok(()) => {
            ctx.success = true;
            ctx.session_log.finish("STATUS: completed").await;
        }
        Err(e) => {
            ctx.success = false;
            ctx.session_log
                .finish(&format!("STATUS: failed {}", failure_reason(e)))
                .await;
        }
    }
}

/// Runs one install action end to end. Success refreshes the inventory; an
/// inventory problem after a successful action is only logged.
#[instrument(skip_all, fields(host = %ctx.host.hostname, action = %action))]
pub async fn run_action(
    platform: &dyn Platform,
    env: &HandlerEnv,
    ctx: &mut InstallContext,
    action: InstallAction,
) -> Result<()> {
    ctx.session_log
        .note(&format!(
            "ACTION {} on {} ({})",
            action,
            ctx.host.hostname,
            platform.name()
        ))
        .await;

    let mut session = match connect_with_retry(platform, env, ctx).await {
        Ok(session) => session,
        Err(e) => {
            let result = Err(e);
            finish(ctx, None, &result).await;
            return result;
        }
    };

    let result = platform.perform_action(action, &mut session, env, ctx).await;

    if let Err(e) = &result {
        if is_transient(e) && !session.link_lost() {
            // Recover the prompt so the session can be closed cleanly
            if session.resync().await.is_err() {
                session.mark_disconnected();
            }
        }
    }

    if result.is_ok() {
        match platform.gather_inventory(&mut session, ctx).await {
            Ok(inventory) => info!(
                "Inventory refreshed after {}: {} packages",
                action,
                inventory.packages.len()
            ),
            Err(e) => {
                warn!("Inventory after {} failed: {:#}", action, e);
                ctx.session_log
                    .note(&format!("inventory failed: {}", failure_reason(&e)))
                    .await;
            }
        }
    }

    if let Err(e) = &result {
        warn!("{} on {} failed: {}", action, ctx.host.hostname, failure_reason(e));
    }
    finish(ctx, Some(&mut session), &result).await;
    result
}

/// Inventory-only run used by the inventory work unit
#[instrument(skip_all, fields(host = %ctx.host.hostname))]
pub async fn run_inventory(
    platform: &dyn Platform,
    env: &HandlerEnv,
    ctx: &mut InstallContext,
) -> Result<()> {
    ctx.session_log
        .note(&format!("INVENTORY on {} ({})", ctx.host.hostname, platform.name()))
        .await;

    let mut session = match connect_with_retry(platform, env, ctx).await {
        Ok(session) => session,
        Err(e) => {
            let result = Err(e);
            finish(ctx, None, &result).await;
            return result;
        }
    };

    let result = platform
        .gather_inventory(&mut session, ctx)
        .await
        .map(|inventory| {
            info!(
                "Inventory of {} has {} packages",
                ctx.host.hostname,
                inventory.packages.len()
            )
        });
    finish(ctx, Some(&mut session), &result).await;
    result
}
