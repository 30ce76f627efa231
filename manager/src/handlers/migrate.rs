//! Classic IOS-XR to eXR migration: readiness check, the migration itself,
//! and the checks that run on the migrated device.

use anyhow::{Context, Result};
use regex::Regex;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use super::{open_session, HandlerEnv, InstallContext};
use crate::device::{ConfigExit, DeviceSession, PromptSet};
use crate::errors::DeviceError;
use crate::transport::session_log::sanitize_file_name;

const MIGRATION_SCRIPT: &str = "ksh /harddiskb:/migrate_to_eXR";
const RELOAD_ALL: &str = "admin reload location all";
/// Configuration the migration script converted for eXR
const MIGRATED_CONFIG: &str = "harddisk:/iosxr.cfg";

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).with_context(|| format!("invalid pattern {}", pattern))
}

/// `show version` of a device running eXR (IOS XR 6.x)
pub fn reports_exr(show_version: &str) -> bool {
    Regex::new(r"Version\s+6\.")
        .map(|re| re.is_match(show_version))
        .unwrap_or(false)
}

/// Every node row of `show platform vm` must have reached `FINAL Band`
pub fn all_nodes_operational(show_platform_vm: &str) -> bool {
    let Ok(node) = Regex::new(r"^\s*\d+/\S+") else {
        return false;
    };
    let rows: Vec<&str> = show_platform_vm
        .lines()
        .filter(|line| node.is_match(line))
        .collect();
    !rows.is_empty() && rows.iter().all(|row| row.contains("FINAL Band"))
}

async fn capture(session: &mut DeviceSession, ctx: &InstallContext, command: &str) -> Result<String> {
    let output = session.execute(command).await?;
    ctx.session_log
        .write_artifact(&format!("{}.txt", sanitize_file_name(command)), &output)
        .await?;
    Ok(output)
}

pub async fn pre_migrate(
    session: &mut DeviceSession,
    ctx: &mut InstallContext,
    can_migrate: bool,
) -> Result<()> {
    capture(session, ctx, "show version").await?;
    capture(session, ctx, "admin show platform").await?;
    let active = capture(session, ctx, "show install active summary").await?;

    let is_px = ctx.host.software_platform.as_deref() == Some("asr9k-px") || active.contains("-px-");
    if !can_migrate || !is_px {
        return Err(DeviceError::operation_failed(format!(
            "{} does not support migration to eXR",
            ctx.host.hostname
        ))
        .into());
    }
    info!("{} is ready for migration", ctx.host.hostname);
    Ok(())
}

/// Waits for the reloaded device to accept a session with an eXR prompt
async fn reconnect_as_exr(env: &HandlerEnv, ctx: &InstallContext) -> Result<DeviceSession> {
    let prompts = PromptSet::exr()?;
    let deadline = Instant::now() + env.timeouts.operation;

    loop {
        tokio::time::sleep(env.timeouts.poll_interval).await;
        match open_session(env, ctx, &prompts).await {
            Ok(mut session) => {
                let version = session.execute("show version").await?;
                if reports_exr(&version) {
                    return Ok(session);
                }
                session.disconnect().await;
                return Err(DeviceError::operation_failed(
                    "device came back without eXR after migration",
                )
                .into());
            }
            Err(e @ DeviceError::AuthFailed { .. }) => return Err(e.into()),
            Err(e) => {
                if Instant::now() >= deadline {
                    return Err(DeviceError::operation_failed(format!(
                        "device not reachable after reload: {}",
                        e
                    ))
                    .into());
                }
                info!("{} not back yet: {}", ctx.host.hostname, e);
            }
        }
    }
}

#[instrument(skip_all, fields(host = %ctx.host.hostname))]
pub async fn migrate(
    session: &mut DeviceSession,
    env: &HandlerEnv,
    ctx: &mut InstallContext,
    can_migrate: bool,
) -> Result<()> {
    if !can_migrate {
        return Err(DeviceError::operation_failed("platform cannot be migrated").into());
    }
    let shell = compile(r"(?:\A|\n)#\s*\z")?;
    let confirm = compile(r"\[confirm\]|proceed with reload\?")?;

    let found = session
        .execute_expecting("run", &[&shell], session.command_timeout())
        .await?;
    if found.index != 0 {
        return Err(DeviceError::operation_failed("could not open the device shell").into());
    }
    let script = session
        .execute_expecting(MIGRATION_SCRIPT, &[&shell], env.timeouts.operation)
        .await?;
    if script.before.contains("Error") {
        let reason = script
            .before
            .lines()
            .find(|l| l.contains("Error"))
            .unwrap_or("migration script failed")
            .trim()
            .to_string();
        return Err(DeviceError::operation_failed(reason).into());
    }
    session.execute("exit").await?;

    let reload = session
        .execute_expecting(RELOAD_ALL, &[&confirm], session.command_timeout())
        .await?;
    if reload.index == 0 {
        session.answer("").await?;
    } else {
        warn!("Reload did not ask for confirmation");
    }
    ctx.session_log.note("RELOAD issued, waiting for eXR").await;
    session.disconnect().await;

    *session = reconnect_as_exr(env, ctx).await?;
    info!("{} is running eXR", ctx.host.hostname);
    Ok(())
}

/// Loads the converted configuration into a candidate and commits it.
/// Nothing is done when the migration left no configuration behind.
async fn load_migrated_config(session: &mut DeviceSession, ctx: &InstallContext) -> Result<()> {
    let listing = session.execute(&format!("dir {}", MIGRATED_CONFIG)).await?;
    if listing.contains("No such file") {
        info!("No migrated configuration on {}", ctx.host.hostname);
        return Ok(());
    }

    session.enter_config().await?;
    let loaded = session.execute(&format!("load {}", MIGRATED_CONFIG)).await?;
    if loaded.contains("Couldn't") || loaded.to_lowercase().contains("error") {
        session.leave_config(ConfigExit::Abort).await?;
        let reason = loaded
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("load failed")
            .to_string();
        return Err(DeviceError::operation_failed(format!(
            "could not load {}: {}",
            MIGRATED_CONFIG, reason
        ))
        .into());
    }

    session.leave_config(ConfigExit::Commit).await?;
    ctx.session_log
        .note(&format!("COMMITTED {}", MIGRATED_CONFIG))
        .await;
    info!("Migrated configuration committed on {}", ctx.host.hostname);
    Ok(())
}

pub async fn post_migrate(session: &mut DeviceSession, ctx: &mut InstallContext) -> Result<()> {
    let platform = capture(session, ctx, "show platform vm").await?;
    capture(session, ctx, "show install active").await?;
    if !all_nodes_operational(&platform) {
        return Err(DeviceError::operation_failed("not all nodes are operational").into());
    }
    load_migrated_config(session, ctx).await
}

pub async fn migration_audit(session: &mut DeviceSession, ctx: &mut InstallContext) -> Result<()> {
    let version = capture(session, ctx, "show version").await?;
    if !reports_exr(&version) {
        return Err(DeviceError::operation_failed(format!(
            "{} is not running IOS XR 6.x",
            ctx.host.hostname
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_vm_needs_every_node_in_final_band() {
        let ready = "\
Node location       Card type          VM IP address   VM status     Band
0/RSP0/CPU0         A9K-RSP880-SE      192.0.0.4       FINAL Band    Ready
0/RSP1/CPU0         A9K-RSP880-SE      192.0.16.4      FINAL Band    Ready
";
        assert!(all_nodes_operational(ready));
        let booting = ready.replacen("FINAL Band", "BOOTING", 1);
        assert!(!all_nodes_operational(&booting));
        assert!(!all_nodes_operational("no nodes"));
    }

    #[test]
    fn exr_is_recognized_from_show_version() {
        assert!(reports_exr("Cisco IOS XR Software, Version 6.1.2"));
        assert!(!reports_exr("Cisco IOS XR Software, Version 5.3.3[Default]"));
    }
}
