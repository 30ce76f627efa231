//! Install add, activate, deactivate, remove and commit.
//!
//! Each command is started with `async` and then tracked with
//! `show install request` until the device reports no operation in progress.
//! The operation log decides success. An activation may reload the router;
//! the session is then reopened and tracking continues on the new one.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use super::{masked_repository_url, open_session, repository_url, HandlerEnv, InstallContext};
use crate::constants::commands::{
    ADD_ERROR_MARKER, CLEAR_CONFIG_INCONSISTENCY, COMPLETED_WITH_FAILURE, CONTINUES_ASYNC,
    INCONSISTENCY_CLEARED, INSTALLABLE_EXTENSIONS, INSTALL_COMMIT, NO_INSTALL_REQUESTS,
    SHOW_INSTALL_ACTIVE, SHOW_INSTALL_INACTIVE, SHOW_INSTALL_REQUEST, SHOW_PLATFORM,
};
use crate::device::DeviceSession;
use crate::errors::DeviceError;

/// Device operation id announced as `Install operation 12 '...' started`
pub fn parse_operation_id(output: &str) -> Option<i64> {
    let re = Regex::new(r"Install operation (\d+) '").ok()?;
    re.captures(output)?.get(1)?.as_str().parse().ok()
}

/// Packages `install add` accepts, by file extension
pub fn installable_packages(packages: &[String]) -> Vec<String> {
    packages
        .iter()
        .filter(|p| INSTALLABLE_EXTENSIONS.iter().any(|ext| p.ends_with(ext)))
        .cloned()
        .collect()
}

/// `asr9k-px-4.3.2.CSCtz89449.pie` becomes `asr9k-px-4.3.2.CSCtz89449`
pub fn strip_extension(package: &str) -> &str {
    INSTALLABLE_EXTENSIONS
        .iter()
        .find_map(|ext| package.strip_suffix(ext))
        .unwrap_or(package)
}

fn first_line_with<'a>(output: &'a str, needle: &'a str) -> &'a str {
    output
        .lines()
        .find(|line| line.contains(needle))
        .map(str::trim)
        .unwrap_or(needle)
}

/// Polls `show install request` until no install operation is running
pub async fn wait_for_install(
    session: &mut DeviceSession,
    env: &HandlerEnv,
    prefix: &str,
) -> Result<(), DeviceError> {
    let deadline = Instant::now() + env.timeouts.operation;
    let progress = Regex::new(r"The operation is (\d+)% complete")
        .map_err(|e| DeviceError::operation_failed(e.to_string()))?;
    let command = format!("{}{}", prefix, SHOW_INSTALL_REQUEST);

    loop {
        let output = session.execute(&command).await?;
        if output.contains(NO_INSTALL_REQUESTS) {
            return Ok(());
        }
        if let Some(percent) = progress.captures(&output).and_then(|c| c.get(1)) {
            info!("Install operation {}% complete", percent.as_str());
            session
                .session_log()
                .note(&format!("progress {}%", percent.as_str()))
                .await;
        }
        if Instant::now() >= deadline {
            return Err(DeviceError::operation_failed(format!(
                "install operation still running after {}s",
                env.timeouts.operation.as_secs()
            )));
        }
        tokio::time::sleep(env.timeouts.poll_interval).await;
    }
}

/// Reads the operation log and fails on a reported failure
async fn check_operation_log(
    session: &mut DeviceSession,
    prefix: &str,
    operation_id: i64,
) -> Result<String, DeviceError> {
    let log = session
        .execute(&format!("{}show install log {} detail", prefix, operation_id))
        .await?;
    let failed = format!("Install operation {} failed", operation_id);
    if log.contains(&failed) {
        return Err(DeviceError::operation_failed(first_line_with(&log, &failed)));
    }
    if log.contains(COMPLETED_WITH_FAILURE) {
        return Err(DeviceError::operation_failed(first_line_with(
            &log,
            COMPLETED_WITH_FAILURE,
        )));
    }
    Ok(log)
}

/// Sends an async install command and rejects immediate errors. Returns
/// the device operation id if one was announced.
async fn start_install_command(
    session: &mut DeviceSession,
    command: &str,
) -> Result<Option<i64>, DeviceError> {
    let output = session.execute(command).await?;
    if output.contains(ADD_ERROR_MARKER) {
        return Err(DeviceError::operation_failed(first_line_with(
            &output,
            ADD_ERROR_MARKER.trim(),
        )));
    }

    let operation_id = parse_operation_id(&output);
    if operation_id.is_none() && !output.contains(CONTINUES_ASYNC) {
        return Err(DeviceError::operation_failed(format!(
            "device did not start the operation: {}",
            output.trim()
        )));
    }
    Ok(operation_id)
}

/// Starts an install command, waits for the operation and checks its log
async fn run_install_command(
    session: &mut DeviceSession,
    env: &HandlerEnv,
    prefix: &str,
    command: &str,
) -> Result<Option<i64>, DeviceError> {
    let operation_id = start_install_command(session, command).await?;
    wait_for_install(session, env, prefix).await?;
    if let Some(id) = operation_id {
        check_operation_log(session, prefix, id).await?;
    }
    Ok(operation_id)
}

/// Package names of a `show install ... summary`, location prefix removed
pub fn summary_package_names(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty()
                && !line.ends_with(':')
                && !line.contains(char::is_whitespace)
                && line.contains('-')
        })
        .map(|line| {
            line.rsplit_once(':')
                .map(|(_, name)| name)
                .unwrap_or(line)
                .to_string()
        })
        .collect()
}

/// The device lists `asr9k-px-5.3.3.CSCuz12345` as
/// `asr9k-px-5.3.3.CSCuz12345-1.0.0` once added
fn same_package(onbox: &str, requested: &str) -> bool {
    onbox == requested
        || onbox
            .strip_prefix(requested)
            .is_some_and(|rest| rest.starts_with('-'))
}

/// Requested packages that still need activation. Active ones are skipped;
/// every other one must be in the inactive list.
pub fn select_for_activation(
    requested: &[&str],
    active_summary: &str,
    inactive_summary: &str,
) -> Result<Vec<String>, DeviceError> {
    let active = summary_package_names(active_summary);
    let inactive = summary_package_names(inactive_summary);

    let mut pending = Vec::new();
    let mut missing = Vec::new();
    for name in requested {
        if active.iter().any(|p| same_package(p, name)) {
            info!("{} is already active", name);
        } else if inactive.iter().any(|p| same_package(p, name)) {
            pending.push(name.to_string());
        } else {
            missing.push(*name);
        }
    }

    if !missing.is_empty() {
        return Err(DeviceError::operation_failed(format!(
            "not in the inactive package list: {}",
            missing.join(" ")
        )));
    }
    Ok(pending)
}

/// `Install method: Parallel Reload` from an operation log
pub fn install_method(log: &str) -> Option<String> {
    let re = Regex::new(r"Install [Mm]ethod:\s*([^\n]+)").ok()?;
    Some(re.captures(log)?.get(1)?.as_str().trim().to_string())
}

/// Every CPU row of `show platform` has reached its running state
pub fn nodes_running(show_platform: &str) -> bool {
    let Ok(node) = Regex::new(r"^\s*\d+/\S+") else {
        return false;
    };
    let cpus: Vec<&str> = show_platform
        .lines()
        .filter(|line| node.is_match(line) && line.contains("CPU"))
        .collect();
    !cpus.is_empty()
        && cpus.iter().all(|row| {
            row.contains("IOS XR RUN") || row.contains("OPERATIONAL") || row.contains("FINAL Band")
        })
}

/// Waits for the router to come back after a reload and swaps the new
/// session in. A rejected login is not retried.
async fn reconnect_after_reload(
    session: &mut DeviceSession,
    env: &HandlerEnv,
    ctx: &InstallContext,
) -> Result<(), DeviceError> {
    warn!("{} is reloading, waiting to reconnect", ctx.host.hostname);
    ctx.session_log.note("RELOAD in progress, reconnecting").await;
    let prompts = session.prompts().clone();
    session.disconnect().await;

    let deadline = Instant::now() + env.timeouts.operation;
    loop {
        tokio::time::sleep(env.timeouts.poll_interval).await;
        match open_session(env, ctx, &prompts).await {
            Ok(reopened) => {
                info!("{} is back after reload", ctx.host.hostname);
                *session = reopened;
                return Ok(());
            }
            Err(e @ DeviceError::AuthFailed { .. }) => return Err(e),
            Err(e) if Instant::now() >= deadline => {
                return Err(DeviceError::operation_failed(format!(
                    "device not reachable after reload: {}",
                    e
                )))
            }
            Err(e) => info!("{} not back yet: {}", ctx.host.hostname, e),
        }
    }
}

async fn wait_for_nodes(
    session: &mut DeviceSession,
    env: &HandlerEnv,
    prefix: &str,
) -> Result<(), DeviceError> {
    let deadline = Instant::now() + env.timeouts.operation;
    let command = format!("{}{}", prefix, SHOW_PLATFORM);
    loop {
        let output = session.execute(&command).await?;
        if nodes_running(&output) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(DeviceError::operation_failed(
                "nodes did not come up after reload",
            ));
        }
        tokio::time::sleep(env.timeouts.poll_interval).await;
    }
}

/// Tracks an activation to the end. A session dropped by the reload is
/// reopened and tracking resumes; a reload reported by the operation log
/// is waited out the same way. After a reload every node must be running.
async fn watch_activation(
    session: &mut DeviceSession,
    env: &HandlerEnv,
    ctx: &InstallContext,
    prefix: &str,
    operation_id: Option<i64>,
) -> Result<(), DeviceError> {
    let mut reloaded = false;
    if let Err(e) = wait_for_install(session, env, prefix).await {
        if !matches!(e, DeviceError::Disconnected) && !session.link_lost() {
            return Err(e);
        }
        reconnect_after_reload(session, env, ctx).await?;
        reloaded = true;
        wait_for_install(session, env, prefix).await?;
    }

    if let Some(id) = operation_id {
        let log = check_operation_log(session, prefix, id).await?;
        if let Some(method) = install_method(&log) {
            info!("Operation {} used install method {}", id, method);
            if method.eq_ignore_ascii_case("Parallel Reload") && !reloaded {
                reconnect_after_reload(session, env, ctx).await?;
                reloaded = true;
            }
        }
    }

    if reloaded {
        wait_for_nodes(session, env, prefix).await?;
    }
    Ok(())
}

/// Clears a configuration inconsistency left by an activation, in exec
/// and in admin mode. A device that does not confirm is only logged.
pub async fn clear_config_inconsistency(session: &mut DeviceSession) -> Result<(), DeviceError> {
    let exec = session.execute(CLEAR_CONFIG_INCONSISTENCY).await?;
    let admin = session.execute_elevated(CLEAR_CONFIG_INCONSISTENCY).await?;
    for (mode, output) in [("exec", &exec), ("admin", &admin)] {
        if !output.contains(INCONSISTENCY_CLEARED) {
            warn!("Configuration inconsistency not cleared in {} mode", mode);
            session
                .session_log()
                .note(&format!("inconsistency not cleared in {} mode", mode))
                .await;
        }
    }
    Ok(())
}

#[instrument(skip_all, fields(host = %ctx.host.hostname))]
pub async fn install_add(
    session: &mut DeviceSession,
    env: &HandlerEnv,
    ctx: &mut InstallContext,
    prefix: &str,
) -> Result<()> {
    let job = ctx.job()?.clone();
    let packages = installable_packages(&job.packages);
    if packages.is_empty() {
        return Err(DeviceError::operation_failed("no installable packages selected").into());
    }

    let server_id = job
        .server_id
        .ok_or_else(|| anyhow!("Install Add job {} has no server repository", job.id))?;
    let repo = ctx
        .job_store
        .get_server_repository(server_id)
        .await?
        .with_context(|| format!("Server repository {} not found", server_id))?;

    if let Some(password) = repo.password.as_deref().filter(|p| !p.is_empty()) {
        ctx.session_log.add_mask(password).await;
    }
    let url = repository_url(&repo, &job.server_directory);
    info!(
        "Adding {} package(s) from {}",
        packages.len(),
        masked_repository_url(&repo, &job.server_directory)
    );

    let command = format!(
        "{}install add source {} {} async",
        prefix,
        url,
        packages.join(" ")
    );
    let operation_id = run_install_command(session, env, prefix, &command)
        .await?
        .ok_or_else(|| DeviceError::operation_failed("install add returned no operation id"))?;

    ctx.operation_id = operation_id;
    info!("Install add finished as operation {}", operation_id);
    Ok(())
}

/// Activates by the linked add operation when there is one, by package
/// names otherwise. Packages already active are not activated again.
#[instrument(skip_all, fields(host = %ctx.host.hostname))]
pub async fn activate(
    session: &mut DeviceSession,
    env: &HandlerEnv,
    ctx: &mut InstallContext,
    prefix: &str,
) -> Result<()> {
    let job = ctx.job()?.clone();
    let command = if ctx.operation_id > 0 {
        format!(
            "{}install activate id {} prompt-level none async",
            prefix, ctx.operation_id
        )
    } else {
        let requested: Vec<&str> = job.packages.iter().map(|p| strip_extension(p)).collect();
        if requested.is_empty() {
            return Err(DeviceError::operation_failed("no packages to activate").into());
        }
        let active = session
            .execute(&format!("{}{}", prefix, SHOW_INSTALL_ACTIVE))
            .await?;
        let inactive = session
            .execute(&format!("{}{}", prefix, SHOW_INSTALL_INACTIVE))
            .await?;
        let names = select_for_activation(&requested, &active, &inactive)?;
        if names.is_empty() {
            info!("Every requested package is already active");
            ctx.session_log
                .note("SKIP activate, packages already active")
                .await;
            return Ok(());
        }
        format!(
            "{}install activate {} prompt-level none async",
            prefix,
            names.join(" ")
        )
    };

    let operation_id = start_install_command(session, &command).await?;
    watch_activation(session, env, ctx, prefix, operation_id).await?;
    clear_config_inconsistency(session).await?;
    Ok(())
}

/// `verb` is `deactivate` or `remove`
pub async fn deactivate_or_remove(
    session: &mut DeviceSession,
    env: &HandlerEnv,
    ctx: &mut InstallContext,
    prefix: &str,
    verb: &str,
) -> Result<()> {
    let job = ctx.job()?.clone();
    let names: Vec<&str> = job.packages.iter().map(|p| strip_extension(p)).collect();
    if names.is_empty() {
        return Err(DeviceError::operation_failed(format!("no packages to {}", verb)).into());
    }
    let command = format!(
        "{}install {} {} prompt-level none async",
        prefix,
        verb,
        names.join(" ")
    );
    run_install_command(session, env, prefix, &command).await?;
    Ok(())
}

pub async fn commit(
    session: &mut DeviceSession,
    env: &HandlerEnv,
    _ctx: &mut InstallContext,
    prefix: &str,
) -> Result<()> {
    let command = format!("{}{}", prefix, INSTALL_COMMIT);
    let output = session.execute(&command).await?;
    if output.contains(ADD_ERROR_MARKER) {
        return Err(DeviceError::operation_failed(output.trim().to_string()).into());
    }
    wait_for_install(session, env, prefix).await?;
    if let Some(id) = parse_operation_id(&output) {
        check_operation_log(session, prefix, id).await?;
    }
    Ok(())
}
