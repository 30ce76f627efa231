//! Pre/post upgrade command captures and the post-upgrade diff.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::{HandlerEnv, InstallContext};
use crate::constants::session_log::DIFF_SUFFIX;
use crate::database::{InstallAction, JobStatus};
use crate::device::DeviceSession;
use crate::errors::DeviceError;
use crate::transport::session_log::sanitize_file_name;

/// File name a command capture is stored under
pub fn capture_file_name(command: &str) -> String {
    format!("{}.txt", sanitize_file_name(command))
}

/// Line diff: `-` for lines only in `before`, `+` for lines only in `after`.
/// Order follows the input; repeated lines are compared as a set.
pub fn line_diff(before: &str, after: &str) -> String {
    let old: HashSet<&str> = before.lines().collect();
    let new: HashSet<&str> = after.lines().collect();

    let mut out = String::new();
    for line in before.lines().filter(|l| !new.contains(l)) {
        out.push('-');
        out.push_str(line);
        out.push('\n');
    }
    for line in after.lines().filter(|l| !old.contains(l)) {
        out.push('+');
        out.push_str(line);
        out.push('\n');
    }
    out
}

async fn capture_commands(ctx: &InstallContext, prefix: &str) -> Result<Vec<String>> {
    let mut commands = vec![
        "show running-config".to_string(),
        format!("{}show install active summary", prefix),
        "show platform".to_string(),
        "show redundancy".to_string(),
    ];

    let profile_ids = ctx
        .install_job
        .as_ref()
        .map(|job| job.custom_command_profile_ids.clone())
        .unwrap_or_default();
    if !profile_ids.is_empty() {
        let profiles = ctx
            .job_store
            .get_custom_command_profiles(&profile_ids)
            .await
            .context("Failed to load custom command profiles")?;
        for profile in profiles {
            debug!("Adding {} command(s) from profile {}", profile.command_list.len(), profile.profile_name);
            for command in profile.command_list {
                if !commands.contains(&command) {
                    commands.push(command);
                }
            }
        }
    }
    Ok(commands)
}

/// Runs every capture command and stores its output next to the transcript.
/// A command the device rejects is recorded as such and the run goes on.
async fn capture(
    session: &mut DeviceSession,
    ctx: &InstallContext,
    prefix: &str,
) -> Result<Vec<(String, String)>> {
    let mut captured = Vec::new();
    for command in capture_commands(ctx, prefix).await? {
        let output = match session.execute(&command).await {
            Ok(output) => output,
            Err(DeviceError::CommandSyntaxError { marker, .. }) => {
                warn!("Capture command '{}' rejected by {}", command, ctx.host.hostname);
                format!("{}\n{}\n", command, marker)
            }
            Err(e) => return Err(e.into()),
        };
        let file_name = capture_file_name(&command);
        ctx.session_log.write_artifact(&file_name, &output).await?;
        captured.push((file_name, output));
    }
    Ok(captured)
}

pub async fn pre_upgrade(
    session: &mut DeviceSession,
    ctx: &mut InstallContext,
    prefix: &str,
) -> Result<()> {
    let captured = capture(session, ctx, prefix).await?;
    info!("Captured {} command(s) before upgrade", captured.len());
    Ok(())
}

/// Directory holding the captures of the host's last completed PreUpgrade
async fn pre_upgrade_dir(env: &HandlerEnv, ctx: &InstallContext) -> Result<Option<PathBuf>> {
    let history = ctx
        .job_store
        .latest_history_for_action(ctx.host.id, InstallAction::PreUpgrade)
        .await?;
    Ok(history
        .filter(|h| h.status == JobStatus::Completed)
        .and_then(|h| h.session_log)
        .map(|path| env.session_log_root.join(path)))
}

pub async fn post_upgrade(
    session: &mut DeviceSession,
    env: &HandlerEnv,
    ctx: &mut InstallContext,
    prefix: &str,
) -> Result<()> {
    let captured = capture(session, ctx, prefix).await?;

    let Some(baseline) = pre_upgrade_dir(env, ctx).await? else {
        info!("No completed PreUpgrade for {}, nothing to compare", ctx.host.hostname);
        ctx.session_log.note("no PreUpgrade capture to compare with").await;
        return Ok(());
    };

    let mut diffs = 0;
    for (file_name, output) in &captured {
        let before = match tokio::fs::read_to_string(baseline.join(file_name)).await {
            Ok(content) => content,
            Err(e) => {
                debug!("No PreUpgrade capture {}: {}", file_name, e);
                continue;
            }
        };
        let diff = line_diff(&before, output);
        ctx.session_log
            .write_artifact(&format!("{}{}", file_name, DIFF_SUFFIX), &diff)
            .await?;
        diffs += 1;
    }
    info!("Wrote {} diff(s) against {:?}", diffs, baseline);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_marks_removed_and_added_lines() {
        let before = "hostname r1\ninterface Gi0\n shutdown\n";
        let after = "hostname r1\ninterface Gi0\n no shutdown\n";
        assert_eq!(line_diff(before, after), "- shutdown\n+ no shutdown\n");
        assert_eq!(line_diff(before, before), "");
    }

    #[test]
    fn capture_names_are_file_safe() {
        assert_eq!(
            capture_file_name("admin show install active summary"),
            "admin_show_install_active_summary.txt"
        );
    }
}
