//! Platform capability interface and the registry keyed by host platform tag.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{capture, install, migrate, HandlerEnv, InstallContext};
use crate::constants::commands::{
    SHOW_INSTALL_ACTIVE, SHOW_INSTALL_COMMITTED, SHOW_INSTALL_INACTIVE,
};
use crate::database::InstallAction;
use crate::device::{DeviceSession, PromptSet};
use crate::errors::DeviceError;
use crate::parser::{ExrPackageParser, Inventory, PackageParser, XrPackageParser};
use crate::transport::{describe_chain, hop_chains, Terminal};

/// Opens a session to the host, trying every address/port combination in
/// turn. Authentication failures are not retried on other addresses.
pub async fn open_session(
    env: &HandlerEnv,
    ctx: &InstallContext,
    prompts: &PromptSet,
) -> Result<DeviceSession, DeviceError> {
    let chains = hop_chains(&ctx.host, &env.default_username, &env.default_password);
    if chains.is_empty() {
        return Err(DeviceError::ConnectFailed {
            target: ctx.host.hostname.clone(),
            reason: "no address configured".to_string(),
        });
    }

    let mut last_error = None;
    for chain in chains {
        debug!("Trying {}", describe_chain(&chain));
        let terminal = Terminal::new(
            chain,
            env.dialer.clone(),
            ctx.session_log.clone(),
            env.timeouts.connect,
        );
        let mut session = DeviceSession::new(terminal, prompts.clone(), env.timeouts.command);
        match session.connect().await {
            Ok(()) => return Ok(session),
            Err(e @ DeviceError::AuthFailed { .. }) => return Err(e),
            Err(e) => {
                warn!("Connection attempt to {} failed: {}", ctx.host.hostname, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or(DeviceError::Disconnected))
}

#[async_trait]
pub trait Platform: Send + Sync {
    fn name(&self) -> &str;

    fn prompts(&self) -> &PromptSet;

    fn parser(&self) -> &dyn PackageParser;

    /// `"admin "` where install commands live under admin mode
    fn install_prefix(&self) -> &'static str;

    /// Whether the pre-migrate/migrate flow applies to this family
    fn can_migrate(&self) -> bool {
        true
    }

    /// inactive, active, committed
    fn inventory_commands(&self) -> [String; 3] {
        let prefix = self.install_prefix();
        [
            format!("{}{}", prefix, SHOW_INSTALL_INACTIVE),
            format!("{}{}", prefix, SHOW_INSTALL_ACTIVE),
            format!("{}{}", prefix, SHOW_INSTALL_COMMITTED),
        ]
    }

    async fn connect(
        &self,
        env: &HandlerEnv,
        ctx: &InstallContext,
    ) -> Result<DeviceSession, DeviceError> {
        open_session(env, ctx, self.prompts()).await
    }

    /// Reads the three package lists, parses them and swaps the stored
    /// package set atomically.
    async fn gather_inventory(
        &self,
        session: &mut DeviceSession,
        ctx: &mut InstallContext,
    ) -> Result<Inventory> {
        let [inactive_cmd, active_cmd, committed_cmd] = self.inventory_commands();
        let inactive = session.execute(&inactive_cmd).await?;
        let active = session.execute(&active_cmd).await?;
        let committed = session.execute(&committed_cmd).await?;

        let inventory = self.parser().parse(&inactive, &active, &committed)?;
        ctx.inactive_cli = Some(inactive);
        ctx.active_cli = Some(active);
        ctx.committed_cli = Some(committed);

        ctx.job_store
            .replace_packages(
                ctx.host.id,
                &inventory.packages,
                inventory.software_platform.as_deref(),
                inventory.software_version.as_deref(),
            )
            .await
            .context("Failed to store inventory")?;
        if let Some(platform) = &inventory.software_platform {
            ctx.host.software_platform = Some(platform.clone());
        }
        if let Some(version) = &inventory.software_version {
            ctx.host.software_version = Some(version.clone());
        }
        Ok(inventory)
    }

    async fn perform_action(
        &self,
        action: InstallAction,
        session: &mut DeviceSession,
        env: &HandlerEnv,
        ctx: &mut InstallContext,
    ) -> Result<()> {
        let prefix = self.install_prefix();
        match action {
            InstallAction::PreUpgrade => capture::pre_upgrade(session, ctx, prefix).await,
            InstallAction::PostUpgrade => capture::post_upgrade(session, env, ctx, prefix).await,
            InstallAction::InstallAdd => install::install_add(session, env, ctx, prefix).await,
            InstallAction::Activate => install::activate(session, env, ctx, prefix).await,
            InstallAction::Deactivate => {
                install::deactivate_or_remove(session, env, ctx, prefix, "deactivate").await
            }
            InstallAction::Remove => {
                install::deactivate_or_remove(session, env, ctx, prefix, "remove").await
            }
            InstallAction::Commit => install::commit(session, env, ctx, prefix).await,
            InstallAction::PreMigrate => {
                migrate::pre_migrate(session, ctx, self.can_migrate()).await
            }
            InstallAction::Migrate => migrate::migrate(session, env, ctx, self.can_migrate()).await,
            InstallAction::PostMigrate => migrate::post_migrate(session, ctx).await,
            InstallAction::MigrationAudit => migrate::migration_audit(session, ctx).await,
            InstallAction::AllForMigrate => {
                migrate::pre_migrate(session, ctx, self.can_migrate()).await?;
                migrate::migrate(session, env, ctx, self.can_migrate()).await?;
                migrate::post_migrate(session, ctx).await
            }
        }
    }
}

/// Classic IOS-XR: ASR9K and CRS
pub struct ClassicXr {
    tag: String,
    prompts: PromptSet,
    parser: XrPackageParser,
}

impl ClassicXr {
    pub fn new(tag: &str) -> Result<Self> {
        Ok(Self {
            tag: tag.to_string(),
            prompts: PromptSet::classic_xr()?,
            parser: XrPackageParser,
        })
    }
}

#[async_trait]
impl Platform for ClassicXr {
    fn name(&self) -> &str {
        &self.tag
    }

    fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    fn parser(&self) -> &dyn PackageParser {
        &self.parser
    }

    fn install_prefix(&self) -> &'static str {
        "admin "
    }
}

/// eXR family (NCS6K): install commands run in exec mode
pub struct Exr {
    tag: String,
    prompts: PromptSet,
    parser: ExrPackageParser,
}

impl Exr {
    pub fn new(tag: &str) -> Result<Self> {
        Ok(Self {
            tag: tag.to_string(),
            prompts: PromptSet::exr()?,
            parser: ExrPackageParser,
        })
    }
}

#[async_trait]
impl Platform for Exr {
    fn name(&self) -> &str {
        &self.tag
    }

    fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    fn parser(&self) -> &dyn PackageParser {
        &self.parser
    }

    fn install_prefix(&self) -> &'static str {
        ""
    }

    fn can_migrate(&self) -> bool {
        false
    }

    fn inventory_commands(&self) -> [String; 3] {
        [
            "show install inactive".to_string(),
            "show install active".to_string(),
            "show install committed".to_string(),
        ]
    }
}

/// Platform implementations by upper-case host platform tag
pub struct PlatformRegistry {
    platforms: HashMap<String, Arc<dyn Platform>>,
    default: Arc<dyn Platform>,
}

impl PlatformRegistry {
    pub fn new() -> Result<Self> {
        let mut platforms: HashMap<String, Arc<dyn Platform>> = HashMap::new();
        platforms.insert("ASR9K".to_string(), Arc::new(ClassicXr::new("ASR9K")?));
        platforms.insert("CRS".to_string(), Arc::new(ClassicXr::new("CRS")?));
        platforms.insert("NCS6K".to_string(), Arc::new(Exr::new("NCS6K")?));
        Ok(Self {
            platforms,
            default: Arc::new(ClassicXr::new("IOS-XR")?),
        })
    }

    pub fn register(&mut self, tag: &str, platform: Arc<dyn Platform>) {
        self.platforms.insert(tag.to_ascii_uppercase(), platform);
    }

    /// Unknown tags get the classic IOS-XR implementation
    pub fn get(&self, tag: &str) -> Arc<dyn Platform> {
        match self.platforms.get(&tag.to_ascii_uppercase()) {
            Some(platform) => platform.clone(),
            None => {
                warn!("No handler for platform '{}', using IOS-XR defaults", tag);
                self.default.clone()
            }
        }
    }

    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.platforms.keys().cloned().collect();
        tags.sort();
        tags
    }
}
