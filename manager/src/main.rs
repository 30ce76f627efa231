use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use upgrade_manager::config::{ConfigManager, ConfigStore, SecretsLoader};
use upgrade_manager::constants::scheduling::HOUSEKEEPING_SCHEDULE;
use upgrade_manager::database::Database;
use upgrade_manager::handlers::{DeviceTimeouts, HandlerEnv, PlatformRegistry};
use upgrade_manager::scheduler::{Dispatcher, Housekeeper, HousekeepingScheduler, Pools};
use upgrade_manager::services::{EmailSender, LocalFileTransport, Notifier, WebhookEmailSender};
use upgrade_manager::transport::NetworkDialer;
use upgrade_manager::web::{start_web_server, AppState};
use upgrade_manager::work_units::UnitContext;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with reduced verbosity
    let env_filter = EnvFilter::from_default_env()
        .add_directive("upgrade_manager=info".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("tokio_cron_scheduler=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("sqlx=warn".parse()?)
        .add_directive("russh=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting Upgrade Manager v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_manager = ConfigManager::new("config".to_string()).await?;
    let config = config_manager.get_current_config();
    let timezone = config.timezone()?;
    info!(
        "Configuration loaded: {} seeded hosts, dispatch every {}s, timezone {}",
        config.hosts.len(),
        config.dispatch_interval_seconds,
        timezone
    );

    let secrets = SecretsLoader::load(Path::new("config/secrets.toml"))?;

    // Initialize database
    if let Some(parent) = Path::new(&config.database_path).parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let database = Arc::new(Database::new(&config.database_path, secrets.credential_key()).await?);
    info!("Database initialized at {}", config.database_path);

    let import = ConfigStore::new(database.clone()).import_hosts(&config).await?;
    info!(
        "Host seeds imported: {} created, {} updated, {} skipped",
        import.hosts_created, import.hosts_updated, import.hosts_skipped
    );

    // Pools are sized once from the options row
    let options = database.get_system_option().await?;
    let pools = Arc::new(Pools::from_options(&options));
    info!(
        "Worker pools started: install={}, inventory={}, email={}",
        pools.install.size(),
        pools.inventory.size(),
        pools.email.size()
    );

    let session_log_root = PathBuf::from(&config.session_log_dir);
    tokio::fs::create_dir_all(&session_log_root)
        .await
        .with_context(|| format!("Failed to create {:?}", session_log_root))?;

    let (default_username, default_password) = match secrets.default_credentials() {
        Some(credentials) => (credentials.username.clone(), credentials.password.clone()),
        None => (String::new(), String::new()),
    };
    let env = HandlerEnv {
        dialer: Arc::new(NetworkDialer),
        timeouts: DeviceTimeouts::from_config(&config),
        default_username,
        default_password,
        session_log_root: session_log_root.clone(),
    };

    let mailer = Arc::new(WebhookEmailSender::new(config.mail_webhook_url.clone())?);
    if !mailer.is_enabled() {
        warn!("No mail_webhook_url configured, email jobs stay queued");
    }

    let units = UnitContext {
        db: database.clone(),
        env,
        platforms: Arc::new(PlatformRegistry::new()?),
        notifier: Notifier::new(database.clone()),
        mailer,
    };

    // Daily retention pass
    let housekeeper = Housekeeper::new(database.clone(), session_log_root);
    let housekeeping_scheduler = HousekeepingScheduler::new(housekeeper.clone()).await?;
    housekeeping_scheduler.start(HOUSEKEEPING_SCHEDULE).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher = Arc::new(Dispatcher::new(
        units,
        pools.clone(),
        housekeeper,
        timezone,
        config.dispatch_interval(),
    ));
    let dispatcher_task = tokio::spawn(dispatcher.run(shutdown_rx.clone()));
    info!("Dispatcher started");

    let state = AppState::new(
        config.clone(),
        database.clone(),
        pools.clone(),
        Arc::new(LocalFileTransport::new(&config.repository_root)),
    )?;
    let web_task = tokio::spawn(start_web_server(state, shutdown_rx));

    info!("Upgrade Manager started successfully");
    info!("Web interface available at http://{}:{}", config.host, config.port);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested, waiting for running work units");

    let _ = shutdown_tx.send(true);
    if let Err(e) = dispatcher_task.await {
        error!("Dispatcher task ended abnormally: {}", e);
    }
    pools.shutdown().await;

    match web_task.await {
        Ok(Err(e)) => error!("Web server error: {:#}", e),
        Err(e) => error!("Web server task ended abnormally: {}", e),
        Ok(Ok(())) => {}
    }

    info!("Upgrade Manager stopped");
    Ok(())
}
