//! Job store for the upgrade manager.
//!
//! This module provides SQLite persistence for:
//! - Hosts, their connection params, jump hosts and regions
//! - Install jobs and their append-only history
//! - Inventory jobs, inventory history and the per-host package set
//! - The singleton system options row, email jobs and the system log
//!
//! The module is organized into submodules:
//! - `records` - All record types (entities)
//! - `credentials` - Password encryption at rest
//! - `hosts` - Hosts, jump hosts, regions and users
//! - `install_jobs` - Install job lifecycle, archive and dependency lookups
//! - `inventory` - Inventory jobs and atomic package replacement
//! - `options` - System options and the system log
//! - `email` - Email job queue
//! - `repositories` - Server repositories and command/software profiles
//! - `housekeeping` - Retention pruning

mod credentials;
mod email;
mod hosts;
mod housekeeping;
mod install_jobs;
mod inventory;
mod options;
mod records;
mod repositories;

pub use credentials::CredentialCipher;
pub use housekeeping::PruneReport;
pub use records::*;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;
use tracing::{error, info, warn};

pub struct Database {
    pool: Pool<Sqlite>,
    cipher: CredentialCipher,
}

const TABLES: &[(&str, &str)] = &[
    (
        "regions",
        r#"
        CREATE TABLE IF NOT EXISTS regions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    ),
    (
        "users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT
        )
        "#,
    ),
    (
        "jump_hosts",
        r#"
        CREATE TABLE IF NOT EXISTS jump_hosts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hostname TEXT NOT NULL UNIQUE,
            host_or_ip TEXT NOT NULL,
            port_number INTEGER,
            connection_type TEXT NOT NULL,
            username TEXT NOT NULL,
            password TEXT NOT NULL
        )
        "#,
    ),
    (
        "hosts",
        r#"
        CREATE TABLE IF NOT EXISTS hosts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hostname TEXT NOT NULL UNIQUE,
            platform TEXT NOT NULL,
            region_id INTEGER REFERENCES regions(id),
            roles TEXT NOT NULL DEFAULT '',
            software_platform TEXT,
            software_version TEXT,
            inventory_retrieval_status TEXT,
            created_time DATETIME NOT NULL
        )
        "#,
    ),
    (
        "connection_params",
        r#"
        CREATE TABLE IF NOT EXISTS connection_params (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            host_id INTEGER NOT NULL UNIQUE REFERENCES hosts(id),
            host_or_ip TEXT NOT NULL,
            username TEXT NOT NULL,
            password TEXT NOT NULL,
            connection_type TEXT NOT NULL,
            port_number TEXT NOT NULL DEFAULT '',
            jump_host_id INTEGER REFERENCES jump_hosts(id)
        )
        "#,
    ),
    (
        "server_repositories",
        r#"
        CREATE TABLE IF NOT EXISTS server_repositories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hostname TEXT NOT NULL UNIQUE,
            server_type TEXT NOT NULL,
            server_url TEXT NOT NULL,
            username TEXT,
            password TEXT,
            server_directory TEXT NOT NULL DEFAULT '',
            vrf TEXT
        )
        "#,
    ),
    (
        "custom_command_profiles",
        r#"
        CREATE TABLE IF NOT EXISTS custom_command_profiles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            profile_name TEXT NOT NULL UNIQUE,
            command_list TEXT NOT NULL
        )
        "#,
    ),
    (
        "software_profiles",
        r#"
        CREATE TABLE IF NOT EXISTS software_profiles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            packages TEXT NOT NULL,
            created_by TEXT NOT NULL
        )
        "#,
    ),
    (
        "install_jobs",
        r#"
        CREATE TABLE IF NOT EXISTS install_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            host_id INTEGER NOT NULL REFERENCES hosts(id),
            install_action TEXT NOT NULL,
            scheduled_time DATETIME NOT NULL,
            packages TEXT NOT NULL DEFAULT '',
            server_id INTEGER,
            server_directory TEXT NOT NULL DEFAULT '',
            custom_command_profile_ids TEXT NOT NULL DEFAULT '',
            dependency INTEGER,
            status TEXT NOT NULL,
            status_time DATETIME,
            start_time DATETIME,
            session_log TEXT,
            created_by TEXT NOT NULL,
            created_time DATETIME NOT NULL,
            trace TEXT
        )
        "#,
    ),
    (
        "install_job_history",
        r#"
        CREATE TABLE IF NOT EXISTS install_job_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            install_job_id INTEGER NOT NULL,
            host_id INTEGER NOT NULL,
            install_action TEXT NOT NULL,
            scheduled_time DATETIME NOT NULL,
            packages TEXT NOT NULL DEFAULT '',
            server_id INTEGER,
            server_directory TEXT NOT NULL DEFAULT '',
            dependency INTEGER,
            status TEXT NOT NULL,
            status_time DATETIME NOT NULL,
            start_time DATETIME,
            operation_id INTEGER NOT NULL DEFAULT -1,
            session_log TEXT,
            created_by TEXT NOT NULL,
            trace TEXT
        )
        "#,
    ),
    (
        "inventory_jobs",
        r#"
        CREATE TABLE IF NOT EXISTS inventory_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            host_id INTEGER NOT NULL UNIQUE REFERENCES hosts(id),
            pending_submit BOOLEAN NOT NULL DEFAULT 1,
            status TEXT,
            status_time DATETIME,
            last_successful_time DATETIME,
            session_log TEXT
        )
        "#,
    ),
    (
        "inventory_job_history",
        r#"
        CREATE TABLE IF NOT EXISTS inventory_job_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            host_id INTEGER NOT NULL,
            status TEXT NOT NULL,
            status_time DATETIME NOT NULL,
            session_log TEXT,
            trace TEXT
        )
        "#,
    ),
    (
        "packages",
        r#"
        CREATE TABLE IF NOT EXISTS packages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            host_id INTEGER NOT NULL REFERENCES hosts(id),
            location TEXT NOT NULL,
            name TEXT NOT NULL,
            state TEXT NOT NULL
        )
        "#,
    ),
    (
        "system_options",
        r#"
        CREATE TABLE IF NOT EXISTS system_options (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            inventory_threads INTEGER NOT NULL,
            install_threads INTEGER NOT NULL,
            download_threads INTEGER NOT NULL,
            can_schedule BOOLEAN NOT NULL,
            can_install BOOLEAN NOT NULL,
            enable_email_notify BOOLEAN NOT NULL,
            enable_inventory BOOLEAN NOT NULL,
            inventory_hour INTEGER NOT NULL,
            inventory_history_per_host INTEGER NOT NULL,
            install_history_per_host INTEGER NOT NULL,
            total_system_logs INTEGER NOT NULL,
            base_url TEXT NOT NULL
        )
        "#,
    ),
    (
        "email_jobs",
        r#"
        CREATE TABLE IF NOT EXISTS email_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recipients TEXT NOT NULL,
            subject TEXT NOT NULL,
            message TEXT NOT NULL,
            status TEXT NOT NULL,
            status_time DATETIME NOT NULL,
            created_by TEXT NOT NULL
        )
        "#,
    ),
    (
        "system_logs",
        r#"
        CREATE TABLE IF NOT EXISTS system_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            level TEXT NOT NULL,
            msg TEXT NOT NULL,
            trace TEXT,
            created_time DATETIME NOT NULL
        )
        "#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_install_jobs_status ON install_jobs(status, scheduled_time)",
    "CREATE INDEX IF NOT EXISTS idx_install_history_host ON install_job_history(host_id, status_time DESC)",
    "CREATE INDEX IF NOT EXISTS idx_install_history_job ON install_job_history(install_job_id)",
    "CREATE INDEX IF NOT EXISTS idx_inventory_history_host ON inventory_job_history(host_id, status_time DESC)",
    "CREATE INDEX IF NOT EXISTS idx_packages_host ON packages(host_id)",
];

impl Database {
    /// Expose pool for integration test queries
    #[allow(dead_code)]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn new(database_path: &str, credential_key: &str) -> Result<Self> {
        info!("=== Starting job store initialization ===");
        info!("Database path: {}", database_path);

        if let Some(parent) = Path::new(database_path).parent() {
            info!("Ensuring parent directory exists: {:?}", parent);
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                error!("FAILED to create parent directory {:?}: {}", parent, e);
                return Err(e.into());
            }
        }

        let database_url = format!("sqlite:{}?mode=rwc", database_path);
        info!("Connecting to database with URL: {}", database_url);

        let pool = match SqlitePool::connect(&database_url).await {
            Ok(pool) => {
                info!("Successfully connected to SQLite database");
                pool
            }
            Err(e) => {
                error!("FAILED to connect to database: {}", e);
                error!("   Database path: {}", database_path);
                return Err(e.into());
            }
        };

        let database = Self {
            pool,
            cipher: CredentialCipher::new(credential_key),
        };
        database.initialize().await?;

        // Jobs left Processing by a previous run will never finish on their own
        match database.fail_interrupted_install_jobs().await {
            Ok(0) => info!("No interrupted install jobs found"),
            Ok(count) => warn!("Marked {} interrupted install jobs as failed", count),
            Err(e) => {
                error!("Failed to recover interrupted install jobs: {}", e);
                warn!("Continuing with startup despite recovery failure");
            }
        }

        info!("=== Job store initialization completed successfully ===");
        Ok(database)
    }

    /// Single-connection in-memory store, used by tests and dry runs
    pub async fn in_memory(credential_key: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let database = Self {
            pool,
            cipher: CredentialCipher::new(credential_key),
        };
        database.initialize().await?;
        Ok(database)
    }

    async fn initialize(&self) -> Result<()> {
        info!("Starting table initialization...");
        if let Err(e) = self.initialize_tables().await {
            error!("CRITICAL: table initialization failed: {}", e);
            return Err(e);
        }
        self.ensure_system_option().await?;
        self.test_database().await
    }

    async fn initialize_tables(&self) -> Result<()> {
        for (step, (name, sql)) in TABLES.iter().enumerate() {
            info!("Step {}: Creating {} table...", step + 1, name);
            if let Err(e) = sqlx::query(sql).execute(&self.pool).await {
                error!("FAILED to create {} table: {}", name, e);
                error!("SQL was: {}", sql);
                return Err(e.into());
            }
        }

        for sql in INDEXES {
            if let Err(e) = sqlx::query(sql).execute(&self.pool).await {
                error!("FAILED to create index: {}", e);
                return Err(e.into());
            }
        }
        info!("{} tables and {} indexes ready", TABLES.len(), INDEXES.len());
        Ok(())
    }

    async fn test_database(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM system_options")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    pub(crate) fn cipher(&self) -> &CredentialCipher {
        &self.cipher
    }
}
