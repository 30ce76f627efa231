use super::{Config, HostSeedFile};
use crate::errors::ConfigError;
use anyhow::{anyhow, Result};
use glob::glob;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

pub struct ConfigManager {
    current_config: Arc<Config>,
    config_dir: String,
}

impl ConfigManager {
    pub async fn new(config_dir: String) -> Result<Self> {
        let config = Self::load_configuration(&config_dir).await?;
        Ok(Self {
            current_config: Arc::new(config),
            config_dir,
        })
    }

    pub fn get_current_config(&self) -> Arc<Config> {
        self.current_config.clone()
    }

    pub fn config_dir(&self) -> &str {
        &self.config_dir
    }

    async fn load_configuration(config_dir: &str) -> Result<Config> {
        let main_config_path = format!("{}/main.toml", config_dir);
        let main_config_content =
            fs::read_to_string(&main_config_path)
                .await
                .map_err(|e| ConfigError::LoadFailed {
                    path: main_config_path.clone(),
                    reason: e.to_string(),
                })?;

        let mut config: Config =
            toml::from_str(&main_config_content).map_err(|e| ConfigError::ParseError {
                reason: format!("{}: {}", main_config_path, e),
            })?;

        config.timezone()?;

        // Every other toml file is a host seed file, except the secrets
        let pattern = format!("{}/*.toml", config_dir);
        let mut all_hosts = HashMap::new();

        for entry in glob(&pattern).map_err(|e| anyhow!("Glob pattern error: {}", e))? {
            let path = entry.map_err(|e| anyhow!("Glob entry error: {}", e))?;
            let filename = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| anyhow!("Invalid filename"))?;

            if filename == "main.toml" || filename == "secrets.toml" {
                continue;
            }

            let file_stem = filename
                .strip_suffix(".toml")
                .ok_or_else(|| anyhow!("Invalid config filename: {}", filename))?;

            debug!("Loading host seed file: {}", path.display());

            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| ConfigError::LoadFailed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;

            let seed_file: HostSeedFile =
                toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                    reason: format!("{}: {}", path.display(), e),
                })?;

            for mut host in seed_file.hosts {
                // The file name doubles as the region when the entry has none
                if host.region.is_none() {
                    host.region = Some(file_stem.to_string());
                }
                if all_hosts.contains_key(&host.name) {
                    warn!(
                        "Host {} defined twice, keeping the entry from {}",
                        host.name,
                        path.display()
                    );
                }
                all_hosts.insert(host.name.clone(), host);
            }
        }

        config.hosts = all_hosts;

        info!(
            "Loaded configuration with {} seeded hosts (dispatch every {}s, timezone {})",
            config.hosts.len(),
            config.dispatch_interval_seconds,
            config.timezone
        );

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn loads_main_and_seed_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("main.toml"),
            r#"
host = "127.0.0.1"
port = 8095
timezone = "Europe/Sofia"
"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("lab.toml"),
            r#"
[[hosts]]
name = "asr9k-lab-1"
platform = "ASR9K"
host_or_ip = "10.0.0.1"
port_number = "2001"

[[hosts]]
name = "ncs6k-lab-1"
platform = "NCS6K"
region = "core"
host_or_ip = "10.0.0.2"
connection_type = "ssh"
"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("secrets.toml"), "credential_key = \"k\"\n").unwrap();

        let manager = ConfigManager::new(dir.path().to_string_lossy().to_string())
            .await
            .unwrap();
        let config = manager.get_current_config();

        assert_eq!(config.port, 8095);
        assert_eq!(config.dispatch_interval_seconds, 10);
        assert_eq!(config.hosts.len(), 2);
        assert_eq!(config.hosts["asr9k-lab-1"].region.as_deref(), Some("lab"));
        assert_eq!(config.hosts["ncs6k-lab-1"].region.as_deref(), Some("core"));
        assert_eq!(config.hosts["ncs6k-lab-1"].connection_type, "ssh");
    }

    #[tokio::test]
    async fn rejects_unknown_timezone() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("main.toml"),
            "host = \"127.0.0.1\"\nport = 1\ntimezone = \"Mars/Olympus\"\n",
        )
        .unwrap();

        let err = ConfigManager::new(dir.path().to_string_lossy().to_string())
            .await
            .err()
            .expect("unknown timezone should be rejected");
        match err.downcast_ref::<ConfigError>() {
            Some(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "timezone"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn broken_seed_file_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.toml"), "host = \"127.0.0.1\"\nport = 1\n").unwrap();
        std::fs::write(dir.path().join("lab.toml"), "[[hosts]]\nname = \n").unwrap();

        let err = ConfigManager::new(dir.path().to_string_lossy().to_string())
            .await
            .err()
            .expect("broken seed file should be rejected");
        match err.downcast_ref::<ConfigError>() {
            Some(ConfigError::ParseError { reason }) => assert!(reason.contains("lab.toml")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_main_config_is_a_load_failure() {
        let dir = TempDir::new().unwrap();
        let err = ConfigManager::new(dir.path().to_string_lossy().to_string())
            .await
            .err()
            .expect("missing main.toml should be rejected");
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::LoadFailed { .. })
        ));
    }
}
