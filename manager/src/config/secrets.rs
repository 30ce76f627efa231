//! Secrets loader for the credential key and default device login.
//!
//! Secrets are stored in a separate TOML file (config/secrets.toml) that should
//! be excluded from version control. The credential key encrypts passwords at
//! rest in the job store; the default credentials are used for hosts whose
//! connection params carry no username/password.
//!
//! Example secrets.toml:
//! ```toml
//! credential_key = "change-me"
//!
//! [default_credentials]
//! username = "cisco"
//! password = "cisco"
//! ```

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use crate::errors::ConfigError;

/// Key used when no secrets file is present; fine for a lab, not for production
const FALLBACK_CREDENTIAL_KEY: &str = "upgrade-manager-default-key";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultCredentials {
    pub username: String,
    pub password: String,
}

/// Structure matching the secrets.toml file format
#[derive(Debug, Deserialize, Default)]
pub struct SecretsFile {
    #[serde(default)]
    pub credential_key: Option<String>,
    #[serde(default)]
    pub default_credentials: Option<DefaultCredentials>,
}

/// Loader for secrets from the secrets.toml file
pub struct SecretsLoader {
    secrets: SecretsFile,
}

impl SecretsLoader {
    /// Load secrets from the specified file path.
    /// Returns an empty loader if the file doesn't exist.
    pub fn load(secrets_path: &Path) -> Result<Self> {
        if !secrets_path.exists() {
            warn!(
                "Secrets file not found at {:?}, stored passwords use the fallback key",
                secrets_path
            );
            return Ok(Self {
                secrets: SecretsFile::default(),
            });
        }

        let content =
            std::fs::read_to_string(secrets_path).map_err(|e| ConfigError::LoadFailed {
                path: secrets_path.display().to_string(),
                reason: e.to_string(),
            })?;

        // toml errors quote the offending line, which may hold a secret
        let secrets: SecretsFile = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            reason: format!("{}: {}", secrets_path.display(), e.message()),
        })?;

        info!(
            "Loaded secrets from {:?} (default credentials: {})",
            secrets_path,
            secrets.default_credentials.is_some()
        );

        Ok(Self { secrets })
    }

    pub fn credential_key(&self) -> &str {
        self.secrets
            .credential_key
            .as_deref()
            .unwrap_or(FALLBACK_CREDENTIAL_KEY)
    }

    pub fn default_credentials(&self) -> Option<&DefaultCredentials> {
        self.secrets.default_credentials.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_secrets() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
credential_key = "lab-key"

[default_credentials]
username = "cisco"
password = "cisco123"
"#
        )
        .unwrap();

        let loader = SecretsLoader::load(file.path()).unwrap();

        assert_eq!(loader.credential_key(), "lab-key");
        let defaults = loader.default_credentials().unwrap();
        assert_eq!(defaults.username, "cisco");
        assert_eq!(defaults.password, "cisco123");
    }

    #[test]
    fn test_missing_file() {
        let loader = SecretsLoader::load(Path::new("/nonexistent/path/secrets.toml")).unwrap();
        assert_eq!(loader.credential_key(), FALLBACK_CREDENTIAL_KEY);
        assert!(loader.default_credentials().is_none());
    }

    #[test]
    fn malformed_file_is_a_parse_error_without_its_content() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "credential_key = \"half-open-secret").unwrap();

        let err = SecretsLoader::load(file.path()).err().unwrap();
        match err.downcast_ref::<ConfigError>() {
            Some(ConfigError::ParseError { reason }) => {
                assert!(!reason.contains("half-open-secret"), "secret leaked: {}", reason)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
