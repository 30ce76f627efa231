//! Per-job session log: raw transcript tee plus side files in the job directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::constants::session_log::{MASK, TRANSCRIPT_FILE};

struct SessionLogInner {
    dir: Option<PathBuf>,
    file: Option<File>,
    masks: Vec<String>,
}

/// Cheap to clone; every clone appends to the same transcript
#[derive(Clone)]
pub struct SessionLog {
    inner: Arc<Mutex<SessionLogInner>>,
}

impl SessionLog {
    /// Creates `root/relative` and opens the transcript inside it
    pub async fn create(root: &Path, relative: &str) -> Result<Self> {
        let dir = root.join(relative);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create session log directory {:?}", dir))?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(TRANSCRIPT_FILE))
            .await
            .with_context(|| format!("Failed to open transcript in {:?}", dir))?;

        Ok(Self {
            inner: Arc::new(Mutex::new(SessionLogInner {
                dir: Some(dir),
                file: Some(file),
                masks: Vec::new(),
            })),
        })
    }

    /// A log that drops everything, for callers without a job directory
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionLogInner {
                dir: None,
                file: None,
                masks: Vec::new(),
            })),
        }
    }

    /// Secrets are replaced by a mask before anything reaches the disk
    pub async fn add_mask(&self, secret: &str) {
        if secret.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().await;
        if !inner.masks.iter().any(|m| m == secret) {
            inner.masks.push(secret.to_string());
        }
    }

    pub async fn dir(&self) -> Option<PathBuf> {
        self.inner.lock().await.dir.clone()
    }

    async fn append(&self, text: &str) {
        let mut inner = self.inner.lock().await;
        let masked = mask_text(text, &inner.masks);
        if let Some(file) = inner.file.as_mut() {
            if let Err(e) = file.write_all(masked.as_bytes()).await {
                warn!("Session log write failed: {}", e);
            }
        }
    }

    pub async fn record_sent(&self, data: &str) {
        self.append(data).await;
    }

    pub async fn record_received(&self, data: &str) {
        self.append(data).await;
    }

    /// Out-of-band annotation, always on its own line
    pub async fn note(&self, line: &str) {
        self.append(&format!("\n[upgrade-manager] {}\n", line)).await;
    }

    /// Writes a side file (command capture, diff) next to the transcript
    pub async fn write_artifact(&self, name: &str, content: &str) -> Result<Option<PathBuf>> {
        let inner = self.inner.lock().await;
        let Some(dir) = inner.dir.as_ref() else {
            return Ok(None);
        };
        let path = dir.join(sanitize_file_name(name));
        let masked = mask_text(content, &inner.masks);
        fs::write(&path, masked)
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;
        Ok(Some(path))
    }

    /// Final single status line, then the transcript is flushed
    pub async fn finish(&self, status_line: &str) {
        self.append(&format!("\n{}\n", status_line)).await;
        let mut inner = self.inner.lock().await;
        if let Some(file) = inner.file.as_mut() {
            if let Err(e) = file.flush().await {
                warn!("Session log flush failed: {}", e);
            }
        }
    }
}

fn mask_text(text: &str, masks: &[String]) -> String {
    let mut out = text.to_string();
    for secret in masks {
        out = out.replace(secret.as_str(), MASK);
    }
    out
}

/// Command text becomes a file name: `show install active` -> `show_install_active`
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}
