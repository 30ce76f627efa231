//! Package file movement to and from a server repository.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

#[async_trait]
pub trait FileTransport: Send + Sync {
    async fn upload(&self, src_local_path: &Path, dst_filename: &str, subdir: &str) -> Result<()>;

    async fn download(&self, src_filename: &str, dst_local_path: &Path) -> Result<()>;

    /// File names in `subdir`, sorted
    async fn list(&self, subdir: &str) -> Result<Vec<String>>;
}

/// Repository that is a directory on the manager host
#[derive(Debug, Clone)]
pub struct LocalFileTransport {
    root: PathBuf,
}

impl LocalFileTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins a caller supplied relative path, refusing anything that leaves the root
    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let relative = Path::new(relative.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(anyhow!("Path {:?} escapes the repository", relative));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileTransport for LocalFileTransport {
    async fn upload(&self, src_local_path: &Path, dst_filename: &str, subdir: &str) -> Result<()> {
        let dir = self.resolve(subdir)?;
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {:?}", dir))?;
        let dst = self.resolve(&format!("{}/{}", subdir, dst_filename))?;
        fs::copy(src_local_path, &dst)
            .await
            .with_context(|| format!("Failed to copy {:?} to {:?}", src_local_path, dst))?;
        debug!("Uploaded {:?} to {:?}", src_local_path, dst);
        Ok(())
    }

    async fn download(&self, src_filename: &str, dst_local_path: &Path) -> Result<()> {
        let src = self.resolve(src_filename)?;
        fs::copy(&src, dst_local_path)
            .await
            .with_context(|| format!("Failed to copy {:?} to {:?}", src, dst_local_path))?;
        Ok(())
    }

    async fn list(&self, subdir: &str) -> Result<Vec<String>> {
        let dir = self.resolve(subdir)?;
        let mut entries = fs::read_dir(&dir)
            .await
            .with_context(|| format!("Failed to list {:?}", dir))?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn upload_list_download() {
        let repo = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let transport = LocalFileTransport::new(repo.path());

        let src = scratch.path().join("pkg.pie");
        std::fs::write(&src, b"pie").unwrap();
        transport.upload(&src, "asr9k-px-5.3.3.CSCux12345.pie", "5.3.3").await.unwrap();
        assert_eq!(
            transport.list("5.3.3").await.unwrap(),
            vec!["asr9k-px-5.3.3.CSCux12345.pie"]
        );

        let back = scratch.path().join("back.pie");
        transport
            .download("5.3.3/asr9k-px-5.3.3.CSCux12345.pie", &back)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&back).unwrap(), b"pie");
    }

    #[tokio::test]
    async fn parent_components_are_refused() {
        let repo = TempDir::new().unwrap();
        let transport = LocalFileTransport::new(repo.path());
        assert!(transport.list("../etc").await.is_err());
    }
}
