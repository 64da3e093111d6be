//! The minimal blob-store interface the core requires. The
//! object-store driver itself is out of scope; this module ships the trait
//! plus one local-filesystem implementation so the crate is runnable
//! end-to-end without a real object store wired in.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, key: &str, path: &Path, content_type: Option<&str>) -> Result<()>;
    async fn download_to(&self, key: &str, path: &Path) -> Result<()>;
    async fn download_bytes(&self, key: &str) -> Result<Vec<u8>>;
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>>;
    async fn url_for(&self, key: &str) -> Result<String>;
}

/// A local-filesystem-backed blob store: `root/<key>`, with a `file://` URL.
/// Stands in for the production object store driver, which is an injected
/// dependency per the design note on external collaborators.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, key: &str, path: &Path, _content_type: Option<&str>) -> Result<()> {
        let dest = self.path_for(key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating blob directory for {key}"))?;
        }
        tokio::fs::copy(path, &dest)
            .await
            .with_context(|| format!("uploading {key} from {}", path.display()))?;
        Ok(())
    }

    async fn download_to(&self, key: &str, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(self.path_for(key), path)
            .await
            .with_context(|| format!("downloading {key}"))?;
        Ok(())
    }

    async fn download_bytes(&self, key: &str) -> Result<Vec<u8>> {
        tokio::fs::read(self.path_for(key)).await.with_context(|| format!("reading blob {key} into memory"))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("deleting blob {key}")),
        }
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let base = self.path_for(prefix);
        if !base.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in walkdir::WalkDir::new(&base).into_iter().filter_map(std::result::Result::ok) {
            if entry.file_type().is_file() {
                if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                    keys.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        Ok(keys)
    }

    async fn url_for(&self, key: &str) -> Result<String> {
        Ok(format!("file://{}", self.path_for(key).display()))
    }
}
