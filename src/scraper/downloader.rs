//! Document Downloader: idempotent, atomic-write HTTP fetch of
//! property-record documents.

use crate::scraper::rate_limiter::{RateLimiter, RequestClass};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36";

pub struct DocumentDownloader {
    client: reqwest::Client,
}

impl DocumentDownloader {
    pub fn new(document_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(document_timeout)
            .build()
            .context("building document HTTP client")?;
        Ok(Self { client })
    }

    /// Fetch `url` to `dest`, delaying per the `document` rate-limiter
    /// class first. If `dest` already exists and is non-empty, this is a
    /// no-op that performs zero network I/O (idempotence on retry).
    /// Writes atomically: downloads to a sibling temp path, then renames.
    pub async fn download(&self, url: &str, dest: &Path, rate_limiter: &RateLimiter) -> Result<PathBuf> {
        if let Ok(metadata) = tokio::fs::metadata(dest).await {
            if metadata.len() > 0 {
                return Ok(dest.to_path_buf());
            }
        }

        rate_limiter.wait(RequestClass::Document).await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("requesting document at {url}"))?
            .error_for_status()
            .with_context(|| format!("document request failed: {url}"))?;

        let bytes = response.bytes().await.with_context(|| format!("reading document body: {url}"))?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.context("creating document download directory")?;
        }

        let tmp_path = dest.with_extension(format!(
            "{}.part",
            dest.extension().and_then(|e| e.to_str()).unwrap_or("tmp")
        ));
        tokio::fs::write(&tmp_path, &bytes).await.with_context(|| format!("writing temp file for {url}"))?;
        tokio::fs::rename(&tmp_path, dest)
            .await
            .with_context(|| format!("renaming temp file into place: {}", dest.display()))?;

        Ok(dest.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    #[tokio::test]
    async fn existing_nonempty_file_skips_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/doc.pdf").expect(0).create_async().await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("doc.pdf");
        tokio::fs::write(&dest, b"already here").await.unwrap();

        let downloader = DocumentDownloader::new(Duration::from_secs(5)).unwrap();
        let limiter = RateLimiter::new(&PipelineConfig::new());
        let url = format!("{}/doc.pdf", server.url());

        let result = downloader.download(&url, &dest, &limiter).await.unwrap();
        assert_eq!(result, dest);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_file_downloads_and_writes_atomically() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/doc.pdf")
            .with_status(200)
            .with_body(b"%PDF-1.4 contents")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("doc.pdf");

        let downloader = DocumentDownloader::new(Duration::from_secs(5)).unwrap();
        let limiter = RateLimiter::new(
            &PipelineConfig::new().with_document_delay(
                std::time::Duration::from_millis(1)..std::time::Duration::from_millis(2),
            ),
        );
        let url = format!("{}/doc.pdf", server.url());

        downloader.download(&url, &dest, &limiter).await.unwrap();
        let contents = tokio::fs::read(&dest).await.unwrap();
        assert_eq!(contents, b"%PDF-1.4 contents");
        mock.assert_async().await;
    }
}
