//! Fetching the source GIF into a request workspace.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::AppError;
use crate::request::GifSource;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);
/// Upper bound on a downloaded source; larger bodies are rejected mid-stream.
pub const MAX_SOURCE_BYTES: u64 = 64 * 1024 * 1024;

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Writes the source's bytes to `dest`.
    async fn fetch(&self, source: &GifSource, dest: &Path) -> Result<(), AppError>;
}

/// Downloads `http(s)://` urls, copies local files.
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    client: reqwest::Client,
}

impl DefaultFetcher {
    pub fn new() -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| AppError::Config(format!("http client: {}", e)))?;
        Ok(Self { client })
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(), AppError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::source_fetch(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::source_fetch(url, format!("HTTP {}", status)));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AppError::source_fetch(url, e))?
        {
            written += chunk.len() as u64;
            if written > MAX_SOURCE_BYTES {
                return Err(AppError::source_fetch(
                    url,
                    format!("body exceeds {} bytes", MAX_SOURCE_BYTES),
                ));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        log::debug!(
            target: "gif_to_video::fetch",
            "downloaded {} bytes from {}",
            written,
            url
        );
        Ok(())
    }
}

#[async_trait]
impl SourceFetcher for DefaultFetcher {
    async fn fetch(&self, source: &GifSource, dest: &Path) -> Result<(), AppError> {
        if let Some(url) = source.remote_url() {
            return self.download(url, dest).await;
        }
        let Some(file) = source.file.as_deref() else {
            return Err(AppError::source_fetch(
                source.identifier(),
                "neither an http(s) url nor a local file",
            ));
        };
        let local = file.strip_prefix("file://").unwrap_or(file);
        tokio::fs::copy(local, dest)
            .await
            .map_err(|e| AppError::source_fetch(file, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(file: Option<&str>, url: Option<&str>) -> GifSource {
        GifSource {
            index: 0,
            file: file.map(str::to_string),
            url: url.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn copies_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.gif");
        std::fs::write(&src, b"GIF89a").unwrap();
        let dest = dir.path().join("input.gif");
        let fetcher = DefaultFetcher::new().unwrap();

        fetcher
            .fetch(&source(Some(&src.to_string_lossy()), None), &dest)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"GIF89a");
    }

    #[tokio::test]
    async fn strips_file_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("b.gif");
        std::fs::write(&src, b"GIF87a").unwrap();
        let dest = dir.path().join("input.gif");
        let uri = format!("file://{}", src.display());
        DefaultFetcher::new()
            .unwrap()
            .fetch(&source(Some(&uri), None), &dest)
            .await
            .unwrap();
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn missing_local_file_is_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DefaultFetcher::new()
            .unwrap()
            .fetch(
                &source(Some("/definitely/not/here.gif"), None),
                &dir.path().join("input.gif"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SourceFetch { .. }));
    }

    #[tokio::test]
    async fn non_http_url_without_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = DefaultFetcher::new()
            .unwrap()
            .fetch(
                &source(None, Some("ftp://x/a.gif")),
                &dir.path().join("input.gif"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SourceFetch { .. }));
    }
}
