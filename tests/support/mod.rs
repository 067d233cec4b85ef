#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use gif_to_video_core::adapter::{AdapterParts, GifAdapter};
use gif_to_video_core::config::PluginConfig;
use gif_to_video_core::error::AppError;
use gif_to_video_core::fetch::SourceFetcher;
use gif_to_video_core::ffmpeg::{EncodeProfile, MediaBackend, MediaInfo};
use gif_to_video_core::provider::StaticProviders;
use gif_to_video_core::request::{GifSource, MediaRef, OutgoingRequest};
use gif_to_video_core::temp::TempTracker;
use parking_lot::Mutex;

/// Backend that writes placeholder files instead of running ffmpeg.
#[derive(Default)]
pub struct FakeBackend {
    pub duration: f64,
    pub fail_encode: bool,
    pub fail_frames: bool,
    pub encodes: AtomicUsize,
    pub extracts: AtomicUsize,
    pub profiles: Mutex<Vec<&'static str>>,
}

impl FakeBackend {
    pub fn with_duration(duration: f64) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    pub fn encodes(&self) -> usize {
        self.encodes.load(Ordering::SeqCst)
    }

    pub fn extracts(&self) -> usize {
        self.extracts.load(Ordering::SeqCst)
    }
}

impl MediaBackend for FakeBackend {
    fn probe(&self, _path: &Path) -> Result<MediaInfo, AppError> {
        Ok(MediaInfo {
            duration: self.duration,
            fps: Some(10.0),
            ..MediaInfo::default()
        })
    }

    fn encode(
        &self,
        input: &Path,
        output: &Path,
        profile: &EncodeProfile,
        _fps: f64,
    ) -> Result<(), AppError> {
        self.encodes.fetch_add(1, Ordering::SeqCst);
        self.profiles.lock().push(profile.name);
        if self.fail_encode {
            return Err(AppError::ffmpeg_failed(1, "Invalid data found when processing input"));
        }
        let mut body = b"mp4:".to_vec();
        body.extend(fs::read(input)?);
        fs::write(output, body)?;
        Ok(())
    }

    fn extract_frame(&self, _video: &Path, timestamp: f64, output: &Path) -> Result<(), AppError> {
        self.extracts.fetch_add(1, Ordering::SeqCst);
        if self.fail_frames {
            return Err(AppError::from("no frame"));
        }
        fs::write(output, format!("png@{:.3}", timestamp))?;
        Ok(())
    }
}

/// Fetcher that serves fixed bytes, or fails.
pub struct FakeFetcher {
    pub body: Option<Vec<u8>>,
    pub fetches: AtomicUsize,
    pub seen_dests: Mutex<Vec<PathBuf>>,
}

impl FakeFetcher {
    pub fn serving(body: &[u8]) -> Self {
        Self {
            body: Some(body.to_vec()),
            fetches: AtomicUsize::new(0),
            seen_dests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            body: None,
            fetches: AtomicUsize::new(0),
            seen_dests: Mutex::new(Vec::new()),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn fetch(&self, source: &GifSource, dest: &Path) -> Result<(), AppError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.seen_dests.lock().push(dest.to_path_buf());
        match &self.body {
            Some(body) => {
                tokio::fs::write(dest, body).await?;
                Ok(())
            }
            None => Err(AppError::source_fetch(source.identifier(), "HTTP 404 Not Found")),
        }
    }
}

/// Adapter over fakes, with cache and temp dirs inside one scratch dir.
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub backend: Arc<FakeBackend>,
    pub fetcher: Arc<FakeFetcher>,
    pub temp: Arc<TempTracker>,
    pub adapter: GifAdapter,
}

impl Harness {
    pub fn new(backend: FakeBackend, fetcher: FakeFetcher) -> Self {
        Self::with_config(backend, fetcher, |_| {})
    }

    pub fn with_config(
        backend: FakeBackend,
        fetcher: FakeFetcher,
        tweak: impl FnOnce(&mut PluginConfig),
    ) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let temp_base = dir.path().join("tmp");
        fs::create_dir_all(&temp_base).expect("temp base");
        let mut config = PluginConfig {
            cache_dir: Some(dir.path().join("cache")),
            ..PluginConfig::default()
        };
        tweak(&mut config);

        let backend = Arc::new(backend);
        let fetcher = Arc::new(fetcher);
        let temp = Arc::new(TempTracker::with_base(&temp_base));
        let parts = AdapterParts {
            backend: backend.clone(),
            fetcher: fetcher.clone(),
            providers: Arc::new(
                StaticProviders::new(Some("default-llm".into())).with_session("s-other", "other-llm"),
            ),
            temp: Arc::clone(&temp),
            ffmpeg_available: true,
        };
        let adapter = GifAdapter::with_parts(config, parts).expect("adapter");
        Self {
            dir,
            backend,
            fetcher,
            temp,
            adapter,
        }
    }

    pub fn cache_root(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    pub fn temp_base(&self) -> PathBuf {
        self.dir.path().join("tmp")
    }

    /// Entries left in the temp base dir.
    pub fn temp_leftovers(&self) -> Vec<PathBuf> {
        fs::read_dir(self.temp_base())
            .expect("read temp base")
            .map(|e| e.expect("entry").path())
            .collect()
    }
}

pub fn gif_request(url: &str) -> OutgoingRequest {
    OutgoingRequest {
        prompt: "[图片] what is happening here?".into(),
        media: vec![MediaRef {
            file: None,
            url: Some(url.into()),
        }],
        ..OutgoingRequest::default()
    }
}
