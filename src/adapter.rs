//! Request orchestration: detect a GIF, convert it (or reuse the cached clip),
//! derive preview frames and rewrite the outgoing request.
//!
//! `handle_request` never fails. Any error along the way leaves the request as it
//! was, is logged, and is reported as a skip.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::cache::ArtifactCache;
use crate::config::PluginConfig;
use crate::convert::ConversionEngine;
use crate::error::AppError;
use crate::fetch::{DefaultFetcher, SourceFetcher};
use crate::ffmpeg::{FfmpegBackend, MediaBackend, discovery::get_ffmpeg_path};
use crate::frames::FrameSampler;
use crate::key::{CacheKey, derive_key};
use crate::provider::{ProviderDirectory, ProviderGate};
use crate::request::{GifSource, OutgoingRequest, inject_preview_hint};
use crate::temp::TempTracker;

fn blocking_task_error(what: &str, err: tokio::task::JoinError) -> AppError {
    if err.is_cancelled() {
        AppError::aborted()
    } else {
        AppError::from(format!("{} task failed: {}", what, err))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "camelCase")]
pub enum SkipReason {
    FfmpegUnavailable,
    NoGif,
    UnknownProvider,
    ProviderNotEnabled(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AdaptOutcome {
    Skipped { skip: SkipReason },
    #[serde(rename_all = "camelCase")]
    Adapted {
        video: PathBuf,
        frames: Vec<PathBuf>,
        from_cache: bool,
    },
}

impl AdaptOutcome {
    fn skipped(reason: SkipReason) -> Self {
        Self::Skipped { skip: reason }
    }

    pub fn is_adapted(&self) -> bool {
        matches!(self, Self::Adapted { .. })
    }
}

/// Collaborators of the adapter. `GifAdapter::new` fills them with the production
/// implementations.
pub struct AdapterParts {
    pub backend: Arc<dyn MediaBackend>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub providers: Arc<dyn ProviderDirectory>,
    pub temp: Arc<TempTracker>,
    pub ffmpeg_available: bool,
}

pub struct GifAdapter {
    config: PluginConfig,
    cache: Arc<ArtifactCache>,
    engine: ConversionEngine,
    sampler: FrameSampler,
    fetcher: Arc<dyn SourceFetcher>,
    gate: ProviderGate,
    temp: Arc<TempTracker>,
    ffmpeg_available: bool,
}

impl GifAdapter {
    /// Production wiring: discovered ffmpeg, HTTP/local fetcher, system temp dir.
    pub fn new(config: PluginConfig, providers: Arc<dyn ProviderDirectory>) -> Result<Self, AppError> {
        let ffmpeg_available = match get_ffmpeg_path() {
            Ok(path) => {
                log::info!(
                    target: "gif_to_video::adapter",
                    "using ffmpeg at {}",
                    path.display()
                );
                true
            }
            Err(e) => {
                log::error!(
                    target: "gif_to_video::adapter",
                    "ffmpeg unavailable, GIF adaptation disabled: {}",
                    e
                );
                false
            }
        };
        let parts = AdapterParts {
            backend: Arc::new(FfmpegBackend),
            fetcher: Arc::new(DefaultFetcher::new()?),
            providers,
            temp: Arc::new(TempTracker::new()),
            ffmpeg_available,
        };
        Self::with_parts(config, parts)
    }

    pub fn with_parts(config: PluginConfig, parts: AdapterParts) -> Result<Self, AppError> {
        let cache = Arc::new(ArtifactCache::open(
            config.effective_cache_dir(),
            config.cache_ttl(),
        )?);
        let sampler = FrameSampler::new(
            Arc::clone(&cache),
            Arc::clone(&parts.backend),
            config.effective_preview_frame_count(),
        );
        let gate = ProviderGate::new(
            parts.providers,
            config.manual_provider().map(str::to_string),
        );
        log::info!(
            target: "gif_to_video::adapter",
            "adapter ready: {} mode, {} preview frame(s), ttl {}s",
            if gate.is_manual() { "manual" } else { "auto" },
            sampler.count(),
            config.cache_ttl_seconds
        );
        Ok(Self {
            engine: ConversionEngine::new(parts.backend),
            cache,
            sampler,
            fetcher: parts.fetcher,
            gate,
            temp: parts.temp,
            ffmpeg_available: parts.ffmpeg_available,
            config,
        })
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    pub fn temp_tracker(&self) -> &Arc<TempTracker> {
        &self.temp
    }

    pub fn ffmpeg_available(&self) -> bool {
        self.ffmpeg_available
    }

    pub async fn handle_request(&self, session: &str, request: &mut OutgoingRequest) -> AdaptOutcome {
        if !self.ffmpeg_available {
            log::warn!(target: "gif_to_video::adapter", "ffmpeg unavailable, skipping");
            return AdaptOutcome::skipped(SkipReason::FfmpegUnavailable);
        }
        let Some(gif) = request.find_gif() else {
            log::debug!(target: "gif_to_video::adapter", "no GIF in request");
            return AdaptOutcome::skipped(SkipReason::NoGif);
        };
        log::info!(
            target: "gif_to_video::adapter",
            "GIF detected: {}",
            gif.identifier()
        );
        let key = derive_key(gif.identifier());
        let cached = self.cache.lookup_video(&key);

        let Some(provider_id) = self.gate.resolve(session, request.provider_id.as_deref()) else {
            log::error!(
                target: "gif_to_video::adapter",
                "cannot resolve provider for session {}, skipping",
                session
            );
            return AdaptOutcome::skipped(SkipReason::UnknownProvider);
        };
        if !self.gate.is_enabled(&provider_id) {
            log::info!(
                target: "gif_to_video::adapter",
                "adaptation not enabled for provider {}",
                provider_id
            );
            return AdaptOutcome::skipped(SkipReason::ProviderNotEnabled(provider_id));
        }

        let (video, from_cache) = match cached {
            Some(path) => (path, true),
            None => match self.convert_source(&gif, &key).await {
                Ok(path) => (path, false),
                Err(e) => {
                    log::error!(
                        target: "gif_to_video::adapter",
                        "GIF handling failed for {}: {}",
                        gif.identifier(),
                        e
                    );
                    return AdaptOutcome::skipped(SkipReason::Failed(e.to_string()));
                }
            },
        };

        let frames = self.sampler.ensure_preview_frames(&key, &video).await;
        request.provider_id = Some(provider_id);
        self.rewrite(request, &gif, &video, &frames);
        AdaptOutcome::Adapted {
            video,
            frames,
            from_cache,
        }
    }

    /// Fetch, convert and cache one source. The request workspace is cleaned up on
    /// every path out of here.
    async fn convert_source(&self, gif: &GifSource, key: &CacheKey) -> Result<PathBuf, AppError> {
        let cache = Arc::clone(&self.cache);
        let temp = Arc::clone(&self.temp);
        tokio::task::spawn_blocking(move || {
            cache.sweep_expired();
            temp.reap_retained(cache.ttl());
        })
        .await
        .map_err(|e| blocking_task_error("cache sweep", e))?;

        let mut workspace = self.temp.create_request_dir()?;
        self.fetcher.fetch(gif, workspace.input_path()).await?;
        workspace.mark_populated();

        self.engine
            .convert(workspace.input_path(), workspace.output_path())
            .await?;
        log::info!(
            target: "gif_to_video::adapter",
            "converted {}",
            gif.identifier()
        );

        let cache = Arc::clone(&self.cache);
        let store_key = key.clone();
        let output = workspace.output_path().to_path_buf();
        let stored = tokio::task::spawn_blocking(move || cache.store_video(&store_key, &output))
            .await
            .map_err(|e| blocking_task_error("cache write", e))?;
        workspace.mark_consumed();
        if stored == workspace.output_path() {
            // Not cached: the output itself is the only copy.
            return Ok(workspace.retain_output());
        }
        workspace.release();
        Ok(stored)
    }

    fn rewrite(
        &self,
        request: &mut OutgoingRequest,
        gif: &GifSource,
        video: &std::path::Path,
        frames: &[PathBuf],
    ) {
        request.remove_media(gif.index);
        request.attach_video(video);
        request.replace_placeholder(&self.config.image_placeholder, &self.config.converted_marker);
        let added = request.attach_images(frames);
        request.prompt =
            inject_preview_hint(&request.prompt, &self.config.converted_marker, frames.len());
        if frames.is_empty() {
            log::warn!(
                target: "gif_to_video::adapter",
                "no preview frames, prompt only notes the conversion"
            );
        } else {
            log::info!(
                target: "gif_to_video::adapter",
                "attached {} preview frame(s) ({} new)",
                frames.len(),
                added
            );
        }
    }

    /// Drains every temp path still tracked. Persisted cache entries are untouched.
    pub fn shutdown(&self) -> usize {
        log::info!(target: "gif_to_video::adapter", "shutting down, cleaning temp files");
        self.temp.cleanup_all()
    }
}
