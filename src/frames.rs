//! Preview stills for providers that take images but not video.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::ArtifactCache;
use crate::error::AppError;
use crate::ffmpeg::MediaBackend;
use crate::key::CacheKey;

/// Keeps the last sample off the exact end, where seeking yields no frame.
const END_GUARD_SECS: f64 = 0.01;

/// Midpoints of `count` equal slices of `duration`, clamped to `[0, duration - 0.01]`.
/// Unknown, zero or non-finite durations sample everything at 0.
pub fn sample_timestamps(duration: f64, count: usize) -> Vec<f64> {
    if !duration.is_finite() || duration <= 0.0 {
        return vec![0.0; count];
    }
    let max_ts = (duration - END_GUARD_SECS).max(0.0);
    (0..count)
        .map(|i| ((i as f64 + 0.5) / count as f64 * duration).clamp(0.0, max_ts))
        .collect()
}

#[derive(Clone)]
pub struct FrameSampler {
    cache: Arc<ArtifactCache>,
    backend: Arc<dyn MediaBackend>,
    count: usize,
}

impl FrameSampler {
    pub fn new(cache: Arc<ArtifactCache>, backend: Arc<dyn MediaBackend>, count: usize) -> Self {
        Self {
            cache,
            backend,
            count: count.max(1),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Extracts `count` stills from `video` into the key's frame dir. Failed frames are
    /// skipped; a set with no frames at all leaves no dir behind. Blocking.
    pub fn sample_frames(&self, video: &Path, key: &CacheKey, count: usize) -> Vec<PathBuf> {
        if let Err(e) = self.cache.prepare_frame_dir(key) {
            log::warn!(
                target: "gif_to_video::frames",
                "cannot create frame dir for {}: {}",
                key,
                e
            );
            return Vec::new();
        }

        let duration = match self.backend.probe(video) {
            Ok(info) => info.duration,
            Err(e) => {
                log::debug!(
                    target: "gif_to_video::frames",
                    "probe failed for {}, sampling at 0s: {}",
                    video.display(),
                    e
                );
                0.0
            }
        };

        let mut frames = Vec::with_capacity(count);
        for (index, ts) in sample_timestamps(duration, count).into_iter().enumerate() {
            let out = self.cache.frame_path(key, index);
            match self.backend.extract_frame(video, ts, &out) {
                Ok(()) => frames.push(out),
                Err(e) => {
                    let err = AppError::FrameExtraction {
                        index,
                        reason: e.to_string(),
                    };
                    log::warn!(target: "gif_to_video::frames", "{} (t={:.3}s)", err, ts);
                    let _ = fs::remove_file(&out);
                }
            }
        }

        // An expired set may hold more frames than this run wrote.
        self.cache.prune_frames(key, count);

        if frames.is_empty() {
            log::warn!(
                target: "gif_to_video::frames",
                "no preview frames extracted for {}",
                key
            );
            self.cache.remove_frames(key);
            return frames;
        }
        if let Err(e) = self.cache.touch_frames(key) {
            log::debug!(
                target: "gif_to_video::frames",
                "could not refresh frame dir mtime for {}: {}",
                key,
                e
            );
        }
        log::info!(
            target: "gif_to_video::frames",
            "extracted {}/{} preview frame(s) for {}",
            frames.len(),
            count,
            key
        );
        frames
    }

    /// Cached frame set if still valid, otherwise a fresh one sampled on the blocking pool.
    pub async fn ensure_preview_frames(&self, key: &CacheKey, video: &Path) -> Vec<PathBuf> {
        let cached = self.cache.lookup_frames(key);
        if !cached.is_empty() {
            return cached;
        }
        let sampler = self.clone();
        let key = key.clone();
        let video = video.to_path_buf();
        let count = self.count;
        match tokio::task::spawn_blocking(move || sampler.sample_frames(&video, &key, count)).await
        {
            Ok(frames) => frames,
            Err(e) => {
                log::error!(
                    target: "gif_to_video::frames",
                    "frame sampling task failed: {}",
                    e
                );
                Vec::new()
            }
        }
    }
}
