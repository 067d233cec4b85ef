//! Blocking media operations behind a trait so the pipeline can be driven by a
//! scripted backend in tests. All methods block; callers move them onto
//! `tokio::task::spawn_blocking`.

use std::path::Path;

use super::builder::{
    EncodeProfile, build_convert_args, build_frame_args, format_args_for_display_multiline,
};
use super::ffprobe::{MediaInfo, probe_media};
use super::path_to_string;
use super::runner::run_ffmpeg_blocking;
use crate::error::AppError;

pub trait MediaBackend: Send + Sync + 'static {
    /// Duration and declared frame rate of a media file.
    fn probe(&self, path: &Path) -> Result<MediaInfo, AppError>;

    /// Encode `input` to a normalized MP4 at `output` with the given profile.
    /// Must return `AppError::UnsupportedParameter` when the profile itself is rejected.
    fn encode(
        &self,
        input: &Path,
        output: &Path,
        profile: &EncodeProfile,
        fps: f64,
    ) -> Result<(), AppError>;

    /// Write one still frame at `timestamp` seconds to `output`.
    fn extract_frame(&self, video: &Path, timestamp: f64, output: &Path) -> Result<(), AppError>;
}

/// Production backend: spawns the discovered ffmpeg/ffprobe binaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegBackend;

impl MediaBackend for FfmpegBackend {
    fn probe(&self, path: &Path) -> Result<MediaInfo, AppError> {
        probe_media(path)
    }

    fn encode(
        &self,
        input: &Path,
        output: &Path,
        profile: &EncodeProfile,
        fps: f64,
    ) -> Result<(), AppError> {
        let args = build_convert_args(&path_to_string(input), &path_to_string(output), profile, fps);
        log::debug!(
            target: "gif_to_video::ffmpeg",
            "encode ({} profile):\n{}",
            profile.name,
            format_args_for_display_multiline(&args)
        );
        run_ffmpeg_blocking(args)
    }

    fn extract_frame(&self, video: &Path, timestamp: f64, output: &Path) -> Result<(), AppError> {
        let args = build_frame_args(&path_to_string(video), timestamp, &path_to_string(output));
        run_ffmpeg_blocking(args)?;
        // ffmpeg exits 0 without writing when the seek lands past the last frame.
        if !output.exists() {
            return Err(AppError::from(format!(
                "FFmpeg produced no frame at {:.3}s",
                timestamp
            )));
        }
        Ok(())
    }
}
