mod backend;
mod builder;
pub mod discovery;
mod error;
pub mod ffprobe;
mod runner;
#[cfg(any(test, feature = "integration-test-api"))]
mod verify;

pub use backend::{FfmpegBackend, MediaBackend};
pub use builder::{
    EncodeProfile, FALLBACK_FPS, build_convert_args, build_frame_args, effective_fps,
    format_args_for_display_multiline,
};
pub use error::{FfmpegErrorPayload, parse_ffmpeg_error, unsupported_option_in};
pub use ffprobe::MediaInfo;
pub use runner::run_ffmpeg_blocking;
#[cfg(any(test, feature = "integration-test-api"))]
pub use verify::verify_video;

/// Path to string for FFmpeg args or logging.
pub fn path_to_string(path: &(impl AsRef<std::path::Path> + ?Sized)) -> String {
    path.as_ref().to_string_lossy().to_string()
}
