//! GIF -> MP4 conversion off the async scheduler.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::AppError;
use crate::ffmpeg::{EncodeProfile, FALLBACK_FPS, MediaBackend, effective_fps};

fn conversion_error(err: AppError) -> AppError {
    match err {
        AppError::Conversion(_) => err,
        other => AppError::Conversion(other.to_string()),
    }
}

/// Probes the source frame rate, then encodes with the primary profile. Retries
/// once with the fallback profile only if the encoder rejected a primary option.
pub fn convert_blocking(
    backend: &dyn MediaBackend,
    input: &Path,
    output: &Path,
) -> Result<(), AppError> {
    let fps = match backend.probe(input) {
        Ok(info) => effective_fps(info.fps),
        Err(e) => {
            log::debug!(
                target: "gif_to_video::convert",
                "probe failed for {}, using {} fps: {}",
                input.display(),
                FALLBACK_FPS,
                e
            );
            FALLBACK_FPS
        }
    };

    let primary = EncodeProfile::primary();
    log::info!(
        target: "gif_to_video::convert",
        "converting {} -> {} ({} fps, profile={})",
        input.display(),
        output.display(),
        fps,
        primary.name
    );
    match backend.encode(input, output, &primary, fps) {
        Ok(()) => {}
        Err(e) if e.is_unsupported_parameter() => {
            let fallback = EncodeProfile::fallback();
            log::warn!(
                target: "gif_to_video::convert",
                "{}, retrying with {} profile",
                e,
                fallback.name
            );
            backend
                .encode(input, output, &fallback, fps)
                .map_err(conversion_error)?;
        }
        Err(e) => return Err(conversion_error(e)),
    }

    if !output.is_file() {
        return Err(AppError::Conversion(format!(
            "encoder reported success but {} was not written",
            output.display()
        )));
    }
    Ok(())
}

/// Async front for [`convert_blocking`]; the encode runs on the blocking pool.
#[derive(Clone)]
pub struct ConversionEngine {
    backend: Arc<dyn MediaBackend>,
}

impl ConversionEngine {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self { backend }
    }

    pub async fn convert(&self, input: &Path, output: &Path) -> Result<(), AppError> {
        let backend = Arc::clone(&self.backend);
        let input: PathBuf = input.to_path_buf();
        let output: PathBuf = output.to_path_buf();
        tokio::task::spawn_blocking(move || convert_blocking(backend.as_ref(), &input, &output))
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    AppError::aborted()
                } else {
                    AppError::Conversion(format!("conversion task failed: {}", e))
                }
            })?
    }
}
