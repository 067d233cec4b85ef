//! Error type for the GIF adaptation pipeline. Implements Display and Serialize for RPC consumers.

use crate::ffmpeg::parse_ffmpeg_error;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    FfmpegNotFound(String),

    #[error("FFmpeg failed (code {code}): {stderr}")]
    FfmpegFailed { code: i32, stderr: String },

    /// The encoder rejected an option it does not know. Only this variant triggers the
    /// fallback encode profile.
    #[error("Unsupported encoder parameter: {0}")]
    UnsupportedParameter(String),

    #[error("Failed to fetch source {source_id}: {reason}")]
    SourceFetch { source_id: String, reason: String },

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("Frame {index} extraction failed: {reason}")]
    FrameExtraction { index: usize, reason: String },

    #[error("Cache write failed for {path}: {reason}")]
    CacheWrite { path: String, reason: String },

    #[error("Cleanup failed for {path}: {reason}")]
    Cleanup { path: String, reason: String },

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Aborted")]
    Aborted,
}

impl AppError {
    pub fn aborted() -> Self {
        Self::Aborted
    }

    pub fn ffmpeg_failed(code: i32, stderr: impl Into<String>) -> Self {
        Self::FfmpegFailed {
            code,
            stderr: stderr.into(),
        }
    }

    pub fn source_fetch(source_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceFetch {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_unsupported_parameter(&self) -> bool {
        matches!(self, Self::UnsupportedParameter(_))
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            AppError::FfmpegFailed { code, stderr } => {
                let payload = parse_ffmpeg_error(stderr, Some(*code));
                let json =
                    serde_json::json!({ "summary": payload.summary, "detail": payload.detail });
                serializer.serialize_str(&json.to_string())
            }
            _ => serializer.serialize_str(&self.to_string()),
        }
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::FfmpegFailed {
            code: -1,
            stderr: s,
        }
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}
