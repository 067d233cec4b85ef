//! Plugin configuration. Values arrive as JSON from the host; every field is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

pub const DEFAULT_PREVIEW_FRAME_COUNT: usize = 4;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 86_400;
/// Env override for the plugin data directory (cache lives in `<data_dir>/cache`).
pub const DATA_DIR_ENV: &str = "GIF_TO_VIDEO_DATA_DIR";

const DEFAULT_IMAGE_PLACEHOLDER: &str = "[图片]";
const DEFAULT_CONVERTED_MARKER: &str = "[视频(GIF已转换)]";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PluginConfig {
    #[serde(alias = "previewFrameCount")]
    pub preview_frame_count: usize,
    #[serde(alias = "cacheTtlSeconds")]
    pub cache_ttl_seconds: u64,
    /// Manual mode when non-empty: only this provider gets adapted requests.
    #[serde(alias = "enabledProviderId")]
    pub enabled_provider_id: String,
    #[serde(alias = "cacheDir")]
    pub cache_dir: Option<PathBuf>,
    /// Placeholder the host puts in the prompt for an image attachment.
    #[serde(alias = "imagePlaceholder")]
    pub image_placeholder: String,
    /// Replaces the placeholder once the GIF has been converted.
    #[serde(alias = "convertedMarker")]
    pub converted_marker: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            preview_frame_count: DEFAULT_PREVIEW_FRAME_COUNT,
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECS,
            enabled_provider_id: String::new(),
            cache_dir: None,
            image_placeholder: DEFAULT_IMAGE_PLACEHOLDER.to_string(),
            converted_marker: DEFAULT_CONVERTED_MARKER.to_string(),
        }
    }
}

impl PluginConfig {
    pub fn from_json_str(json: &str) -> Result<Self, AppError> {
        serde_json::from_str(json).map_err(|e| AppError::Config(e.to_string()))
    }

    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    /// At least one frame is always sampled.
    pub fn effective_preview_frame_count(&self) -> usize {
        self.preview_frame_count.max(1)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn manual_provider(&self) -> Option<&str> {
        let id = self.enabled_provider_id.trim();
        (!id.is_empty()).then_some(id)
    }

    /// Explicit `cache_dir`, else `<data_dir>/cache`.
    pub fn effective_cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        data_dir().join("cache")
    }
}

fn data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::env::temp_dir().join("gif-to-video"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let cfg = PluginConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, PluginConfig::default());
        assert_eq!(cfg.effective_preview_frame_count(), 4);
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(86_400));
        assert_eq!(cfg.manual_provider(), None);
    }

    #[test]
    fn zero_frame_count_is_clamped_to_one() {
        let cfg = PluginConfig::from_json_str(r#"{"preview_frame_count": 0}"#).unwrap();
        assert_eq!(cfg.effective_preview_frame_count(), 1);
    }

    #[test]
    fn camel_case_aliases_are_accepted() {
        let cfg = PluginConfig::from_json_str(
            r#"{"previewFrameCount": 6, "enabledProviderId": " openai_1 ", "cacheDir": "/var/cache/g"}"#,
        )
        .unwrap();
        assert_eq!(cfg.preview_frame_count, 6);
        assert_eq!(cfg.manual_provider(), Some("openai_1"));
        assert_eq!(cfg.effective_cache_dir(), PathBuf::from("/var/cache/g"));
    }

    #[test]
    fn invalid_json_is_config_error() {
        let err = PluginConfig::from_json_str("{").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"cache_ttl_seconds": 60}"#).unwrap();
        let cfg = PluginConfig::from_path(&path).unwrap();
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(60));
        assert!(PluginConfig::from_path(&dir.path().join("missing.json")).is_err());
    }
}
