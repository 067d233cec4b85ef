use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::{AdaptOutcome, GifAdapter};
use crate::cache::SweepReport;
use crate::config::PluginConfig;
use crate::error::AppError;
use crate::key::{CacheKey, derive_key};
use crate::provider::StaticProviders;
use crate::request::OutgoingRequest;

const PROTOCOL_VERSION: u8 = 1;
/// Provider id treated as the host default in auto mode.
pub const DEFAULT_PROVIDER_ENV: &str = "GIF_TO_VIDEO_DEFAULT_PROVIDER";
/// Config file path when none is given on the command line.
pub const CONFIG_PATH_ENV: &str = "GIF_TO_VIDEO_CONFIG";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppCapabilitiesResult {
    pub protocol_version: u8,
    pub ffmpeg_available: bool,
    pub mode: &'static str,
    pub preview_frame_count: usize,
    pub cache_ttl_seconds: u64,
    pub cache_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptParams {
    #[serde(default)]
    pub session: String,
    pub request: OutgoingRequest,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptResult {
    pub outcome: AdaptOutcome,
    pub request: OutgoingRequest,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheLookupParams {
    pub source: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheLookupResult {
    pub key: CacheKey,
    pub video: Option<PathBuf>,
    pub frames: Vec<PathBuf>,
}

fn params_from_value<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, AppError> {
    serde_json::from_value(params)
        .map_err(|e| AppError::from(format!("Invalid params payload: {}", e)))
}

fn to_value<T: Serialize>(value: T, what: &str) -> Result<Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::from(format!("Failed to serialize {}: {}", what, e)))
}

/// Loads config from `path`, or from `$GIF_TO_VIDEO_CONFIG`, or defaults.
pub fn load_config(path: Option<&Path>) -> Result<PluginConfig, AppError> {
    let from_env = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    match path.map(Path::to_path_buf).or(from_env) {
        Some(path) => PluginConfig::from_path(&path),
        None => Ok(PluginConfig::default()),
    }
}

/// Removes temp leftovers of earlier runs that did not shut down cleanly.
pub fn cleanup_startup_temp(max_age: Duration) -> usize {
    crate::temp::cleanup_old_temp_files(max_age)
}

/// RPC surface over one adapter.
pub struct Sidecar {
    adapter: GifAdapter,
}

impl Sidecar {
    pub fn new(adapter: GifAdapter) -> Self {
        Self { adapter }
    }

    /// Production adapter, default provider from `$GIF_TO_VIDEO_DEFAULT_PROVIDER`.
    pub fn from_config(config: PluginConfig) -> Result<Self, AppError> {
        let default_provider = std::env::var(DEFAULT_PROVIDER_ENV)
            .ok()
            .filter(|id| !id.trim().is_empty());
        let providers = Arc::new(StaticProviders::new(default_provider));
        Ok(Self::new(GifAdapter::new(config, providers)?))
    }

    pub fn adapter(&self) -> &GifAdapter {
        &self.adapter
    }

    pub fn capabilities(&self) -> AppCapabilitiesResult {
        let config = self.adapter.config();
        AppCapabilitiesResult {
            protocol_version: PROTOCOL_VERSION,
            ffmpeg_available: self.adapter.ffmpeg_available(),
            mode: if config.manual_provider().is_some() {
                "manual"
            } else {
                "auto"
            },
            preview_frame_count: config.effective_preview_frame_count(),
            cache_ttl_seconds: config.cache_ttl_seconds,
            cache_dir: self.adapter.cache().root().to_path_buf(),
        }
    }

    pub async fn adapt(&self, params: AdaptParams) -> AdaptResult {
        let mut request = params.request;
        let outcome = self.adapter.handle_request(&params.session, &mut request).await;
        AdaptResult { outcome, request }
    }

    pub fn cache_lookup(&self, params: CacheLookupParams) -> CacheLookupResult {
        let key = derive_key(&params.source);
        let cache = self.adapter.cache();
        CacheLookupResult {
            video: cache.lookup_video(&key),
            frames: cache.lookup_frames(&key),
            key,
        }
    }

    pub fn cache_sweep(&self) -> SweepReport {
        self.adapter.cache().sweep_expired()
    }

    pub async fn dispatch(&self, method: &str, params: Value) -> Result<Value, AppError> {
        match method {
            "app.capabilities" => to_value(self.capabilities(), "app capabilities"),
            "request.adapt" => {
                let parsed: AdaptParams = params_from_value(params)?;
                to_value(self.adapt(parsed).await, "adapt result")
            }
            "cache.lookup" => {
                let parsed: CacheLookupParams = params_from_value(params)?;
                to_value(self.cache_lookup(parsed), "cache lookup")
            }
            "cache.sweep" => to_value(self.cache_sweep(), "sweep report"),
            _ => Err(AppError::from(format!("Unknown method: {}", method))),
        }
    }

    pub fn shutdown(&self) -> usize {
        self.adapter.shutdown()
    }
}
