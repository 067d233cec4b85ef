pub mod adapter;
pub mod cache;
pub mod config;
pub mod convert;
pub mod error;
pub mod fetch;
pub mod ffmpeg;
pub mod frames;
pub mod key;
pub mod logging;
pub mod provider;
pub mod request;
pub mod sidecar_api;
pub mod temp;

pub use adapter::{AdaptOutcome, AdapterParts, GifAdapter, SkipReason};
pub use config::PluginConfig;
pub use error::AppError;
pub use key::{CacheKey, derive_key};
pub use request::{MediaRef, OutgoingRequest};
