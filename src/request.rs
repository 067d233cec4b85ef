//! Host-facing request types and the edits applied once a GIF has been adapted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// An image attachment of the inbound message. Either field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaRef {
    pub file: Option<String>,
    pub url: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// The GIF found in a request and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GifSource {
    /// Position in `OutgoingRequest::media`.
    pub index: usize,
    /// Local file, set only when the file name itself ends in `.gif`.
    pub file: Option<String>,
    pub url: Option<String>,
}

impl GifSource {
    /// The string the cache key is derived from: url when present, else file.
    pub fn identifier(&self) -> &str {
        non_empty(&self.url)
            .or_else(|| non_empty(&self.file))
            .unwrap_or_default()
    }

    pub fn remote_url(&self) -> Option<&str> {
        non_empty(&self.url).filter(|u| u.starts_with("http://") || u.starts_with("https://"))
    }
}

impl MediaRef {
    /// Detects a GIF by file extension first, then by `.gif` anywhere in the url.
    pub fn as_gif(&self, index: usize) -> Option<GifSource> {
        if let Some(file) = non_empty(&self.file)
            && file.to_lowercase().ends_with(".gif")
        {
            return Some(GifSource {
                index,
                file: Some(file.to_string()),
                url: non_empty(&self.url).map(str::to_string),
            });
        }
        if let Some(url) = non_empty(&self.url)
            && url.to_lowercase().contains(".gif")
        {
            return Some(GifSource {
                index,
                file: None,
                url: Some(url.to_string()),
            });
        }
        None
    }
}

/// The outgoing LLM request as the adapter sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OutgoingRequest {
    pub prompt: String,
    pub media: Vec<MediaRef>,
    pub image_urls: Vec<String>,
    pub video_paths: Vec<String>,
    pub provider_id: Option<String>,
}

fn push_unique(list: &mut Vec<String>, value: String) -> bool {
    if list.contains(&value) {
        return false;
    }
    list.push(value);
    true
}

impl OutgoingRequest {
    /// First GIF attachment, if any.
    pub fn find_gif(&self) -> Option<GifSource> {
        self.media
            .iter()
            .enumerate()
            .find_map(|(i, m)| m.as_gif(i))
    }

    pub fn remove_media(&mut self, index: usize) -> Option<MediaRef> {
        (index < self.media.len()).then(|| self.media.remove(index))
    }

    pub fn attach_video(&mut self, path: &Path) -> bool {
        push_unique(&mut self.video_paths, path.to_string_lossy().into_owned())
    }

    /// Appends frame paths not already attached; returns how many were added.
    pub fn attach_images(&mut self, paths: &[PathBuf]) -> usize {
        paths
            .iter()
            .filter(|p| push_unique(&mut self.image_urls, p.to_string_lossy().into_owned()))
            .count()
    }

    /// Replaces the first occurrence of `placeholder` with `marker`.
    pub fn replace_placeholder(&mut self, placeholder: &str, marker: &str) -> bool {
        if placeholder.is_empty() || !self.prompt.contains(placeholder) {
            return false;
        }
        self.prompt = self.prompt.replacen(placeholder, marker, 1);
        true
    }
}

pub fn preview_hint(frame_count: usize) -> String {
    if frame_count > 0 {
        format!(
            "[System note] The GIF has been split into {} still frame(s); consider all of them together to understand the animation.",
            frame_count
        )
    } else {
        "[System note] The GIF was converted to a video, but no preview frames could be generated for this image-only provider; infer its content from context."
            .to_string()
    }
}

/// Adds the frame hint once: right after `marker` when present, else in front of the prompt.
pub fn inject_preview_hint(prompt: &str, marker: &str, frame_count: usize) -> String {
    let hint = preview_hint(frame_count);
    if prompt.contains(&hint) {
        return prompt.to_string();
    }
    if !marker.is_empty() && prompt.contains(marker) {
        return prompt.replacen(marker, &format!("{}{}", marker, hint), 1);
    }
    if prompt.is_empty() {
        hint
    } else {
        format!("{}\n{}", hint, prompt)
    }
}
