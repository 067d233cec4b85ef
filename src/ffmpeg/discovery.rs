use crate::error::AppError;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

#[cfg(target_os = "windows")]
const WHICH: &str = "where";
#[cfg(not(target_os = "windows"))]
const WHICH: &str = "which";

fn find_in_path() -> Option<PathBuf> {
    let output = Command::new(WHICH).arg("ffmpeg").output().ok()?;
    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout);
        let first = path.lines().next()?.trim();
        if !first.is_empty() {
            return Some(PathBuf::from(first));
        }
    }
    None
}

fn common_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/opt/homebrew/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/opt/local/bin/ffmpeg"),
        ]
    }

    #[cfg(target_os = "windows")]
    {
        vec![
            PathBuf::from("C:\\ffmpeg\\bin\\ffmpeg.exe"),
            PathBuf::from("C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe"),
        ]
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        vec![
            PathBuf::from("/usr/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", unix)))]
    {
        vec![]
    }
}

static FFMPEG_PATH_CACHE: OnceLock<PathBuf> = OnceLock::new();

fn resolve_ffmpeg_path() -> Result<PathBuf, AppError> {
    // Common paths first to avoid spawning which/where
    for path in common_paths() {
        if path.exists() {
            log::debug!(
                target: "gif_to_video::ffmpeg::discovery",
                "FFmpeg found in common path: {}",
                path.display()
            );
            return Ok(path);
        }
    }

    if let Some(p) = find_in_path()
        && p.exists()
    {
        log::debug!(
            target: "gif_to_video::ffmpeg::discovery",
            "FFmpeg found in PATH: {}",
            p.display()
        );
        return Ok(p);
    }

    log::error!(
        target: "gif_to_video::ffmpeg::discovery",
        "FFmpeg not found in PATH or common locations"
    );
    Err(AppError::FfmpegNotFound(
        "FFmpeg not found. GIF conversion is disabled until FFmpeg is installed:\n  - macOS: brew install ffmpeg\n  - Linux: sudo apt install ffmpeg\n  - Windows: Download from https://ffmpeg.org/download.html"
            .to_string(),
    ))
}

/// Get FFmpeg path. Cached for process lifetime.
/// Env override: FFMPEG_PATH takes precedence (for tests/CI or bundled binaries).
/// Falls back to common installation paths, then PATH.
pub fn get_ffmpeg_path() -> Result<&'static Path, AppError> {
    if let Some(path) = FFMPEG_PATH_CACHE.get() {
        return Ok(path.as_path());
    }
    let path = match std::env::var("FFMPEG_PATH") {
        Ok(env_path) if Path::new(&env_path).exists() => {
            log::debug!(
                target: "gif_to_video::ffmpeg::discovery",
                "FFmpeg path from FFMPEG_PATH env: {}",
                env_path
            );
            PathBuf::from(env_path)
        }
        _ => resolve_ffmpeg_path()?,
    };
    // Another thread may have initialized first; either value is a valid ffmpeg.
    let _ = FFMPEG_PATH_CACHE.set(path);
    FFMPEG_PATH_CACHE
        .get()
        .map(PathBuf::as_path)
        .ok_or_else(|| AppError::FfmpegNotFound("FFmpeg path cache is empty".to_string()))
}

/// Paths to try for ffprobe given an ffmpeg binary path (suffixed first, then plain).
pub fn ffprobe_candidates(ffmpeg_path: &Path) -> Vec<PathBuf> {
    let parent = match ffmpeg_path.parent() {
        Some(p) => p,
        None => return vec![],
    };
    let mut candidates = Vec::with_capacity(2);
    let stem = ffmpeg_path.file_stem().and_then(|s| s.to_str());
    if let Some(suffix) = stem.and_then(|s| s.strip_prefix("ffmpeg"))
        && !suffix.is_empty()
    {
        #[cfg(target_os = "windows")]
        candidates.push(parent.join(format!("ffprobe{suffix}.exe")));
        #[cfg(not(target_os = "windows"))]
        candidates.push(parent.join(format!("ffprobe{suffix}")));
    }
    #[cfg(target_os = "windows")]
    candidates.push(parent.join("ffprobe.exe"));
    #[cfg(not(target_os = "windows"))]
    candidates.push(parent.join("ffprobe"));
    candidates
}

/// Get ffprobe path. Same directory as ffmpeg (ffmpeg/ffprobe ship together).
pub fn get_ffprobe_path() -> Result<PathBuf, AppError> {
    let ffmpeg = get_ffmpeg_path()?;
    let parent = ffmpeg
        .parent()
        .ok_or_else(|| AppError::from("FFmpeg path has no parent directory".to_string()))?;
    let candidates = ffprobe_candidates(ffmpeg);
    if let Some(found) = candidates.iter().find(|c| c.exists()) {
        return Ok(found.clone());
    }
    Err(AppError::from(format!(
        "ffprobe not found next to FFmpeg (dir: {})",
        parent.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn ffprobe_candidates_plain_ffmpeg() {
        #[cfg(not(target_os = "windows"))]
        {
            let candidates = ffprobe_candidates(Path::new("/usr/bin/ffmpeg"));
            assert_eq!(candidates, vec![PathBuf::from("/usr/bin/ffprobe")]);
        }
        #[cfg(target_os = "windows")]
        {
            let candidates = ffprobe_candidates(Path::new("C:\\bin\\ffmpeg.exe"));
            assert_eq!(candidates, vec![PathBuf::from("C:\\bin\\ffprobe.exe")]);
        }
    }

    #[test]
    fn ffprobe_candidates_versioned_suffix() {
        #[cfg(not(target_os = "windows"))]
        {
            let candidates = ffprobe_candidates(Path::new("/opt/ff/bin/ffmpeg-x86_64-linux"));
            assert_eq!(candidates.len(), 2);
            assert_eq!(candidates[0], PathBuf::from("/opt/ff/bin/ffprobe-x86_64-linux"));
            assert_eq!(candidates[1], PathBuf::from("/opt/ff/bin/ffprobe"));
        }
    }
}
