//! Converted-clip integrity check via FFmpeg decode-to-null.
//!
//! A valid clip decodes without errors; corruption produces FFmpeg errors and non-zero exit.

use std::path::Path;
use std::process::Command;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use super::discovery::get_ffmpeg_path;

/// Run FFmpeg decode-to-null. Returns Ok(()) if decode succeeds without errors.
#[allow(dead_code)] // Used by integration tests
pub fn verify_video(path: &Path) -> Result<(), String> {
    let ffmpeg = get_ffmpeg_path().map_err(|e| e.to_string())?;
    let path_str = path.to_string_lossy();
    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-v", "error", "-i", path_str.as_ref(), "-f", "null", "-"]);
    #[cfg(windows)]
    cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
    let output = cmd.output().map_err(|e| e.to_string())?;
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if output.status.success() && !stderr.to_lowercase().contains("error") {
        return Ok(());
    }
    Err(format!(
        "Video verification failed (exit {}): {}",
        output.status.code().unwrap_or(-1),
        stderr
    ))
}
