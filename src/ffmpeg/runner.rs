//! FFmpeg process spawning.
//!
//! Spawns FFmpeg as a child process and keeps a bounded tail of stderr on a
//! background thread while the calling thread waits for completion. Callers
//! run this from a blocking pool, never from an async task directly.

use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use parking_lot::Mutex;

use super::discovery::get_ffmpeg_path;
use super::error::unsupported_option_in;
use crate::error::AppError;

/// Keep only the last N bytes of stderr to avoid unbounded memory growth.
const MAX_STDERR_BYTES: usize = 64 * 1024;

fn collect_stderr<R: Read + Send + 'static>(
    reader: R,
    buffer: Arc<Mutex<Vec<u8>>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut stream_reader = BufReader::new(reader);
        let mut line_buf = Vec::with_capacity(256);
        while stream_reader.read_until(b'\n', &mut line_buf).unwrap_or(0) > 0 {
            let mut guard = buffer.lock();
            guard.extend_from_slice(&line_buf);
            if guard.len() > MAX_STDERR_BYTES {
                let excess = guard.len() - MAX_STDERR_BYTES;
                guard.drain(..excess);
            }
            drop(guard);
            line_buf.clear();
        }
    })
}

/// Maps a failed run to an error. Option rejections become `UnsupportedParameter`
/// so the conversion engine can retry with its fallback profile.
pub(crate) fn classify_failure(code: i32, stderr: String) -> AppError {
    match unsupported_option_in(&stderr) {
        Some(option) => AppError::UnsupportedParameter(option),
        None => AppError::FfmpegFailed { code, stderr },
    }
}

/// Run FFmpeg and block until completion.
pub fn run_ffmpeg_blocking(args: Vec<String>) -> Result<(), AppError> {
    let ffmpeg_path = get_ffmpeg_path()?;
    let path_str = ffmpeg_path.to_string_lossy();

    let input_arg = args
        .iter()
        .position(|a| a == "-i")
        .and_then(|i| args.get(i + 1));
    let output_arg = args.last();
    log::debug!(
        target: "gif_to_video::ffmpeg::runner",
        "Spawning FFmpeg: path={}, input={:?}, output={:?}",
        path_str,
        input_arg,
        output_arg
    );

    let mut cmd = Command::new(&*path_str);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    #[cfg(windows)]
    cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
    let mut child = cmd
        .spawn()
        .map_err(|e| format!("Failed to spawn FFmpeg: {}", e))?;

    let stderr = match child.stderr.take() {
        Some(s) => s,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(AppError::from("Failed to capture stderr"));
        }
    };

    let stderr_buffer = Arc::new(Mutex::new(Vec::new()));
    let stderr_handle = collect_stderr(stderr, Arc::clone(&stderr_buffer));
    let status = child.wait().map_err(|e| e.to_string());
    let _ = stderr_handle.join();
    let status = status?;

    if status.success() {
        log::debug!(
            target: "gif_to_video::ffmpeg::runner",
            "FFmpeg completed successfully"
        );
        return Ok(());
    }

    let stderr_str = String::from_utf8_lossy(&stderr_buffer.lock()).to_string();
    let code = status.code().unwrap_or(-1);
    let err_preview = stderr_str
        .lines()
        .rev()
        .take(3)
        .collect::<Vec<_>>()
        .join("; ");
    log::error!(
        target: "gif_to_video::ffmpeg::runner",
        "FFmpeg failed (code={}): {}",
        code,
        err_preview
    );
    Err(classify_failure(code, stderr_str))
}
