//! Map FFmpeg exit codes to user-friendly messages and classify encoder failures.
//!
//! Exit codes are from ffmpeg.c: 1 (general), 69 (rate exceeded),
//! 123 (hard exit), 255 (signal). -1 is used for spawn failure.
//! Stderr is kept as detail for debugging.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Payload for RPC error responses. Consumers show summary; detail is expandable.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FfmpegErrorPayload {
    pub summary: String,
    pub detail: String,
}

/// Option-rejection lines printed by ffmpeg builds that predate an option
/// (e.g. `-fps_mode` before 5.1). Capture group 1 is the option name.
static UNSUPPORTED_OPTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"Unrecognized option '([^']+)'",
        r"Option not found: ([^\s]+)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Maps FFmpeg exit code to a short user-facing summary. Stderr is passed through as detail.
pub fn parse_ffmpeg_error(stderr: &str, exit_code: Option<i32>) -> FfmpegErrorPayload {
    let summary = match exit_code {
        Some(code) => match known_exit_code_summary(code) {
            Some(msg) => msg,
            None => summary_for_unknown_code(code),
        },
        None => fallback_summary(stderr),
    };
    let detail = stderr.trim().to_string();
    FfmpegErrorPayload { summary, detail }
}

/// Returns the rejected option name when stderr shows the encoder refused a parameter
/// rather than the input. Everything else is an ordinary conversion failure.
pub fn unsupported_option_in(stderr: &str) -> Option<String> {
    UNSUPPORTED_OPTION_PATTERNS
        .iter()
        .find_map(|re| re.captures(stderr))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Source-verified exit codes from ffmpeg.c.
fn known_exit_code_summary(code: i32) -> Option<String> {
    match code {
        -1 => Some("FFmpeg not found or failed to start.".into()),
        1 => Some("FFmpeg failed.".into()),
        69 => Some("Encoding rate limit exceeded.".into()),
        123 | 255 => Some("Encoding was stopped.".into()),
        _ => None,
    }
}

const ELLIPSIS: &str = "…";

/// First non-empty line of stderr, truncated to max_len bytes (adding "…" if truncated).
fn first_line_truncated(stderr: &str, max_len: usize) -> String {
    let first = stderr
        .lines()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim())
        .unwrap_or(stderr);
    if first.len() <= max_len {
        return first.to_string();
    }
    let mut cut = max_len.saturating_sub(ELLIPSIS.len());
    while cut > 0 && !first.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &first[..cut], ELLIPSIS)
}

fn summary_for_unknown_code(code: i32) -> String {
    format!("FFmpeg failed (exit code {}).", code)
}

fn fallback_summary(stderr: &str) -> String {
    first_line_truncated(stderr, 120)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_1() {
        let p = parse_ffmpeg_error("", Some(1));
        assert_eq!(p.summary, "FFmpeg failed.");
    }

    #[test]
    fn exit_code_255() {
        let p = parse_ffmpeg_error("", Some(255));
        assert_eq!(p.summary, "Encoding was stopped.");
    }

    #[test]
    fn unknown_code_short_summary() {
        let p = parse_ffmpeg_error("Invalid data found when processing input", Some(42));
        assert_eq!(p.summary, "FFmpeg failed (exit code 42).");
        assert_eq!(p.detail, "Invalid data found when processing input");
    }

    #[test]
    fn no_code_uses_first_stderr_line() {
        let p = parse_ffmpeg_error("\nSome random error\nSecond line", None);
        assert_eq!(p.summary, "Some random error");
    }

    #[test]
    fn long_stderr_truncated() {
        let long = "a".repeat(150);
        let p = parse_ffmpeg_error(&long, None);
        assert!(p.summary.len() <= 120);
        assert!(p.summary.ends_with('…'));
    }

    #[test]
    fn detects_unrecognized_option() {
        let stderr = "ffmpeg version 4.2\nUnrecognized option 'fps_mode'.\nError splitting the argument list: Option not found";
        assert_eq!(unsupported_option_in(stderr).as_deref(), Some("fps_mode"));
    }

    #[test]
    fn detects_option_not_found() {
        let stderr = "Option not found: movflags";
        assert_eq!(unsupported_option_in(stderr).as_deref(), Some("movflags"));
    }

    #[test]
    fn unused_codec_option_warning_is_not_a_rejection() {
        let stderr = "Codec AVOption preset (Configuration preset) has not been used for any stream.\ninput.gif: Invalid data found when processing input";
        assert_eq!(unsupported_option_in(stderr), None);
    }

    #[test]
    fn corrupt_input_is_not_an_unsupported_option() {
        let stderr = "input.gif: Invalid data found when processing input";
        assert_eq!(unsupported_option_in(stderr), None);
    }
}
