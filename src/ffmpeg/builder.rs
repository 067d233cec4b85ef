use serde::Serialize;

/// Frame rate used when the source GIF does not declare one.
pub const FALLBACK_FPS: f64 = 15.0;

/// One encoder parameter set. The engine tries `primary()` first and `fallback()`
/// only when the encoder rejects an option of the primary set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeProfile {
    pub name: &'static str,
    pub codec: &'static str,
    pub preset: &'static str,
    /// Constant-frame-rate flag pair, e.g. ("-fps_mode", "cfr") or legacy ("-vsync", "cfr").
    pub cfr_flag: (&'static str, &'static str),
    pub faststart: bool,
}

impl EncodeProfile {
    /// Current ffmpeg (5.1+) option names.
    pub fn primary() -> Self {
        Self {
            name: "primary",
            codec: "libx264",
            preset: "ultrafast",
            cfr_flag: ("-fps_mode", "cfr"),
            faststart: true,
        }
    }

    /// Option names understood by older ffmpeg builds.
    pub fn fallback() -> Self {
        Self {
            name: "fallback",
            codec: "libx264",
            preset: "ultrafast",
            cfr_flag: ("-vsync", "cfr"),
            faststart: false,
        }
    }
}

/// Normalizes a declared frame rate. Missing, zero or absurd values fall back to 15.
pub fn effective_fps(declared: Option<f64>) -> f64 {
    match declared {
        Some(fps) if fps.is_finite() && fps > 0.0 && fps <= 120.0 => (fps * 100.0).round() / 100.0,
        _ => FALLBACK_FPS,
    }
}

/// GIF -> MP4: drops audio, forces yuv420p with even dimensions so every player accepts it.
pub fn build_convert_args(
    input_path: &str,
    output_path: &str,
    profile: &EncodeProfile,
    fps: f64,
) -> Vec<String> {
    log::debug!(
        target: "gif_to_video::ffmpeg::builder",
        "Building convert command: profile={}, codec={}, preset={}, fps={}, input={} -> output={}",
        profile.name,
        profile.codec,
        profile.preset,
        fps,
        input_path,
        output_path
    );

    let mut args: Vec<String> = [
        "-nostdin",
        "-hide_banner",
        "-y",
        "-i",
        input_path,
        "-an",
        "-c:v",
        profile.codec,
        "-preset",
        profile.preset,
        "-pix_fmt",
        "yuv420p",
        "-vf",
        "scale=trunc(iw/2)*2:trunc(ih/2)*2",
        "-r",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("{}", fps));
    args.push(profile.cfr_flag.0.to_string());
    args.push(profile.cfr_flag.1.to_string());
    if profile.faststart {
        args.push("-movflags".to_string());
        args.push("+faststart".to_string());
    }
    args.push(output_path.to_string());
    args
}

/// Single still frame at `timestamp` seconds, written as PNG.
pub fn build_frame_args(video_path: &str, timestamp: f64, output_path: &str) -> Vec<String> {
    let ts = if timestamp.is_finite() && timestamp > 0.0 {
        format!("{:.3}", timestamp)
    } else {
        "0".to_string()
    };
    [
        "-nostdin",
        "-hide_banner",
        "-y",
        "-ss",
        &ts,
        "-i",
        video_path,
        "-frames:v",
        "1",
        "-f",
        "image2",
        "-c:v",
        "png",
        output_path,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Formats args for display with one option per line (flag and value on same line).
pub fn format_args_for_display_multiline(args: &[String]) -> String {
    let mut lines = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        if arg.starts_with('-') && i + 1 < args.len() && !args[i + 1].starts_with('-') {
            lines.push(format!("  {} {}", arg, args[i + 1]));
            i += 2;
        } else {
            lines.push(format!("  {}", arg));
            i += 1;
        }
    }
    lines.join("\n")
}
