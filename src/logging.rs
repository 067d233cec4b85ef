//! stderr logging for the sidecar. stdout carries the RPC stream, so logs never go there.
//!
//! Line format: `HH:MM:SS  LEVEL  target  message` in local time (UTC when the
//! offset cannot be determined), with the crate prefix stripped from the target.
//! `RUST_LOG` overrides the default filter.

use std::io::Write;

use time::OffsetDateTime;
use time::macros::format_description;

const TARGET_PREFIX: &str = "gif_to_video::";

fn clock(now: OffsetDateTime) -> String {
    let time_fmt = format_description!("[hour]:[minute]:[second]");
    now.format(&time_fmt).unwrap_or_else(|_| "??:??:??".into())
}

fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn short_target(target: &str) -> &str {
    target.strip_prefix(TARGET_PREFIX).unwrap_or(target)
}

pub fn format_line(now: OffsetDateTime, level: log::Level, target: &str, message: &str) -> String {
    format!(
        "{ts}  {level:5}  {target:5}  {message}",
        ts = clock(now),
        level = level,
        target = short_target(target),
        message = message
    )
}

/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let default_filter = if cfg!(debug_assertions) {
        "info,gif_to_video=debug"
    } else {
        "info"
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .format(|buf, record| {
            writeln!(
                buf,
                "{}",
                format_line(
                    local_now(),
                    record.level(),
                    record.target(),
                    &record.args().to_string()
                )
            )
        })
        .try_init();
}
