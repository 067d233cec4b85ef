use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use gif_to_video_core::error::AppError;
use gif_to_video_core::ffmpeg::parse_ffmpeg_error;
use gif_to_video_core::sidecar_api::{self, Sidecar};
use gif_to_video_core::temp::STALE_TEMP_MAX_AGE;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: u64,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcSuccess {
    id: u64,
    result: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcFailure {
    id: u64,
    error: RpcErrorPayload,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcErrorPayload {
    summary: String,
    detail: String,
}

impl RpcErrorPayload {
    fn new(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            detail: detail.into(),
        }
    }
}

type SharedWriter = Arc<Mutex<io::Stdout>>;

fn write_json_line<T: serde::Serialize>(writer: &mut impl Write, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, value)
        .map_err(|e| io::Error::other(format!("serialize response: {}", e)))?;
    writer.write_all(b"\n")?;
    writer.flush()
}

fn write_json_line_shared<T: serde::Serialize>(writer: &SharedWriter, value: &T) -> io::Result<()> {
    let mut guard = writer.lock();
    write_json_line(&mut *guard, value)
}

fn write_failure(writer: &SharedWriter, id: u64, error: RpcErrorPayload) {
    let _ = write_json_line_shared(writer, &RpcFailure { id, error });
}

fn parse_error_payload(err: &AppError) -> RpcErrorPayload {
    match err {
        AppError::FfmpegFailed { code, stderr } if *code == -1 => {
            RpcErrorPayload::new(stderr.clone(), stderr.clone())
        }
        AppError::FfmpegFailed { code, stderr } => {
            let parsed = parse_ffmpeg_error(stderr, Some(*code));
            RpcErrorPayload::new(parsed.summary, parsed.detail)
        }
        _ => {
            let text = err.to_string();
            RpcErrorPayload::new(text.clone(), text)
        }
    }
}

async fn handle_request(request: RpcRequest, sidecar: &Sidecar, writer: &SharedWriter) {
    match sidecar.dispatch(&request.method, request.params).await {
        Ok(result) => {
            let success = RpcSuccess {
                id: request.id,
                result,
            };
            if let Err(err) = write_json_line_shared(writer, &success) {
                write_failure(
                    writer,
                    request.id,
                    RpcErrorPayload::new("Serialization error", err.to_string()),
                );
            }
        }
        Err(err) => write_failure(writer, request.id, parse_error_payload(&err)),
    }
}

async fn serve(sidecar: Arc<Sidecar>) -> io::Result<()> {
    let stdout: SharedWriter = Arc::new(Mutex::new(io::stdout()));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight = JoinSet::new();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                write_failure(
                    &stdout,
                    0,
                    RpcErrorPayload::new("Invalid input stream", err.to_string()),
                );
                break;
            }
        };
        // Reap finished handlers so the set does not grow with the session.
        while in_flight.try_join_next().is_some() {}

        if line.trim().is_empty() {
            continue;
        }
        let request: RpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_failure(
                    &stdout,
                    0,
                    RpcErrorPayload::new("Invalid request", err.to_string()),
                );
                continue;
            }
        };

        let sidecar = Arc::clone(&sidecar);
        let writer = Arc::clone(&stdout);
        in_flight.spawn(async move {
            handle_request(request, &sidecar, &writer).await;
        });
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(err) = joined {
            log::error!(target: "gif_to_video::sidecar", "request task failed: {}", err);
        }
    }
    Ok(())
}

fn main() -> io::Result<()> {
    gif_to_video_core::logging::init();
    sidecar_api::cleanup_startup_temp(STALE_TEMP_MAX_AGE);

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let sidecar = sidecar_api::load_config(config_path.as_deref())
        .and_then(Sidecar::from_config)
        .map_err(|e| io::Error::other(e.to_string()))?;
    let sidecar = Arc::new(sidecar);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let served = runtime.block_on(serve(Arc::clone(&sidecar)));

    sidecar.shutdown();
    served
}
