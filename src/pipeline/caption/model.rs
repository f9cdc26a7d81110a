use async_trait::async_trait;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::CaptionSettings;
use crate::error::CaptionError;
use crate::pipeline::types::CanonicalImage;

/// Image-to-text model, loaded once and reused for every iteration.
#[async_trait]
pub trait CaptionModel: Send + Sync {
    async fn infer(&self, image: &CanonicalImage) -> Result<String, CaptionError>;
}

#[derive(Serialize)]
struct CaptionRequest<'a> {
    id: u64,
    image_path: &'a str,
    max_length: u32,
}

#[derive(Deserialize, Debug)]
struct CaptionResponse {
    status: String,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

struct Pipe {
    // Held so the child is killed when the captioner drops.
    _child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Caption model hosted in a child process speaking one JSON object per line.
///
/// The child announces `{"status":"ready"}` once its weights are loaded. Each
/// request names a JPEG written to `frame_path`; the reply carries the caption
/// or an error message.
pub struct SidecarCaptioner {
    pipe: Mutex<Pipe>,
    frame_path: PathBuf,
    max_length: u32,
    next_id: AtomicU64,
}

impl SidecarCaptioner {
    pub async fn spawn(settings: &CaptionSettings) -> Result<Self, CaptionError> {
        info!(
            "Launching caption model: {} {}",
            settings.command,
            settings.args.join(" ")
        );
        let mut child = Command::new(&settings.command)
            .args(&settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(CaptionError::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CaptionError::NotReady("model stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptionError::NotReady("model stdout unavailable".to_string()))?;
        let mut stdout = BufReader::new(stdout);

        tokio::time::timeout(settings.load_timeout(), wait_until_ready(&mut stdout))
            .await
            .map_err(|_| {
                CaptionError::NotReady(format!(
                    "no ready signal within {}ms",
                    settings.load_timeout_ms
                ))
            })??;
        info!("Caption model loaded");

        Ok(Self {
            pipe: Mutex::new(Pipe {
                _child: child,
                stdin,
                stdout,
            }),
            frame_path: settings.frame_path.clone(),
            max_length: settings.max_length,
            next_id: AtomicU64::new(1),
        })
    }

    async fn stage_frame(&self, image: &CanonicalImage) -> Result<(), CaptionError> {
        let image = image.clone();
        let path = self.frame_path.clone();
        tokio::task::spawn_blocking(move || image.as_rgb().save_with_format(&path, ImageFormat::Jpeg))
            .await
            .map_err(std::io::Error::other)??;
        Ok(())
    }
}

async fn wait_until_ready(stdout: &mut BufReader<ChildStdout>) -> Result<(), CaptionError> {
    let mut line = String::new();
    loop {
        line.clear();
        if stdout.read_line(&mut line).await? == 0 {
            return Err(CaptionError::NotReady(
                "model process exited before it was ready".to_string(),
            ));
        }
        match serde_json::from_str::<CaptionResponse>(line.trim()) {
            Ok(reply) if reply.status == "ready" => return Ok(()),
            Ok(reply) if reply.status == "error" => {
                return Err(CaptionError::NotReady(
                    reply.error.unwrap_or_else(|| "unknown error".to_string()),
                ));
            }
            _ => debug!("Ignoring model output: {}", line.trim()),
        }
    }
}

#[async_trait]
impl CaptionModel for SidecarCaptioner {
    async fn infer(&self, image: &CanonicalImage) -> Result<String, CaptionError> {
        let mut pipe = self.pipe.lock().await;
        self.stage_frame(image).await?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let image_path = self.frame_path.to_string_lossy();
        let request = serde_json::to_string(&CaptionRequest {
            id,
            image_path: &image_path,
            max_length: self.max_length,
        })
        .map_err(|e| CaptionError::Protocol(e.to_string()))?;
        pipe.stdin.write_all(request.as_bytes()).await?;
        pipe.stdin.write_all(b"\n").await?;
        pipe.stdin.flush().await?;

        let mut line = String::new();
        loop {
            line.clear();
            if pipe.stdout.read_line(&mut line).await? == 0 {
                return Err(CaptionError::Protocol(
                    "model process closed its output".to_string(),
                ));
            }
            let reply: CaptionResponse = serde_json::from_str(line.trim())
                .map_err(|e| CaptionError::Protocol(format!("{}: {}", e, line.trim())))?;
            // Replies to requests abandoned by a timeout are still in the pipe.
            if reply.id.is_some_and(|reply_id| reply_id != id) {
                debug!("Discarding stale caption reply {:?}", reply.id);
                continue;
            }
            return match reply.status.as_str() {
                "success" => Ok(reply.caption.unwrap_or_default().trim().to_string()),
                "error" => Err(CaptionError::Model(
                    reply.error.unwrap_or_else(|| "unknown error".to_string()),
                )),
                other => Err(CaptionError::Protocol(format!("unexpected status {}", other))),
            };
        }
    }
}
