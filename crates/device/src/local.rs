//! Local capture device (V4L2 webcam) backed by `ffmpeg`.
//!
//! Stills are grabbed by running `ffmpeg` once per capture, reading a
//! single MJPEG-encoded frame from the device into stdout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use dronelens_core::capture::{Slot, StillFrame};
use dronelens_core::error::{CaptureError, ConnectionError, StreamError};
use dronelens_core::session::{BackendKind, Telemetry};

use crate::backend::CameraBackend;
use crate::frame::FrameSource;

/// Upper bound on a single frame grab.
const GRAB_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_FFMPEG_BIN: &str = "ffmpeg";

pub struct WebcamBackend {
    device: PathBuf,
    ffmpeg_bin: String,
}

impl WebcamBackend {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            ffmpeg_bin: DEFAULT_FFMPEG_BIN.to_string(),
        }
    }

    pub fn with_ffmpeg(mut self, bin: impl Into<String>) -> Self {
        self.ffmpeg_bin = bin.into();
        self
    }

    pub fn device(&self) -> &Path {
        &self.device
    }
}

/// Open the device node to check it exists and that we may read it.
async fn probe_device(device: &Path) -> Result<(), ConnectionError> {
    match tokio::fs::File::open(device).await {
        Ok(_) => Ok(()),
        Err(e) => {
            let shown = device.display().to_string();
            Err(match e.kind() {
                std::io::ErrorKind::NotFound => ConnectionError::DeviceNotFound(shown),
                std::io::ErrorKind::PermissionDenied => ConnectionError::PermissionDenied(shown),
                _ => ConnectionError::BackendUnreachable(format!("{shown}: {e}")),
            })
        }
    }
}

#[async_trait]
impl CameraBackend for WebcamBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::LocalWebcam
    }

    async fn connect(&self) -> Result<(), ConnectionError> {
        probe_device(&self.device).await?;
        tracing::info!(device = %self.device.display(), "Webcam available");
        Ok(())
    }

    async fn poll_telemetry(&self) -> Result<Option<Telemetry>, StreamError> {
        Ok(None)
    }

    async fn start_stream(&self) -> Result<Arc<dyn FrameSource>, StreamError> {
        probe_device(&self.device)
            .await
            .map_err(|e| StreamError::Backend(e.to_string()))?;
        let source: Arc<dyn FrameSource> = Arc::new(LocalFrameSource {
            device: self.device.clone(),
            ffmpeg_bin: self.ffmpeg_bin.clone(),
            live: AtomicBool::new(true),
        });
        Ok(source)
    }

    async fn stop_stream(&self) -> Result<(), StreamError> {
        Ok(())
    }

    async fn disconnect(&self) {}
}

/// Capture handle for a local device node.
pub struct LocalFrameSource {
    device: PathBuf,
    ffmpeg_bin: String,
    live: AtomicBool,
}

impl LocalFrameSource {
    async fn grab(&self) -> Result<Vec<u8>, CaptureError> {
        let mut cmd = Command::new(&self.ffmpeg_bin);
        cmd.args(["-hide_banner", "-loglevel", "error", "-f", "v4l2", "-i"])
            .arg(&self.device)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "mjpeg", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // The child is killed if the grab times out and the future is dropped.
            .kill_on_drop(true);

        let output = tokio::time::timeout(GRAB_TIMEOUT, cmd.output())
            .await
            .map_err(|_| CaptureError::Device(format!("Frame grab timed out after {}s", GRAB_TIMEOUT.as_secs())))?
            .map_err(|e| CaptureError::Device(format!("Failed to run {}: {e}", self.ffmpeg_bin)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Device(format!(
                "{} exited with {:?}: {}",
                self.ffmpeg_bin,
                output.status.code(),
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl FrameSource for LocalFrameSource {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire) && self.device.exists()
    }

    async fn still(&self, slot: Slot) -> Result<Option<StillFrame>, CaptureError> {
        if !self.is_live() {
            return Ok(None);
        }
        let bytes = self.grab().await?;
        tracing::debug!(slot = slot.number(), bytes = bytes.len(), "Grabbed webcam still");
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(StillFrame::jpeg(bytes)))
    }

    fn release(&self) {
        self.live.store(false, Ordering::Release);
    }
}
