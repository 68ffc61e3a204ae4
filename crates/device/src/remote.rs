//! Remote flight-capable camera reached through the device control
//! service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use dronelens_core::capture::{Slot, StillFrame};
use dronelens_core::error::{CaptureError, ConnectionError, StreamError};
use dronelens_core::session::{BackendKind, Telemetry};

use crate::api::{DeviceApi, DeviceApiError};
use crate::backend::CameraBackend;
use crate::frame::FrameSource;

/// Pause after begin-stream before the feed is usable.
pub const DEFAULT_STREAM_WARMUP: Duration = Duration::from_secs(1);

/// File name the device service stores a slot's still under.
pub fn still_filename(slot: Slot) -> String {
    format!("tello_photo_{}.jpg", slot.number())
}

pub struct DroneBackend {
    api: Arc<DeviceApi>,
    warmup: Duration,
}

impl DroneBackend {
    pub fn new(api: Arc<DeviceApi>) -> Self {
        Self {
            api,
            warmup: DEFAULT_STREAM_WARMUP,
        }
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn api(&self) -> &Arc<DeviceApi> {
        &self.api
    }
}

/// Map a failed connect call onto the connection error taxonomy.
fn connection_error(err: DeviceApiError) -> ConnectionError {
    match err {
        DeviceApiError::Request(e) => ConnectionError::BackendUnreachable(format!(
            "{e}. Is the device service running?"
        )),
        DeviceApiError::ApiError { status: 401 | 403, body } => {
            ConnectionError::PermissionDenied(body)
        }
        DeviceApiError::ApiError { status, body } => {
            ConnectionError::BackendUnreachable(format!("HTTP {status}: {body}"))
        }
        DeviceApiError::Rejected(reason) => {
            let lower = reason.to_lowercase();
            if lower.contains("permission") || lower.contains("denied") {
                ConnectionError::PermissionDenied(reason)
            } else {
                ConnectionError::DeviceNotFound(reason)
            }
        }
    }
}

#[async_trait]
impl CameraBackend for DroneBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::HardwareDrone
    }

    async fn connect(&self) -> Result<(), ConnectionError> {
        self.api.connect().await.map_err(connection_error)
    }

    async fn poll_telemetry(&self) -> Result<Option<Telemetry>, StreamError> {
        self.api
            .status()
            .await
            .map_err(|e| StreamError::Backend(e.to_string()))
    }

    async fn start_stream(&self) -> Result<Arc<dyn FrameSource>, StreamError> {
        self.api
            .start_stream()
            .await
            .map_err(|e| StreamError::Backend(e.to_string()))?;

        tokio::time::sleep(self.warmup).await;

        let source: Arc<dyn FrameSource> = Arc::new(RemoteFrameSource::new(Arc::clone(&self.api)));
        Ok(source)
    }

    async fn stop_stream(&self) -> Result<(), StreamError> {
        self.api
            .stop_stream()
            .await
            .map_err(|e| StreamError::Backend(e.to_string()))
    }

    async fn disconnect(&self) {
        if let Err(e) = self.api.disconnect().await {
            tracing::warn!(error = %e, "Device disconnect failed");
        }
    }
}

/// A capture rejected because the service has no frame yet is
/// [`CaptureError::NotReady`]; anything else is a device fault.
fn capture_error(err: DeviceApiError) -> CaptureError {
    match err {
        DeviceApiError::Rejected(reason) if is_no_frame(&reason) => CaptureError::NotReady,
        other => CaptureError::Device(other.to_string()),
    }
}

fn is_no_frame(reason: &str) -> bool {
    let lower = reason.to_lowercase();
    lower.contains("no frame") || lower.contains("not streaming")
}

/// Pull-based source over the device service: a still is produced by
/// asking the service to store the current frame, then downloading it.
pub struct RemoteFrameSource {
    api: Arc<DeviceApi>,
    live: AtomicBool,
}

impl RemoteFrameSource {
    pub fn new(api: Arc<DeviceApi>) -> Self {
        Self {
            api,
            live: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl FrameSource for RemoteFrameSource {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    async fn still(&self, slot: Slot) -> Result<Option<StillFrame>, CaptureError> {
        if !self.is_live() {
            return Ok(None);
        }
        let filename = still_filename(slot);
        self.api.capture(&filename).await.map_err(capture_error)?;
        let frame = self
            .api
            .fetch_photo(&filename)
            .await
            .map_err(|e| CaptureError::Device(e.to_string()))?;

        tracing::debug!(slot = slot.number(), bytes = frame.len(), "Fetched remote still");
        Ok((!frame.is_empty()).then_some(frame))
    }

    fn feed_url(&self) -> Option<String> {
        Some(self.api.feed_url())
    }

    fn release(&self) {
        self.live.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn ok() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true}))
    }

    #[test]
    fn still_filenames_per_slot() {
        assert_eq!(still_filename(Slot::First), "tello_photo_1.jpg");
        assert_eq!(still_filename(Slot::Second), "tello_photo_2.jpg");
    }

    #[tokio::test]
    async fn unreachable_service_maps_to_backend_unreachable() {
        let api = Arc::new(DeviceApi::new("http://127.0.0.1:1").unwrap());
        let backend = DroneBackend::new(api);
        assert_matches!(
            backend.connect().await,
            Err(ConnectionError::BackendUnreachable(_))
        );
    }

    #[tokio::test]
    async fn rejected_connect_maps_to_device_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/connect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "error": "Tello not found on network",
            })))
            .mount(&server)
            .await;

        let backend = DroneBackend::new(Arc::new(DeviceApi::new(server.uri()).unwrap()));
        assert_eq!(
            backend.connect().await,
            Err(ConnectionError::DeviceNotFound("Tello not found on network".into()))
        );
    }

    #[test]
    fn forbidden_maps_to_permission_denied() {
        let err = connection_error(DeviceApiError::ApiError {
            status: 403,
            body: "nope".into(),
        });
        assert_eq!(err, ConnectionError::PermissionDenied("nope".into()));
    }

    #[tokio::test]
    async fn start_stream_exposes_pull_source() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/start-stream"))
            .respond_with(ok())
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/capture"))
            .respond_with(ok())
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/photo/tello_photo_2.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1, 2, 3]))
            .mount(&server)
            .await;

        let backend = DroneBackend::new(Arc::new(DeviceApi::new(server.uri()).unwrap()))
            .with_warmup(Duration::ZERO);
        let source = backend.start_stream().await.unwrap();

        assert!(source.is_live());
        assert!(source.feed_url().unwrap().contains("/api/video-feed"));
        let frame = source.still(Slot::Second).await.unwrap().unwrap();
        assert_eq!(&*frame.data, &[1, 2, 3]);

        source.release();
        assert_eq!(source.still(Slot::Second).await.unwrap(), None);
    }

    async fn rejecting_capture(server: &MockServer, reason: &str) {
        Mock::given(method("POST"))
            .and(path("/api/capture"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "error": reason,
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn missing_frame_is_not_ready() {
        let server = MockServer::start().await;
        rejecting_capture(&server, "No frame available").await;

        let source = RemoteFrameSource::new(Arc::new(DeviceApi::new(server.uri()).unwrap()));
        assert_eq!(source.still(Slot::First).await, Err(CaptureError::NotReady));
    }

    #[tokio::test]
    async fn other_capture_rejection_is_device_error() {
        let server = MockServer::start().await;
        rejecting_capture(&server, "Camera write failed").await;

        let source = RemoteFrameSource::new(Arc::new(DeviceApi::new(server.uri()).unwrap()));
        assert_eq!(
            source.still(Slot::First).await,
            Err(CaptureError::Device("Camera write failed".into()))
        );
    }
}
