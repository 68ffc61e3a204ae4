//! Interchangeable camera backends.
//!
//! [`CameraBackend`] is implemented by the remote drone
//! ([`DroneBackend`](crate::remote::DroneBackend)) and the local webcam
//! ([`WebcamBackend`](crate::local::WebcamBackend)). The session manager
//! drives whichever one matches the session's backend kind.

use std::sync::Arc;

use async_trait::async_trait;

use dronelens_core::error::{ConnectionError, StreamError};
use dronelens_core::session::{BackendKind, Telemetry};

use crate::frame::FrameSource;

#[async_trait]
pub trait CameraBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn connect(&self) -> Result<(), ConnectionError>;

    /// Poll device status. `Ok(None)` when the backend has nothing to report.
    async fn poll_telemetry(&self) -> Result<Option<Telemetry>, StreamError>;

    /// Begin streaming and hand back a live frame source.
    async fn start_stream(&self) -> Result<Arc<dyn FrameSource>, StreamError>;

    async fn stop_stream(&self) -> Result<(), StreamError>;

    /// Release backend resources. Failures are logged, never returned.
    async fn disconnect(&self);
}

/// One backend per kind, handed to the session manager at construction.
#[derive(Clone)]
pub struct Backends {
    pub drone: Arc<dyn CameraBackend>,
    pub webcam: Arc<dyn CameraBackend>,
}

impl Backends {
    pub fn get(&self, kind: BackendKind) -> &Arc<dyn CameraBackend> {
        match kind {
            BackendKind::HardwareDrone => &self.drone,
            BackendKind::LocalWebcam => &self.webcam,
        }
    }
}
