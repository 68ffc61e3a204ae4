//! Camera session lifecycle.
//!
//! [`CameraSessionManager`] owns the whole session: the active backend,
//! the live frame source, the capture buffer and the telemetry poller.
//! It moves through
//!
//! ```text
//! Disconnected -> Connecting -> Connected(Idle) <-> Connected(Streaming) -> Disconnected
//! ```
//!
//! Every method takes `&mut self`: the manager is driven by a single
//! control task and is never shared across tasks. Failures are returned
//! to the caller and also reflected in the status line; none of them
//! leave the session half-initialized.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use dronelens_core::capture::{CaptureBuffer, Slot};
use dronelens_core::error::{CaptureError, ConnectionError, StreamError};
use dronelens_core::session::{
    can_stream, can_switch_backend, BackendKind, ConnectionState, SessionSnapshot, StreamState,
    Telemetry,
};
use dronelens_events::{EventBus, EventKind};

use crate::backend::{Backends, CameraBackend};
use crate::frame::FrameSource;
use crate::telemetry::{TelemetryPoller, DEFAULT_POLL_INTERVAL};

/// Status shown while no session exists.
pub const DISCONNECTED_STATUS: &str = "Connect to a camera to begin";

/// Status shown on a connected session with nothing in progress.
pub const READY_STATUS: &str = "Ready to capture";

pub struct CameraSessionManager {
    backends: Backends,
    kind: BackendKind,
    connection: ConnectionState,
    stream: StreamState,
    /// Live frame handle. Only this manager touches it.
    source: Option<Arc<dyn FrameSource>>,
    buffer: CaptureBuffer,
    telemetry_tx: watch::Sender<Option<Telemetry>>,
    poller: Option<TelemetryPoller>,
    telemetry_interval: Duration,
    status: String,
    bus: Option<Arc<EventBus>>,
}

impl CameraSessionManager {
    pub fn new(backends: Backends, kind: BackendKind) -> Self {
        let (telemetry_tx, _) = watch::channel(None);
        Self {
            backends,
            kind,
            connection: ConnectionState::Disconnected,
            stream: StreamState::Idle,
            source: None,
            buffer: CaptureBuffer::new(),
            telemetry_tx,
            poller: None,
            telemetry_interval: DEFAULT_POLL_INTERVAL,
            status: DISCONNECTED_STATUS.to_string(),
            bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_telemetry_interval(mut self, interval: Duration) -> Self {
        self.telemetry_interval = interval;
        self
    }

    // ---- state accessors ----

    pub fn backend_kind(&self) -> BackendKind {
        self.kind
    }

    /// Backend kind of the connected session, `None` unless Connected.
    pub fn active_kind(&self) -> Option<BackendKind> {
        (self.connection == ConnectionState::Connected).then_some(self.kind)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn stream_state(&self) -> StreamState {
        self.stream
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn buffer(&self) -> &CaptureBuffer {
        &self.buffer
    }

    /// Latest telemetry reading, if any has arrived.
    pub fn telemetry(&self) -> Option<Telemetry> {
        self.telemetry_tx.borrow().clone()
    }

    /// Receiver that observes every telemetry reading.
    pub fn subscribe_telemetry(&self) -> watch::Receiver<Option<Telemetry>> {
        self.telemetry_tx.subscribe()
    }

    pub fn is_polling_telemetry(&self) -> bool {
        self.poller.as_ref().is_some_and(TelemetryPoller::is_running)
    }

    /// Continuous feed URL for renderers, while streaming.
    pub fn feed_url(&self) -> Option<String> {
        self.source.as_ref().and_then(|s| s.feed_url())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            backend_kind: self.kind,
            connection: self.connection,
            stream: self.stream,
            telemetry: self.telemetry(),
            status: self.status.clone(),
        }
    }

    // ---- lifecycle ----

    /// Switch to another backend kind. Only allowed while disconnected;
    /// switching empties the capture buffer.
    pub fn set_backend_kind(&mut self, kind: BackendKind) -> Result<(), ConnectionError> {
        if !can_switch_backend(self.connection) {
            return Err(ConnectionError::BackendLocked(self.connection));
        }
        if kind != self.kind {
            self.kind = kind;
            self.clear_all_slots();
            self.publish_state();
        }
        Ok(())
    }

    /// Connect to `kind`. Only allowed from `Disconnected`.
    ///
    /// The local webcam starts streaming as soon as it is connected. If that
    /// auto-start fails the session stays connected and the stream error is
    /// shown in the status line.
    pub async fn connect(&mut self, kind: BackendKind) -> Result<(), ConnectionError> {
        if self.connection != ConnectionState::Disconnected {
            return Err(ConnectionError::InvalidState(self.connection));
        }
        self.set_backend_kind(kind)?;

        self.connection = ConnectionState::Connecting;
        self.set_status(format!("Connecting to {kind}..."));

        let backend = Arc::clone(self.backend());
        if let Err(e) = backend.connect().await {
            tracing::warn!(backend = %kind, error = %e, "Connection failed");
            self.connection = ConnectionState::Disconnected;
            self.set_status(format!("Connection failed: {e}"));
            return Err(e);
        }

        self.connection = ConnectionState::Connected;
        self.start_polling(backend);
        tracing::info!(backend = %kind, "Connected");
        self.set_status(format!("Connected to {kind}"));

        if kind.auto_starts_stream() {
            if let Err(e) = self.start_stream().await {
                tracing::warn!(backend = %kind, error = %e, "Stream auto-start failed");
            }
        }
        Ok(())
    }

    /// Start streaming. Reuses the current stream when it is still live.
    pub async fn start_stream(&mut self) -> Result<(), StreamError> {
        if !can_stream(self.connection) {
            return Err(StreamError::NotConnected);
        }
        if self.stream == StreamState::Streaming && self.source.as_ref().is_some_and(|s| s.is_live()) {
            tracing::debug!(backend = %self.kind, "Stream already live, reusing");
            return Ok(());
        }

        self.set_status("Starting video stream...");
        let backend = Arc::clone(self.backend());
        match backend.start_stream().await {
            Ok(source) => {
                if let Some(stale) = self.source.replace(source) {
                    stale.release();
                }
                self.stream = StreamState::Streaming;
                tracing::info!(backend = %self.kind, "Video stream active");
                self.set_status("Video stream active");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(backend = %self.kind, error = %e, "Failed to start stream");
                self.set_status(format!("Failed to start stream: {e}"));
                Err(e)
            }
        }
    }

    /// Stop streaming. A no-op when already idle.
    ///
    /// The local stream is torn down even if the backend reports an error;
    /// that error is still returned.
    pub async fn stop_stream(&mut self) -> Result<(), StreamError> {
        if self.stream == StreamState::Idle {
            return Ok(());
        }
        if let Some(source) = self.source.take() {
            source.release();
        }
        self.stream = StreamState::Idle;

        let backend = Arc::clone(self.backend());
        match backend.stop_stream().await {
            Ok(()) => {
                self.set_status("Video stream stopped");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(backend = %self.kind, error = %e, "Error stopping stream");
                self.set_status(format!("Error stopping stream: {e}"));
                Err(e)
            }
        }
    }

    /// Stop the stream, release the backend, empty the buffer and stop
    /// telemetry polling.
    pub async fn disconnect(&mut self) {
        if self.connection == ConnectionState::Disconnected {
            return;
        }
        if let Err(e) = self.stop_stream().await {
            tracing::debug!(error = %e, "Ignoring stop error during disconnect");
        }
        if let Some(mut poller) = self.poller.take() {
            poller.shutdown().await;
        }

        let backend = Arc::clone(self.backend());
        backend.disconnect().await;

        self.clear_all_slots();
        self.telemetry_tx.send_replace(None);
        self.connection = ConnectionState::Disconnected;
        tracing::info!(backend = %self.kind, "Disconnected");
        self.set_status(DISCONNECTED_STATUS);
    }

    // ---- capture ----

    /// Store the current live frame in `slot`.
    pub async fn capture(&mut self, slot: Slot) -> Result<(), CaptureError> {
        let source = match self.streaming_source() {
            Some(source) => source,
            None => {
                self.set_status(format!("Capture failed: {}", CaptureError::NotReady));
                return Err(CaptureError::NotReady);
            }
        };

        self.set_status(format!("Capturing photo {slot}..."));
        let result = match source.still(slot).await {
            Ok(frame) => self.buffer.capture(slot, frame).map(|_| ()),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tracing::info!(slot = slot.number(), "Photo captured");
                self.publish(EventKind::SlotChanged {
                    slot: slot.number(),
                    filled: true,
                });
                self.set_status(format!("Photo {slot} captured"));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(slot = slot.number(), error = %e, "Capture failed");
                self.set_status(format!("Capture failed: {e}"));
                Err(e)
            }
        }
    }

    /// Empty `slot`; it shows the live preview again.
    pub fn clear(&mut self, slot: Slot) {
        if self.buffer.clear(slot).is_some() {
            self.publish(EventKind::SlotChanged {
                slot: slot.number(),
                filled: false,
            });
        }
    }

    /// Empty both slots and restore the idle status line.
    pub fn reset_captures(&mut self) {
        self.clear_all_slots();
        let status = match self.connection {
            ConnectionState::Connected => READY_STATUS,
            _ => DISCONNECTED_STATUS,
        };
        self.set_status(status);
    }

    // ---- private helpers ----

    fn backend(&self) -> &Arc<dyn CameraBackend> {
        self.backends.get(self.kind)
    }

    fn streaming_source(&self) -> Option<Arc<dyn FrameSource>> {
        match self.stream {
            StreamState::Streaming => self.source.clone(),
            StreamState::Idle => None,
        }
    }

    fn start_polling(&mut self, backend: Arc<dyn CameraBackend>) {
        let poller = TelemetryPoller::spawn(
            backend,
            self.telemetry_interval,
            self.telemetry_tx.clone(),
            self.bus.clone(),
        );
        // Dropping a previous poller cancels it.
        self.poller = Some(poller);
    }

    fn clear_all_slots(&mut self) {
        for slot in Slot::ALL {
            self.clear(slot);
        }
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        self.publish_state();
    }

    fn publish_state(&self) {
        self.publish(EventKind::SessionChanged(self.snapshot()));
    }

    fn publish(&self, kind: EventKind) {
        if let Some(bus) = &self.bus {
            bus.publish(kind);
        }
    }
}

impl Drop for CameraSessionManager {
    fn drop(&mut self) {
        if let Some(source) = self.source.take() {
            source.release();
        }
        // Dropping the poller cancels its task.
        self.poller.take();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use assert_matches::assert_matches;

    use super::*;
    use crate::testing::MockBackend;

    fn manager(drone: Arc<MockBackend>, webcam: Arc<MockBackend>) -> CameraSessionManager {
        CameraSessionManager::new(
            Backends {
                drone,
                webcam,
            },
            BackendKind::HardwareDrone,
        )
    }

    fn pair() -> (Arc<MockBackend>, Arc<MockBackend>) {
        (
            Arc::new(MockBackend::new(BackendKind::HardwareDrone)),
            Arc::new(MockBackend::new(BackendKind::LocalWebcam)),
        )
    }

    #[tokio::test]
    async fn connect_then_disconnect_returns_to_clean_state() {
        let (drone, webcam) = pair();
        let mut session = manager(Arc::clone(&drone), webcam);

        session.connect(BackendKind::HardwareDrone).await.unwrap();
        assert_eq!(session.connection_state(), ConnectionState::Connected);
        assert_eq!(session.stream_state(), StreamState::Idle);
        assert!(session.is_polling_telemetry());

        session.disconnect().await;
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert!(session.buffer().is_empty());
        assert!(!session.is_polling_telemetry());
        assert!(session.telemetry().is_none());
        assert_eq!(drone.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(session.status(), DISCONNECTED_STATUS);
    }

    #[tokio::test]
    async fn failed_connect_reverts_to_disconnected() {
        let (drone, webcam) = pair();
        drone.fail_connect(ConnectionError::BackendUnreachable("refused".into()));
        let mut session = manager(drone, webcam);

        let err = session.connect(BackendKind::HardwareDrone).await.unwrap_err();
        assert_eq!(err, ConnectionError::BackendUnreachable("refused".into()));
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert!(!session.is_polling_telemetry());
        assert!(session.status().contains("refused"));
    }

    #[tokio::test]
    async fn connect_only_from_disconnected() {
        let (drone, webcam) = pair();
        let mut session = manager(drone, webcam);
        session.connect(BackendKind::HardwareDrone).await.unwrap();

        assert_eq!(
            session.connect(BackendKind::HardwareDrone).await,
            Err(ConnectionError::InvalidState(ConnectionState::Connected))
        );
    }

    #[tokio::test]
    async fn backend_kind_locked_while_connected() {
        let (drone, webcam) = pair();
        let mut session = manager(drone, webcam);
        session.connect(BackendKind::HardwareDrone).await.unwrap();

        assert_eq!(
            session.set_backend_kind(BackendKind::LocalWebcam),
            Err(ConnectionError::BackendLocked(ConnectionState::Connected))
        );
        assert_eq!(session.backend_kind(), BackendKind::HardwareDrone);
        assert_eq!(session.active_kind(), Some(BackendKind::HardwareDrone));

        session.disconnect().await;
        assert_eq!(session.active_kind(), None);
        session.set_backend_kind(BackendKind::LocalWebcam).unwrap();
        assert_eq!(session.backend_kind(), BackendKind::LocalWebcam);
    }

    #[tokio::test]
    async fn webcam_auto_starts_stream() {
        let (drone, webcam) = pair();
        let mut session = manager(drone, Arc::clone(&webcam));

        session.connect(BackendKind::LocalWebcam).await.unwrap();
        assert_eq!(session.stream_state(), StreamState::Streaming);
        assert_eq!(webcam.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_stream_is_idempotent() {
        let (drone, webcam) = pair();
        let mut session = manager(Arc::clone(&drone), webcam);
        session.connect(BackendKind::HardwareDrone).await.unwrap();

        session.start_stream().await.unwrap();
        session.start_stream().await.unwrap();
        assert_eq!(drone.starts.load(Ordering::SeqCst), 1);
        assert_eq!(session.stream_state(), StreamState::Streaming);

        session.stop_stream().await.unwrap();
        session.stop_stream().await.unwrap();
        assert_eq!(drone.stops.load(Ordering::SeqCst), 1);
        assert_eq!(session.stream_state(), StreamState::Idle);
    }

    #[tokio::test]
    async fn stream_requires_connection() {
        let (drone, webcam) = pair();
        let mut session = manager(drone, webcam);
        assert_eq!(session.start_stream().await, Err(StreamError::NotConnected));
    }

    #[tokio::test]
    async fn capture_before_streaming_is_not_ready() {
        let (drone, webcam) = pair();
        let mut session = manager(drone, webcam);
        session.connect(BackendKind::HardwareDrone).await.unwrap();

        assert_eq!(session.capture(Slot::First).await, Err(CaptureError::NotReady));
        assert!(session.buffer().is_empty());
    }

    #[tokio::test]
    async fn capture_without_live_frame_is_not_ready() {
        let (drone, webcam) = pair();
        drone.set_frame(None);
        let mut session = manager(drone, webcam);
        session.connect(BackendKind::HardwareDrone).await.unwrap();
        session.start_stream().await.unwrap();

        assert_eq!(session.capture(Slot::First).await, Err(CaptureError::NotReady));
    }

    #[tokio::test]
    async fn capture_fills_slots_and_clear_empties_them() {
        let (drone, webcam) = pair();
        let mut session = manager(drone, webcam);
        session.connect(BackendKind::HardwareDrone).await.unwrap();
        session.start_stream().await.unwrap();

        session.capture(Slot::First).await.unwrap();
        session.capture(Slot::Second).await.unwrap();
        assert!(session.buffer().both_filled());
        assert_eq!(session.status(), "Photo 2 captured");

        session.clear(Slot::First);
        assert!(!session.buffer().both_filled());
        assert!(session.buffer().get(Slot::Second).is_some());

        session.reset_captures();
        assert!(session.buffer().is_empty());
        assert_eq!(session.status(), READY_STATUS);
    }

    #[tokio::test]
    async fn disconnect_stops_stream_and_clears_buffer() {
        let (drone, webcam) = pair();
        let mut session = manager(Arc::clone(&drone), webcam);
        session.connect(BackendKind::HardwareDrone).await.unwrap();
        session.start_stream().await.unwrap();
        session.capture(Slot::First).await.unwrap();

        session.disconnect().await;
        assert_eq!(session.stream_state(), StreamState::Idle);
        assert!(session.buffer().is_empty());
        assert_eq!(drone.stops.load(Ordering::SeqCst), 1);
        assert!(session.feed_url().is_none());
    }

    #[tokio::test]
    async fn switching_backend_clears_buffer() {
        let (drone, webcam) = pair();
        let mut session = manager(drone, webcam);
        session.connect(BackendKind::HardwareDrone).await.unwrap();
        session.start_stream().await.unwrap();
        session.capture(Slot::First).await.unwrap();
        session.disconnect().await;

        session.set_backend_kind(BackendKind::LocalWebcam).unwrap();
        assert!(session.buffer().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn telemetry_polls_on_interval_and_swallows_failures() {
        let (drone, webcam) = pair();
        drone.set_telemetry(Err(StreamError::Backend("timeout".into())));
        let mut session = manager(Arc::clone(&drone), webcam)
            .with_telemetry_interval(Duration::from_secs(5));
        session.connect(BackendKind::HardwareDrone).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(drone.polls.load(Ordering::SeqCst) >= 1);
        assert!(session.telemetry().is_none());
        assert!(session.is_polling_telemetry());

        drone.set_telemetry(Ok(Some(Telemetry {
            battery: Some(64),
            signal: Some(80),
        })));
        tokio::time::sleep(Duration::from_millis(5_010)).await;
        assert_eq!(session.telemetry().and_then(|t| t.battery), Some(64));

        session.disconnect().await;
        let polls = drone.polls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(drone.polls.load(Ordering::SeqCst), polls);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_manager_stops_polling() {
        let (drone, webcam) = pair();
        let mut session = manager(Arc::clone(&drone), webcam);
        session.connect(BackendKind::HardwareDrone).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        drop(session);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let polls = drone.polls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(drone.polls.load(Ordering::SeqCst), polls);
    }

    #[tokio::test]
    async fn events_published_on_bus() {
        let (drone, webcam) = pair();
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let mut session = manager(drone, webcam).with_event_bus(Arc::clone(&bus));

        session.connect(BackendKind::HardwareDrone).await.unwrap();

        let mut saw_connected = false;
        while let Ok(event) = rx.try_recv() {
            if let EventKind::SessionChanged(snapshot) = event.kind {
                if snapshot.connection == ConnectionState::Connected {
                    saw_connected = true;
                }
            }
        }
        assert!(saw_connected);
    }

    #[tokio::test]
    async fn restarting_dead_stream_reacquires() {
        let (drone, webcam) = pair();
        let mut session = manager(Arc::clone(&drone), webcam);
        session.connect(BackendKind::HardwareDrone).await.unwrap();
        session.start_stream().await.unwrap();

        drone.release_last_source();
        session.start_stream().await.unwrap();
        assert_eq!(drone.starts.load(Ordering::SeqCst), 2);
        assert_matches!(session.capture(Slot::First).await, Ok(()));
    }
}
