//! In-memory backend for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use dronelens_core::capture::StillFrame;
use dronelens_core::error::{ConnectionError, StreamError};
use dronelens_core::session::{BackendKind, Telemetry};

use crate::backend::CameraBackend;
use crate::frame::{FrameSource, StaticFrameSource};

pub struct MockBackend {
    kind: BackendKind,
    connect_error: Mutex<Option<ConnectionError>>,
    telemetry: Mutex<Result<Option<Telemetry>, StreamError>>,
    frame: Mutex<Option<StillFrame>>,
    last_source: Mutex<Option<Arc<StaticFrameSource>>>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub polls: AtomicUsize,
}

impl MockBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            connect_error: Mutex::new(None),
            telemetry: Mutex::new(Ok(None)),
            frame: Mutex::new(Some(StillFrame::jpeg(vec![0xFF, 0xD8, 0xFF]))),
            last_source: Mutex::new(None),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
        }
    }

    pub fn fail_connect(&self, err: ConnectionError) {
        *self.connect_error.lock().unwrap() = Some(err);
    }

    pub fn set_telemetry(&self, reading: Result<Option<Telemetry>, StreamError>) {
        *self.telemetry.lock().unwrap() = reading;
    }

    pub fn set_frame(&self, frame: Option<StillFrame>) {
        *self.frame.lock().unwrap() = frame;
    }

    /// Simulate the device dropping the most recent stream.
    pub fn release_last_source(&self) {
        if let Some(source) = self.last_source.lock().unwrap().as_ref() {
            source.release();
        }
    }
}

#[async_trait]
impl CameraBackend for MockBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn connect(&self) -> Result<(), ConnectionError> {
        match self.connect_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn poll_telemetry(&self) -> Result<Option<Telemetry>, StreamError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.telemetry.lock().unwrap().clone()
    }

    async fn start_stream(&self) -> Result<Arc<dyn FrameSource>, StreamError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let source = Arc::new(match self.frame.lock().unwrap().clone() {
            Some(frame) => StaticFrameSource::new(frame),
            None => StaticFrameSource::warming_up(),
        });
        *self.last_source.lock().unwrap() = Some(Arc::clone(&source));
        Ok(source)
    }

    async fn stop_stream(&self) -> Result<(), StreamError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}
