//! Live frame sources.
//!
//! A [`FrameSource`] is the handle a streaming backend hands to the
//! session manager. Only the manager holds it; other components see the
//! stills it produces through the capture buffer.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use dronelens_core::capture::{Slot, StillFrame};
use dronelens_core::error::CaptureError;

#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Whether the source can still produce frames. A released source, or
    /// one whose device went away, is not live.
    fn is_live(&self) -> bool;

    /// Encode the current live frame as a still destined for `slot`.
    ///
    /// `Ok(None)` means no frame has been produced yet.
    async fn still(&self, slot: Slot) -> Result<Option<StillFrame>, CaptureError>;

    /// URL of a continuous feed for renderers, if the source has one.
    fn feed_url(&self) -> Option<String> {
        None
    }

    /// Stop producing frames and free the underlying device.
    fn release(&self);
}

/// Source that always yields the same still. Used to replay a saved image
/// in place of a device.
pub struct StaticFrameSource {
    frame: Option<StillFrame>,
    live: AtomicBool,
}

impl StaticFrameSource {
    pub fn new(frame: StillFrame) -> Self {
        Self {
            frame: Some(frame),
            live: AtomicBool::new(true),
        }
    }

    /// A live source that has not produced a frame yet.
    pub fn warming_up() -> Self {
        Self {
            frame: None,
            live: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl FrameSource for StaticFrameSource {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    async fn still(&self, _slot: Slot) -> Result<Option<StillFrame>, CaptureError> {
        if !self.is_live() {
            return Ok(None);
        }
        Ok(self.frame.clone())
    }

    fn release(&self) {
        self.live.store(false, Ordering::Release);
    }
}
