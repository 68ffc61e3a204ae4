//! Two-slot still-image buffer.
//!
//! Each slot holds at most one encoded still. Capturing overwrites the
//! slot in one assignment; clearing returns it to live preview.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;

use crate::error::CaptureError;
use crate::types::Timestamp;

/// MIME type used when a source does not report one.
pub const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";

/// One of the two capture positions. Numbered 1 and 2 for operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    First,
    Second,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::First, Slot::Second];

    /// Map an operator-facing slot number (1 or 2).
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::First),
            2 => Some(Self::Second),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }

    fn index(self) -> usize {
        usize::from(self.number() - 1)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// An encoded still image. Cloning shares the underlying bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StillFrame {
    pub data: Arc<[u8]>,
    pub media_type: String,
}

impl StillFrame {
    pub fn new(data: impl Into<Arc<[u8]>>, media_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            media_type: media_type.into(),
        }
    }

    pub fn jpeg(data: impl Into<Arc<[u8]>>) -> Self {
        Self::new(data, DEFAULT_MEDIA_TYPE)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A still held in a slot, with the time it was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedStill {
    pub frame: StillFrame,
    pub captured_at: Timestamp,
}

/// What a slot shows: its captured still, or the live feed.
#[derive(Debug, PartialEq, Eq)]
pub enum SlotView<'a> {
    LivePreview,
    Still(&'a CapturedStill),
}

#[derive(Debug, Default)]
pub struct CaptureBuffer {
    slots: [Option<CapturedStill>; 2],
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame` in `slot`, replacing anything already there.
    ///
    /// `frame` is the current live frame; `None` means the source has not
    /// produced one yet and the slot is left untouched.
    pub fn capture(
        &mut self,
        slot: Slot,
        frame: Option<StillFrame>,
    ) -> Result<&CapturedStill, CaptureError> {
        let frame = frame.filter(|f| !f.is_empty()).ok_or(CaptureError::NotReady)?;
        let still = CapturedStill {
            frame,
            captured_at: Utc::now(),
        };
        let stored = self.slots[slot.index()].insert(still);
        Ok(&*stored)
    }

    /// Empty `slot` so it shows the live preview again.
    ///
    /// Returns the still that was removed, if any.
    pub fn clear(&mut self, slot: Slot) -> Option<CapturedStill> {
        self.slots[slot.index()].take()
    }

    pub fn clear_all(&mut self) {
        self.slots = [None, None];
    }

    pub fn get(&self, slot: Slot) -> Option<&CapturedStill> {
        self.slots[slot.index()].as_ref()
    }

    pub fn view(&self, slot: Slot) -> SlotView<'_> {
        match self.get(slot) {
            Some(still) => SlotView::Still(still),
            None => SlotView::LivePreview,
        }
    }

    pub fn both_filled(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Both frames in slot order, or `None` unless both slots are filled.
    pub fn pair(&self) -> Option<[StillFrame; 2]> {
        match &self.slots {
            [Some(a), Some(b)] => Some([a.frame.clone(), b.frame.clone()]),
            _ => None,
        }
    }
}
