//! Workbench events and the [`EventBus`] that fans them out.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use dronelens_core::comparison::{ComparisonResult, RunOutcome};
use dronelens_core::report::ReportSubmission;
use dronelens_core::session::{SessionSnapshot, Telemetry};
use dronelens_core::types::RunId;

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// Something observable that happened in the application.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Connection or stream state changed, or the status line was updated.
    SessionChanged(SessionSnapshot),

    TelemetryUpdated(Telemetry),

    /// A slot was filled (`filled = true`) or returned to live preview.
    SlotChanged { slot: u8, filled: bool },

    RunStarted { run_id: RunId, models: Vec<String> },

    RunSettled {
        run_id: RunId,
        outcome: RunOutcome,
        results: Vec<ComparisonResult>,
    },

    /// A run was discarded by an operator reset.
    RunDiscarded { run_id: RunId },

    ReportSubmitted(ReportSubmission),

    Utterance { model_id: String, text: String },

    NarrationCancelled,

    CommandCompleted {
        command: String,
        /// `false` when the device did not accept the command.
        sent: bool,
        error: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(flatten)]
    pub kind: EventKind,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Room for a burst of slot, telemetry and utterance events while the
/// console printer is busy.
const DEFAULT_CAPACITY: usize = 256;

/// Broadcast hub for workbench activity.
///
/// The session manager publishes state, slot and telemetry changes, the
/// orchestrator publishes run start and settlement, and the narration,
/// report and flight paths publish their outcomes. Observers that fall
/// behind skip ahead; nothing is replayed.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Fire and forget. Events published with no observer are lost.
    pub fn publish(&self, kind: EventKind) {
        if self.tx.send(Event::new(kind)).is_err() {
            tracing::trace!("Event dropped, no observers");
        }
    }

    /// Observe events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
