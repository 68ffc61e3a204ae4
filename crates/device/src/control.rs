//! Debounced continuous controls.
//!
//! A [`RotationControl`] models a spring-loaded slider: moving it only
//! updates the displayed position, releasing it yields a single rotation
//! command, and the slider springs back to neutral after a short delay.
//! New input during that delay cancels the pending spring-back.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use dronelens_core::flight::FlightCommand;

/// Delay before a released slider returns to neutral.
pub const DEFAULT_NEUTRAL_DELAY: Duration = Duration::from_millis(600);

/// Largest slider deflection, in degrees, either way.
pub const MAX_DEFLECTION_DEG: i32 = 180;

/// One-shot delayed action. Scheduling again, or cancelling, drops any
/// action that has not fired yet.
#[derive(Default)]
pub struct ResetTimer {
    pending: Option<(CancellationToken, JoinHandle<()>)>,
}

impl ResetTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` after `delay`, replacing any pending action.
    pub fn schedule<F>(&mut self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancel_clone.cancelled() => {}
                _ = tokio::time::sleep(delay) => action.await,
            }
        });
        self.pending = Some((cancel, handle));
    }

    pub fn cancel(&mut self) {
        if let Some((cancel, _)) = self.pending.take() {
            cancel.cancel();
        }
    }

    /// Whether an action is scheduled and has not yet run.
    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|(cancel, handle)| !cancel.is_cancelled() && !handle.is_finished())
    }
}

impl Drop for ResetTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub struct RotationControl {
    position: watch::Sender<i32>,
    timer: ResetTimer,
    neutral_delay: Duration,
}

impl RotationControl {
    pub fn new(neutral_delay: Duration) -> Self {
        let (position, _) = watch::channel(0);
        Self {
            position,
            timer: ResetTimer::new(),
            neutral_delay,
        }
    }

    pub fn position(&self) -> i32 {
        *self.position.borrow()
    }

    /// Receiver that observes every position change, including the
    /// spring-back to neutral.
    pub fn subscribe(&self) -> watch::Receiver<i32> {
        self.position.subscribe()
    }

    /// Move the slider. Never produces a command. Returns the clamped
    /// position.
    pub fn input(&mut self, value: i32) -> i32 {
        self.timer.cancel();
        let clamped = value.clamp(-MAX_DEFLECTION_DEG, MAX_DEFLECTION_DEG);
        self.position.send_replace(clamped);
        clamped
    }

    /// Let go of the slider. Yields the rotation for the current position
    /// (none at neutral) and schedules the return to neutral.
    pub fn release(&mut self) -> Option<FlightCommand> {
        let command = FlightCommand::from_slider(self.position())?;

        let position = self.position.clone();
        self.timer.schedule(self.neutral_delay, async move {
            position.send_replace(0);
        });
        Some(command)
    }

    pub fn is_returning(&self) -> bool {
        self.timer.is_pending()
    }
}

impl Default for RotationControl {
    fn default() -> Self {
        Self::new(DEFAULT_NEUTRAL_DELAY)
    }
}
