//! Periodic device status polling.
//!
//! [`TelemetryPoller::spawn`] starts a background task that polls the
//! backend on a fixed interval and publishes each reading through a
//! `watch` channel. Poll failures are logged and dropped. The task stops
//! when the poller is cancelled or dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use dronelens_core::session::Telemetry;
use dronelens_events::{EventBus, EventKind};

use crate::backend::CameraBackend;

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct TelemetryPoller {
    cancel: CancellationToken,
    task_handle: tokio::task::JoinHandle<()>,
}

impl TelemetryPoller {
    /// Spawn the polling task. The first poll happens immediately.
    pub fn spawn(
        backend: Arc<dyn CameraBackend>,
        interval: Duration,
        tx: watch::Sender<Option<Telemetry>>,
        bus: Option<Arc<EventBus>>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();

        let task_handle = tokio::spawn(async move {
            tracing::debug!(
                backend = %backend.kind(),
                interval_ms = interval.as_millis() as u64,
                "Telemetry polling started",
            );
            let mut ticker = tokio::time::interval(interval);
            // A slow poll must not be followed by a burst of catch-up polls.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel_clone.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let polled = tokio::select! {
                    _ = cancel_clone.cancelled() => break,
                    polled = backend.poll_telemetry() => polled,
                };

                match polled {
                    Ok(Some(telemetry)) => {
                        tx.send_replace(Some(telemetry.clone()));
                        if let Some(bus) = &bus {
                            bus.publish(EventKind::TelemetryUpdated(telemetry));
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "Telemetry poll failed");
                    }
                }
            }

            tracing::debug!("Telemetry polling stopped");
        });

        Self {
            cancel,
            task_handle,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task_handle.is_finished()
    }

    /// Stop polling and wait for the task to exit. Call at most once.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        let _ = (&mut self.task_handle).await;
    }
}

impl Drop for TelemetryPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
