//! Flight command dispatch, gated on the active backend kind.

use std::sync::Arc;

use dronelens_core::error::CommandError;
use dronelens_core::flight::FlightCommand;
use dronelens_core::session::BackendKind;
use dronelens_events::{EventBus, EventKind};

use crate::api::FlightControl;

/// What happened to a dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Delivered to the device, which acknowledged it.
    Sent,
    /// No session is connected or its backend cannot fly; nothing was sent.
    Skipped,
}

pub struct FlightCommandDispatcher {
    control: Arc<dyn FlightControl>,
    bus: Option<Arc<EventBus>>,
}

impl FlightCommandDispatcher {
    pub fn new(control: Arc<dyn FlightControl>) -> Self {
        Self { control, bus: None }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Send `command` if the connected session's backend kind is
    /// flight-capable. `active` is `None` while no session is connected.
    ///
    /// One request, no retry. A device rejection comes back as
    /// [`CommandError::Rejected`] carrying the device's reason unchanged.
    pub async fn dispatch(
        &self,
        active: Option<BackendKind>,
        command: FlightCommand,
    ) -> Result<CommandOutcome, CommandError> {
        match active {
            Some(kind) if kind.is_flight_capable() => {}
            Some(kind) => {
                tracing::debug!(backend = %kind, %command, "Ignoring flight command");
                return Ok(CommandOutcome::Skipped);
            }
            None => {
                tracing::debug!(%command, "Ignoring flight command, no connected session");
                return Ok(CommandOutcome::Skipped);
            }
        }

        tracing::info!(%command, "Sending flight command");
        let result = self.control.send(&command).await;

        match &result {
            Ok(()) => tracing::info!(%command, "Flight command acknowledged"),
            Err(e) => tracing::warn!(%command, error = %e, "Flight command failed"),
        }
        if let Some(bus) = &self.bus {
            bus.publish(EventKind::CommandCompleted {
                command: command.to_string(),
                sent: result.is_ok(),
                error: result.as_ref().err().map(ToString::to_string),
            });
        }

        result.map(|()| CommandOutcome::Sent)
    }
}
