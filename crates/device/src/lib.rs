//! Camera devices and the session that drives them.
//!
//! - [`api`]: REST client for the device control service.
//! - [`backend`], [`remote`], [`local`]: the drone and webcam backends.
//! - [`session`]: connection and stream lifecycle plus the capture buffer.
//! - [`telemetry`]: background status polling.
//! - [`flight`], [`control`]: gated flight commands and the debounced slider.

pub mod api;
pub mod backend;
pub mod control;
pub mod flight;
pub mod frame;
pub mod local;
pub mod remote;
pub mod session;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use api::{DeviceApi, DeviceApiError, FlightControl};
pub use backend::{Backends, CameraBackend};
pub use control::RotationControl;
pub use flight::{CommandOutcome, FlightCommandDispatcher};
pub use frame::FrameSource;
pub use session::CameraSessionManager;
