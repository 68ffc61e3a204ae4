//! Camera session state model.
//!
//! The session manager itself lives in `dronelens-device`; this module
//! only holds the states it moves between and the rules for moving.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which interchangeable video/command source a session is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Remote flight-capable camera reached through the device control
    /// service. The only kind that accepts flight commands.
    HardwareDrone,
    /// Local capture device. Never produces motion.
    LocalWebcam,
}

impl BackendKind {
    /// Whether flight commands may be sent for this kind.
    pub fn is_flight_capable(self) -> bool {
        matches!(self, Self::HardwareDrone)
    }

    /// Whether connecting immediately starts the stream.
    pub fn auto_starts_stream(self) -> bool {
        matches!(self, Self::LocalWebcam)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::HardwareDrone => "drone",
            Self::LocalWebcam => "webcam",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drone" | "hardware" | "hardware_drone" | "tello" => Ok(Self::HardwareDrone),
            "webcam" | "local" | "local_webcam" | "camera" => Ok(Self::LocalWebcam),
            other => Err(format!("Unknown backend kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Idle,
    Streaming,
}

/// Device status reported by the telemetry poll.
///
/// Either field may be missing; absence is never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Battery charge in percent.
    pub battery: Option<u8>,
    /// WiFi signal strength as reported by the device.
    pub signal: Option<i32>,
}

impl Telemetry {
    pub fn is_empty(&self) -> bool {
        self.battery.is_none() && self.signal.is_none()
    }
}

/// Point-in-time view of a session, published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub backend_kind: BackendKind,
    pub connection: ConnectionState,
    pub stream: StreamState,
    pub telemetry: Option<Telemetry>,
    pub status: String,
}

/// The backend kind may only change while the session is disconnected.
pub fn can_switch_backend(state: ConnectionState) -> bool {
    state == ConnectionState::Disconnected
}

/// Streams may only be started or stopped on a connected session.
pub fn can_stream(state: ConnectionState) -> bool {
    state == ConnectionState::Connected
}
